//! Domain Layer - Core event-stream types.
//!
//! This layer contains the core domain types for the market event stream
//! with no I/O. Wire mappings live in the infrastructure layer.

/// Connection state machine and disconnect-cause taxonomy.
pub mod connection;

/// Ordered sequence identifiers and the delivery watermark.
pub mod sequence;

/// Events, notices, and consumer delivery records.
pub mod streaming;

/// Server-side subscription filters and validation.
pub mod subscription;
