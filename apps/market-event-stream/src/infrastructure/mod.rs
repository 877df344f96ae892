//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Event stream client, transport and delivery adapters.
pub mod stream;

/// File-backed checkpoint store.
pub mod checkpoint;

/// Configuration loading.
pub mod config;

/// Metrics instrumentation via the `metrics` facade.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
