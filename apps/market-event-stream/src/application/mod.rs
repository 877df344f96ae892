//! Application Layer - Port definitions.
//!
//! This layer contains the port interfaces that define how the stream client
//! interacts with external systems.

/// Port interfaces for external systems (transport, checkpoint storage).
pub mod ports;
