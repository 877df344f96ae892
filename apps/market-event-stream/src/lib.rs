#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Event Stream - Resumable Push Client
//!
//! A client library that keeps one long-lived WebSocket connection to the
//! market-data event service, resumes from checkpointed sequence ids after
//! disconnects, and lets callers change server-side filters while the
//! connection is live.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `sequence`: Sequence ids and the delivery watermark
//!   - `streaming`: Events, notices, delivery records
//!   - `subscription`: Filters and validation
//!   - `connection`: Connection state and disconnect causes
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport and checkpoint interfaces
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Supervisor, dispatcher, delivery queue, WebSocket transport
//!   - `checkpoint`: File-backed checkpoint store
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Instrumentation
//!
//! # Data Flow
//!
//! ```text
//!                  ┌────────────┐   frames   ┌────────────┐  records  ┌──────────┐
//! Event service ──►│ Supervisor │──────────►│ Dispatcher │─────────►│  Queue   │──► next()
//!        ▲         └────────────┘            └────────────┘           └──────────┘
//!        │  filter.set / filter.get   │ watermark
//!        └──── SubscriptionController      └──► Checkpoint file
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core stream types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, DisconnectCause, DisconnectInfo, LinkStatus};
pub use domain::sequence::{SequenceId, SequenceIdError, Watermark};
pub use domain::streaming::{
    DeliveryRecord, ErrorNotice, Event, EventKind, FilterListReply, InfoNotice, InstanceRef,
    MessageKind, NoticeOrigin,
};
pub use domain::subscription::{
    AttributeFilter, Filter, FilterSelector, FilterSpec, FilterValidationError, FilterViolation,
    FilterWindow, NameFilter,
};

// Ports
pub use application::ports::{
    CheckpointError, CheckpointPort, Frame, OpenRequest, Transport, TransportError, TransportLink,
};

// Client
pub use infrastructure::stream::{
    ConnectOptions, ConnectOutcome, EventStreamClient, StreamError, WebSocketTransport,
};

// Checkpoint store
pub use infrastructure::checkpoint::FileCheckpointStore;

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, Credentials, StreamSettings};

// Metrics
pub use infrastructure::metrics::describe_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
