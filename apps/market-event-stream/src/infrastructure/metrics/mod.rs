//! Metrics Module
//!
//! Records client metrics through the `metrics` facade. The library never
//! installs a recorder; the embedding application decides where metrics go
//! (Prometheus, StatsD, nothing).
//!
//! # Metrics Categories
//!
//! - **Messages**: Records delivered by kind, decode failures
//! - **Connections**: Attempts, disconnects by cause, current state
//! - **Checkpoints**: Successful checkpoint writes

use std::sync::Once;

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::domain::connection::{ConnectionState, DisconnectCause};
use crate::domain::streaming::MessageKind;

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder.
///
/// Call after installing a recorder; repeated calls are no-ops.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "market_stream_messages_received_total",
            "Inbound frames delivered to the queue, by record kind"
        );
        describe_counter!(
            "market_stream_decode_failures_total",
            "Inbound frames that could not be decoded"
        );
        describe_counter!(
            "market_stream_connect_attempts_total",
            "Connection attempts made by the supervisor"
        );
        describe_counter!(
            "market_stream_disconnects_total",
            "Transport disconnects, by cause"
        );
        describe_counter!(
            "market_stream_checkpoint_writes_total",
            "Checkpoint writes that reached disk"
        );
        describe_gauge!(
            "market_stream_connection_state",
            "1 for the current connection state label, 0 otherwise"
        );
    });
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an inbound frame by the kind of record it produced.
pub fn record_message_received(kind: MessageKind) {
    counter!(
        "market_stream_messages_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_failure() {
    counter!("market_stream_decode_failures_total").increment(1);
}

/// Record a connection attempt.
pub fn record_connect_attempt() {
    counter!("market_stream_connect_attempts_total").increment(1);
}

/// Record a disconnect.
pub fn record_disconnect(cause: DisconnectCause) {
    counter!(
        "market_stream_disconnects_total",
        "cause" => cause.as_str()
    )
    .increment(1);
}

/// Record a checkpoint write.
pub fn record_checkpoint_write() {
    counter!("market_stream_checkpoint_writes_total").increment(1);
}

/// Publish the current connection state.
pub fn set_connection_state(current: ConnectionState) {
    for state in [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Closing,
    ] {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("market_stream_connection_state", "state" => state.as_str()).set(value);
    }
}
