//! Connection State Types
//!
//! The connection supervisor is a single state machine:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open──► Connected
//!      ▲                          │                   │
//!      └──────── retry / close ◄──┴───── drop ◄───────┘
//!                                      close() ──► Closing ──► Disconnected
//! ```
//!
//! Every transition out of `Connected` or `Connecting` records a
//! [`DisconnectCause`] drawn from a closed taxonomy.

use std::fmt;

/// Lifecycle state of the event-stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport and no attempt in flight.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Transport open; events flow.
    Connected,
    /// `close()` was requested and the loop is shutting down.
    Closing,
}

impl ConnectionState {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }

    /// Check if the transport is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Snapshot published by the supervisor on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// Whether the supervisor will make further attempts on its own.
    pub retrying: bool,
}

impl LinkStatus {
    /// Idle status before the first `connect()` and after exhaustion.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retrying: false,
        }
    }
}

// =============================================================================
// Disconnect Cause
// =============================================================================

/// Why the transport closed or failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Orderly close (1000), including `close()` by the caller.
    Normal,
    /// Peer going away (1001, 1012).
    GoingAway,
    /// Protocol or data violation (1002, 1003, 1007, 1015).
    ProtocolError,
    /// Message too big (1009).
    PayloadTooLarge,
    /// Policy violation (1008).
    PolicyViolation,
    /// Internal server error (1011, 1013, 1014).
    ServerError,
    /// Connection dropped without a close frame (1005, 1006).
    Abnormal,
    /// Handshake did not finish in time.
    Timeout,
    /// TCP connection refused or host unreachable.
    ConnectionRefused,
    /// Handshake rejected with an HTTP 4xx status.
    HttpClientError(u16),
    /// Handshake rejected with an HTTP 5xx status.
    HttpServerError(u16),
    /// Anything else.
    Unknown,
}

impl DisconnectCause {
    /// Map a WebSocket close code to a cause.
    #[must_use]
    pub const fn from_close_code(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 | 1012 => Self::GoingAway,
            1002 | 1003 | 1007 | 1015 => Self::ProtocolError,
            1005 | 1006 => Self::Abnormal,
            1008 => Self::PolicyViolation,
            1009 => Self::PayloadTooLarge,
            1011 | 1013 | 1014 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Map a rejected handshake's HTTP status to a cause.
    #[must_use]
    pub const fn from_http_status(status: u16) -> Self {
        match status {
            400..=499 => Self::HttpClientError(status),
            500..=599 => Self::HttpServerError(status),
            _ => Self::Unknown,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::GoingAway => "going_away",
            Self::ProtocolError => "protocol_error",
            Self::PayloadTooLarge => "payload_too_large",
            Self::PolicyViolation => "policy_violation",
            Self::ServerError => "server_error",
            Self::Abnormal => "abnormal",
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::HttpClientError(_) => "http_client_error",
            Self::HttpServerError(_) => "http_server_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpClientError(status) | Self::HttpServerError(status) => {
                write!(f, "{} ({status})", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Details of the most recent disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    /// Categorized cause.
    pub cause: DisconnectCause,
    /// Free-form detail (close reason, error text).
    pub detail: String,
    /// Set once the supervisor has given up reconnecting.
    pub retries_exhausted: bool,
}

impl DisconnectInfo {
    /// Create a disconnect record.
    #[must_use]
    pub fn new(cause: DisconnectCause, detail: impl Into<String>) -> Self {
        Self {
            cause,
            detail: detail.into(),
            retries_exhausted: false,
        }
    }

    /// Placeholder used before any connection was attempted.
    #[must_use]
    pub fn never_connected() -> Self {
        Self::new(DisconnectCause::Normal, "not connected")
    }

    /// Mark the record as terminal.
    #[must_use]
    pub fn exhausted(mut self) -> Self {
        self.retries_exhausted = true;
        self
    }
}

impl fmt::Display for DisconnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause, self.detail)?;
        if self.retries_exhausted {
            f.write_str(" (retries exhausted)")?;
        }
        Ok(())
    }
}
