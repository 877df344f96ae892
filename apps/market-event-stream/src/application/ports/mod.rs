//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: Opens the persistent message stream to the event service
//! - `CheckpointPort`: Durable storage for the last delivered sequence id

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::domain::connection::DisconnectCause;
use crate::domain::sequence::SequenceId;

// =============================================================================
// Transport Port
// =============================================================================

/// Parameters for a single connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Base stream URL.
    pub url: String,
    /// API key sent with every attempt.
    pub api_key: String,
    /// Ask the server to replay events after this id.
    pub resume_from: Option<SequenceId>,
    /// 1-based attempt number since the last successful open.
    pub attempt: u32,
}

impl OpenRequest {
    /// URL including the resume query parameter, if any.
    #[must_use]
    pub fn url_with_resume(&self) -> String {
        match self.resume_from {
            Some(id) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{separator}last_id={id}", self.url)
            }
            None => self.url.clone(),
        }
    }
}

impl std::fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRequest")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("resume_from", &self.resume_from)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// A frame received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text payload.
    Text(String),
    /// Peer closed the stream, with its close code if it sent one.
    Close {
        /// WebSocket close code.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
}

/// Transport failure, already categorized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{cause}: {detail}")]
pub struct TransportError {
    /// Categorized cause.
    pub cause: DisconnectCause,
    /// Underlying error text.
    pub detail: String,
}

impl TransportError {
    /// Create a transport error.
    #[must_use]
    pub fn new(cause: DisconnectCause, detail: impl Into<String>) -> Self {
        Self {
            cause,
            detail: detail.into(),
        }
    }
}

/// Outbound half of an open stream.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an open stream.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Both halves of an open stream.
pub struct TransportLink {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl std::fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLink").finish_non_exhaustive()
    }
}

/// Opens connections to the event service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a stream. The caller bounds the call with its handshake timeout.
    async fn open(&self, request: &OpenRequest) -> Result<TransportLink, TransportError>;
}

// =============================================================================
// Checkpoint Port
// =============================================================================

/// Errors from checkpoint storage.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Path exists but is not a regular file.
    #[error("checkpoint path {0} is not a regular file")]
    NotAFile(String),

    /// Missing read or write permission.
    #[error("checkpoint file {path} is not readable and writable: {source}")]
    Permission {
        /// Checkpoint path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Stored content is not a valid checkpoint.
    #[error("checkpoint file {path} is corrupt: {reason}")]
    Corrupt {
        /// Checkpoint path.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// Other I/O failure.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable single-value store for the last delivered sequence id.
pub trait CheckpointPort: Send + Sync {
    /// Stored id, if any.
    fn read(&self) -> Option<SequenceId>;

    /// Persist `id` unless a write happened less than `min_interval` ago
    /// (`Duration::ZERO` forces the write) or `id` is behind the stored value.
    ///
    /// Returns `true` when the id was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, id: SequenceId, min_interval: Duration) -> Result<bool, CheckpointError>;
}
