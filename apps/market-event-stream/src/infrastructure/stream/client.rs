//! Event Stream Client
//!
//! Public facade tying the pieces together: one [`Supervisor`] task per
//! `connect()`, the [`DeliveryQueue`] for consumption, the
//! [`SubscriptionController`] for filter changes, and an optional file
//! checkpoint seeding the resume watermark.
//!
//! ```rust,no_run
//! use market_event_stream::{ClientConfig, ConnectOptions, EventStreamClient, Filter};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let client = EventStreamClient::new(config)?;
//!
//! let options = ConnectOptions::from_settings(client.settings()).with_resume_from(client.last_id());
//! client.connect(options).await;
//!
//! let _ = client.subscribe(&[Filter::new().event_type("UPDATE").area("DE")], None, false);
//!
//! loop {
//!     let record = client.next(Some(Duration::from_secs(1))).await;
//!     println!("{:?}", record.kind());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{CheckpointError, CheckpointPort, Transport};
use crate::domain::connection::{ConnectionState, DisconnectCause, DisconnectInfo, LinkStatus};
use crate::domain::sequence::{SequenceId, Watermark};
use crate::domain::streaming::DeliveryRecord;
use crate::domain::subscription::{Filter, FilterValidationError};
use crate::infrastructure::checkpoint::FileCheckpointStore;
use crate::infrastructure::config::{ClientConfig, Credentials, StreamSettings};

use super::codec::CodecError;
use super::delivery::DeliveryQueue;
use super::dispatcher::Dispatcher;
use super::reconnect::ReconnectConfig;
use super::subscription::SubscriptionController;
use super::supervisor::{ConnectOutcome, LinkShared, Supervisor, SupervisorConfig};
use super::websocket::WebSocketTransport;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`EventStreamClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No link is open.
    #[error("event stream is not connected")]
    NotConnected,

    /// One or more filters failed validation.
    #[error(transparent)]
    InvalidFilters(#[from] FilterValidationError),

    /// Checkpoint file could not be opened.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Request serialization failed.
    #[error("failed to encode request: {0}")]
    Encode(#[from] CodecError),
}

// =============================================================================
// Connect Options
// =============================================================================

/// Parameters for [`EventStreamClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Resume point for the first attempt. Retries always resume from the
    /// latest delivered id.
    pub resume_from: Option<SequenceId>,
    /// Bound on each attempt.
    pub handshake_timeout: Duration,
    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_retries: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::from_settings(&StreamSettings::default())
    }
}

impl ConnectOptions {
    /// Options taken from configured settings, without a resume point.
    #[must_use]
    pub const fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            resume_from: None,
            handshake_timeout: settings.handshake_timeout,
            max_retries: settings.max_retries,
        }
    }

    /// Resume the first attempt from `id`.
    #[must_use]
    pub const fn with_resume_from(mut self, id: Option<SequenceId>) -> Self {
        self.resume_from = id;
        self
    }
}

// =============================================================================
// Client
// =============================================================================

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Resumable event-stream client.
pub struct EventStreamClient {
    url: String,
    credentials: Credentials,
    settings: StreamSettings,
    transport: Arc<dyn Transport>,
    shared: Arc<LinkShared>,
    watermark: Arc<Watermark>,
    dispatcher: Arc<Dispatcher>,
    queue: DeliveryQueue,
    subscriptions: SubscriptionController,
    root: CancellationToken,
    running: Mutex<Option<RunningLoop>>,
}

impl std::fmt::Debug for EventStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamClient")
            .field("url", &self.url)
            .field("credentials", &self.credentials)
            .field("status", &self.shared.status())
            .field("last_id", &self.watermark.get())
            .finish_non_exhaustive()
    }
}

impl EventStreamClient {
    /// Create a client using the WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Checkpoint`] if the configured checkpoint file
    /// is unusable.
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        Self::with_transport(config, Arc::new(WebSocketTransport::new()))
    }

    /// Create a client over any [`Transport`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Checkpoint`] if the configured checkpoint file
    /// is unusable.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, StreamError> {
        let checkpoint: Option<Arc<dyn CheckpointPort>> = match &config.checkpoint_path {
            Some(path) => Some(Arc::new(FileCheckpointStore::open(path)?)),
            None => None,
        };
        let initial = checkpoint.as_ref().and_then(|store| store.read());
        if let Some(id) = initial {
            tracing::info!(last_id = %id, "Loaded checkpoint");
        }

        let watermark = Arc::new(Watermark::new(initial));
        let shared = Arc::new(LinkShared::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&watermark),
            checkpoint,
            config.stream.checkpoint_interval,
        ));
        let queue = DeliveryQueue::new(
            config.stream.queue_capacity,
            Arc::clone(&shared),
            config.stream.disconnected_pause,
        );
        let subscriptions = SubscriptionController::new(Arc::clone(&shared), Arc::clone(&watermark));

        Ok(Self {
            url: config.url,
            credentials: config.credentials,
            settings: config.stream,
            transport,
            shared,
            watermark,
            dispatcher,
            queue,
            subscriptions,
            root: CancellationToken::new(),
            running: Mutex::new(None),
        })
    }

    /// Configured stream settings.
    #[must_use]
    pub const fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Start the connection loop and wait until it is connected or has
    /// given up. Any loop already running is stopped first.
    ///
    /// Giving up is not an error; inspect [`Self::state`] and
    /// [`Self::last_disconnect`], or keep polling [`Self::next`].
    pub async fn connect(&self, options: ConnectOptions) -> ConnectOutcome {
        self.stop_loop().await;

        let cancel = self.root.child_token();
        let (ready_tx, ready_rx) = oneshot::channel();
        let supervisor = Supervisor::new(
            SupervisorConfig {
                url: self.url.clone(),
                api_key: self.credentials.api_key().to_string(),
                resume_from: options.resume_from,
                handshake_timeout: options.handshake_timeout,
                max_retries: options.max_retries,
                reconnect: ReconnectConfig::from_stream_settings(&self.settings),
            },
            Arc::clone(&self.transport),
            Arc::clone(&self.dispatcher),
            self.queue.sender(),
            Arc::clone(&self.shared),
            Arc::clone(&self.watermark),
            cancel.clone(),
        );

        let handle = tokio::spawn(supervisor.run(ready_tx));
        *self.running.lock() = Some(RunningLoop { cancel, handle });

        let outcome = ready_rx.await.unwrap_or(ConnectOutcome::Cancelled);
        tracing::debug!(outcome = ?outcome, "Connect finished");
        outcome
    }

    /// Stop the connection loop, close the link and flush the checkpoint.
    /// Safe to call repeatedly.
    pub async fn close(&self) {
        if self.running.lock().is_some() {
            self.shared.publish(ConnectionState::Closing, false);
            self.stop_loop().await;
            self.shared
                .record_disconnect(DisconnectInfo::new(DisconnectCause::Normal, "closed by client"));
            self.shared.publish(ConnectionState::Disconnected, false);
            tracing::info!("Event stream closed");
        }
        self.dispatcher.flush();
    }

    async fn stop_loop(&self) {
        let running = self.running.lock().take();
        if let Some(RunningLoop { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Supervisor task failed");
            }
        }
    }

    /// Replace the server-side filters. See [`SubscriptionController::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidFilters`] with every violation, or
    /// [`StreamError::NotConnected`] when no link is open (the filters are
    /// still replayed on the next connect).
    pub fn subscribe(
        &self,
        filters: &[Filter],
        request_id: Option<String>,
        fill_last_id: bool,
    ) -> Result<(), StreamError> {
        self.subscriptions.subscribe(filters, request_id, fill_last_id)
    }

    /// Ask the server for the active filters.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotConnected`] when no link is open.
    pub fn request_active_filters(&self, request_id: Option<String>) -> Result<(), StreamError> {
        self.subscriptions.request_active_filters(request_id)
    }

    /// Next delivery record. See [`DeliveryQueue::next`].
    pub async fn next(&self, timeout: Option<Duration>) -> DeliveryRecord {
        self.queue.next(timeout).await
    }

    /// Records as an endless stream.
    pub fn stream(&self, timeout: Option<Duration>) -> impl Stream<Item = DeliveryRecord> + '_ {
        self.queue.stream(timeout)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.status().state
    }

    /// Current state plus whether reconnects are still pending.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        self.shared.status()
    }

    /// Most recent disconnect.
    #[must_use]
    pub fn last_disconnect(&self) -> DisconnectInfo {
        self.shared.last_disconnect()
    }

    /// Highest delivered sequence id (seeded from the checkpoint).
    #[must_use]
    pub fn last_id(&self) -> Option<SequenceId> {
        self.watermark.get()
    }

    /// The stored `filter.set` message.
    #[must_use]
    pub fn latest_filters(&self) -> Option<String> {
        self.subscriptions.latest_filters()
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.root.cancel();
        self.dispatcher.flush();
    }
}
