//! Connection Supervisor
//!
//! One background task owns the transport. It opens the stream, replays the
//! stored subscription as the first outbound frame, pumps inbound frames
//! through the [`Dispatcher`] into the delivery queue, and reconnects with
//! the [`ReconnectPolicy`] until cancelled or out of attempts.
//!
//! Everything other tasks need to observe lives in [`LinkShared`]: the link
//! status (a `watch` channel), the last disconnect, and the outbound slot
//! holding the subscription message plus the sender used while connected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Frame, OpenRequest, Transport, TransportLink};
use crate::domain::connection::{ConnectionState, DisconnectCause, DisconnectInfo, LinkStatus};
use crate::domain::sequence::{SequenceId, Watermark};
use crate::domain::streaming::DeliveryRecord;
use crate::infrastructure::metrics;

use super::dispatcher::Dispatcher;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Shared Link State
// =============================================================================

#[derive(Debug, Default)]
struct OutboundSlot {
    subscription: Option<String>,
    sender: Option<mpsc::UnboundedSender<String>>,
}

/// Why an outbound frame could not be handed to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotConnected;

/// State shared between the supervisor task and the client handles.
#[derive(Debug)]
pub struct LinkShared {
    status: watch::Sender<LinkStatus>,
    last_disconnect: RwLock<DisconnectInfo>,
    outbound: Mutex<OutboundSlot>,
}

impl Default for LinkShared {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkShared {
    /// Create idle shared state.
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(LinkStatus::idle());
        Self {
            status,
            last_disconnect: RwLock::new(DisconnectInfo::never_connected()),
            outbound: Mutex::new(OutboundSlot::default()),
        }
    }

    /// Current link status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Watch link status transitions.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Publish a transition.
    pub fn publish(&self, state: ConnectionState, retrying: bool) {
        let next = LinkStatus { state, retrying };
        let previous = self.status.send_replace(next);
        if previous != next {
            tracing::debug!(
                from = previous.state.as_str(),
                to = state.as_str(),
                retrying,
                "Link state changed"
            );
            metrics::set_connection_state(state);
        }
    }

    /// Most recent disconnect.
    #[must_use]
    pub fn last_disconnect(&self) -> DisconnectInfo {
        self.last_disconnect.read().clone()
    }

    /// Record a disconnect.
    pub fn record_disconnect(&self, info: DisconnectInfo) {
        *self.last_disconnect.write() = info;
    }

    /// Stored subscription message.
    #[must_use]
    pub fn subscription(&self) -> Option<String> {
        self.outbound.lock().subscription.clone()
    }

    /// Replace the subscription and try to send it on the live link.
    ///
    /// # Errors
    ///
    /// Returns [`NotConnected`] when no link is open; the message is still
    /// stored and will be replayed on the next connect.
    pub fn store_and_send_subscription(&self, message: String) -> Result<(), NotConnected> {
        let mut slot = self.outbound.lock();
        slot.subscription = Some(message.clone());
        Self::send_on(&mut slot, message)
    }

    /// Send a frame on the live link.
    ///
    /// # Errors
    ///
    /// Returns [`NotConnected`] when no link is open.
    pub fn send(&self, message: String) -> Result<(), NotConnected> {
        Self::send_on(&mut self.outbound.lock(), message)
    }

    fn send_on(slot: &mut OutboundSlot, message: String) -> Result<(), NotConnected> {
        let Some(sender) = &slot.sender else {
            return Err(NotConnected);
        };
        if sender.send(message).is_err() {
            slot.sender = None;
            return Err(NotConnected);
        }
        Ok(())
    }

    /// Install the outbound channel and take the subscription to replay, in
    /// one step so no subscribe call can fall between them.
    pub(crate) fn open_outbound(&self) -> (Option<String>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.outbound.lock();
        slot.sender = Some(tx);
        (slot.subscription.clone(), rx)
    }

    fn close_outbound(&self) {
        self.outbound.lock().sender = None;
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Settings for one supervisor run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Base stream URL.
    pub url: String,
    /// API key.
    pub api_key: String,
    /// Resume point for the first attempt.
    pub resume_from: Option<SequenceId>,
    /// Bound on each open attempt.
    pub handshake_timeout: Duration,
    /// Consecutive failed attempts before giving up (0 = never).
    pub max_retries: u32,
    /// Delay tuning.
    pub reconnect: ReconnectConfig,
}

/// How the first connection phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Link is open.
    Connected,
    /// Attempts exhausted before any link opened.
    Exhausted(DisconnectInfo),
    /// Loop stopped by `close()` or a newer `connect()` first.
    Cancelled,
}

enum SessionEnd {
    Dropped(DisconnectInfo),
    Cancelled,
}

/// Background task owning the transport.
pub struct Supervisor {
    config: SupervisorConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    queue: mpsc::Sender<DeliveryRecord>,
    shared: Arc<LinkShared>,
    watermark: Arc<Watermark>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("url", &self.config.url)
            .field("max_retries", &self.config.max_retries)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor.
    #[must_use]
    pub fn new(
        config: SupervisorConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        queue: mpsc::Sender<DeliveryRecord>,
        shared: Arc<LinkShared>,
        watermark: Arc<Watermark>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            transport,
            dispatcher,
            queue,
            shared,
            watermark,
            cancel,
        }
    }

    /// Run until cancelled or out of attempts.
    ///
    /// `ready` fires once: when the first link opens, or when attempts run
    /// out before one does.
    pub async fn run(self, ready: oneshot::Sender<ConnectOutcome>) {
        let mut ready = Some(ready);
        let mut policy = ReconnectPolicy::new(
            self.config.reconnect.clone(),
            self.config.handshake_timeout,
            self.config.max_retries,
        );
        let mut first_attempt = true;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Event stream supervisor cancelled");
                return;
            }

            let attempt = policy.begin_attempt();
            let resume_from = if first_attempt {
                self.config.resume_from
            } else {
                self.watermark.get().or(self.config.resume_from)
            };
            first_attempt = false;

            let info = match self.open(attempt, resume_from).await {
                None => return,
                Some(Err(info)) => info,
                Some(Ok(link)) => {
                    policy.reset();
                    match self.run_session(link, &mut ready).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Dropped(info) => info,
                    }
                }
            };

            self.on_disconnect(&info);

            let Some(delay) = policy.next_delay() else {
                let info = info.exhausted();
                tracing::error!(
                    attempts = policy.attempt_count(),
                    cause = %info.cause,
                    detail = %info.detail,
                    "Giving up on event stream"
                );
                self.shared.record_disconnect(info.clone());
                self.shared.publish(ConnectionState::Disconnected, false);
                if let Some(ready) = ready.take() {
                    let _ = ready.send(ConnectOutcome::Exhausted(info));
                }
                return;
            };

            self.shared.publish(ConnectionState::Disconnected, true);
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to event stream"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Event stream supervisor cancelled during reconnect delay");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One bounded open attempt. `None` means cancelled.
    async fn open(
        &self,
        attempt: u32,
        resume_from: Option<SequenceId>,
    ) -> Option<Result<TransportLink, DisconnectInfo>> {
        let request = OpenRequest {
            url: self.config.url.clone(),
            api_key: self.config.api_key.clone(),
            resume_from,
            attempt,
        };

        self.shared.publish(ConnectionState::Connecting, true);
        metrics::record_connect_attempt();
        tracing::info!(
            attempt,
            url = %self.config.url,
            resume_from = ?resume_from.map(|id| id.to_string()),
            "Connecting to event stream"
        );

        let opened = tokio::select! {
            () = self.cancel.cancelled() => return None,
            opened = tokio::time::timeout(self.config.handshake_timeout, self.transport.open(&request)) => opened,
        };

        Some(match opened {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(DisconnectInfo::new(e.cause, e.detail)),
            Err(_) => Err(DisconnectInfo::new(
                DisconnectCause::Timeout,
                format!(
                    "handshake did not complete within {}ms",
                    self.config.handshake_timeout.as_millis()
                ),
            )),
        })
    }

    async fn run_session(
        &self,
        link: TransportLink,
        ready: &mut Option<oneshot::Sender<ConnectOutcome>>,
    ) -> SessionEnd {
        let TransportLink {
            mut sink,
            mut stream,
        } = link;

        let (replay, mut outbound) = self.shared.open_outbound();
        let end = 'session: {
            if let Some(message) = replay {
                if let Err(e) = sink.send(message).await {
                    break 'session SessionEnd::Dropped(DisconnectInfo::new(e.cause, e.detail));
                }
                tracing::info!("Replayed subscription");
            }

            self.shared.publish(ConnectionState::Connected, true);
            tracing::info!(url = %self.config.url, "Connected to event stream");
            if let Some(ready) = ready.take() {
                let _ = ready.send(ConnectOutcome::Connected);
            }

            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        self.shared.close_outbound();
                        let _ = sink.close().await;
                        break 'session SessionEnd::Cancelled;
                    }
                    Some(message) = outbound.recv() => {
                        if let Err(e) = sink.send(message).await {
                            break 'session SessionEnd::Dropped(DisconnectInfo::new(e.cause, e.detail));
                        }
                    }
                    frame = stream.next() => {
                        match frame {
                            Some(Ok(Frame::Text(text))) => {
                                let record = self.dispatcher.dispatch(&text);
                                if !self.push(record).await {
                                    self.shared.close_outbound();
                                    let _ = sink.close().await;
                                    break 'session SessionEnd::Cancelled;
                                }
                            }
                            Some(Ok(Frame::Close { code, reason })) => {
                                let cause = code.map_or(DisconnectCause::Abnormal, DisconnectCause::from_close_code);
                                break 'session SessionEnd::Dropped(DisconnectInfo::new(cause, reason));
                            }
                            Some(Err(e)) => {
                                break 'session SessionEnd::Dropped(DisconnectInfo::new(e.cause, e.detail));
                            }
                            None => {
                                break 'session SessionEnd::Dropped(DisconnectInfo::new(
                                    DisconnectCause::Abnormal,
                                    "stream ended without close frame",
                                ));
                            }
                        }
                    }
                }
            }
        };

        self.shared.close_outbound();
        let mut unsent = 0_usize;
        while outbound.try_recv().is_ok() {
            unsent += 1;
        }
        if unsent > 0 {
            tracing::debug!(unsent, "Dropped outbound frames queued before disconnect");
        }
        end
    }

    /// Hand a record to the consumer. `false` means cancelled while waiting
    /// for queue capacity.
    async fn push(&self, record: DeliveryRecord) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.queue.send(record) => sent.is_ok(),
        }
    }

    fn on_disconnect(&self, info: &DisconnectInfo) {
        tracing::warn!(cause = %info.cause, detail = %info.detail, "Event stream disconnected");
        metrics::record_disconnect(info.cause);
        self.shared.record_disconnect(info.clone());
        self.dispatcher.flush();
    }
}
