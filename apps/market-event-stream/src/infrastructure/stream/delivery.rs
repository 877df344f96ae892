//! Delivery Queue
//!
//! Bounded FIFO between the supervisor task and the consumer. The consumer
//! side also synthesizes `Timeout` and `Disconnected` records, but only when
//! the queue is empty, so a synthetic record never jumps ahead of a real one.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::domain::connection::{ConnectionState, LinkStatus};
use crate::domain::streaming::DeliveryRecord;

use super::supervisor::LinkShared;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default spacing between repeated `Disconnected` records.
pub const DEFAULT_DISCONNECTED_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Consumer {
    records: mpsc::Receiver<DeliveryRecord>,
    status: watch::Receiver<LinkStatus>,
    pause_until: Option<Instant>,
}

/// Record queue plus the consumer-side iteration logic.
#[derive(Debug)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<DeliveryRecord>,
    consumer: tokio::sync::Mutex<Consumer>,
    shared: Arc<LinkShared>,
    disconnected_pause: Duration,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize, shared: Arc<LinkShared>, disconnected_pause: Duration) -> Self {
        let (sender, records) = mpsc::channel(capacity.max(1));
        let status = shared.watch_status();
        Self {
            sender,
            consumer: tokio::sync::Mutex::new(Consumer {
                records,
                status,
                pause_until: None,
            }),
            shared,
            disconnected_pause,
        }
    }

    /// Producer handle for the supervisor.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<DeliveryRecord> {
        self.sender.clone()
    }

    /// Next record.
    ///
    /// Queued records always come first. With an empty queue: while connected,
    /// waits up to `timeout` (forever when `None`) and then yields `Timeout`;
    /// while reconnecting, waits for a record or a state change; when down
    /// for good, yields `Disconnected`, spacing repeats by the configured
    /// pause. A timeout too large to form a deadline waits like `None`.
    pub async fn next(&self, timeout: Option<Duration>) -> DeliveryRecord {
        let mut consumer = self.consumer.lock().await;
        let Consumer {
            records,
            status,
            pause_until,
        } = &mut *consumer;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if let Ok(record) = records.try_recv() {
                return record;
            }

            if status.has_changed().unwrap_or(false) {
                *pause_until = None;
            }
            let current = *status.borrow_and_update();

            if current.state == ConnectionState::Connected {
                tokio::select! {
                    Some(record) = records.recv() => return record,
                    _ = status.changed() => continue,
                    () = sleep_until_deadline(deadline) => return DeliveryRecord::Timeout,
                }
            }

            if current.retrying {
                tokio::select! {
                    Some(record) = records.recv() => return record,
                    _ = status.changed() => continue,
                }
            }

            if let Some(until) = *pause_until
                && Instant::now() < until
            {
                tokio::select! {
                    Some(record) = records.recv() => return record,
                    _ = status.changed() => {
                        *pause_until = None;
                        continue;
                    }
                    () = tokio::time::sleep_until(until) => {}
                }
            }

            *pause_until = Instant::now().checked_add(self.disconnected_pause);
            return DeliveryRecord::Disconnected(self.shared.last_disconnect());
        }
    }

    /// Infinite stream of records with the same contract as [`Self::next`].
    pub fn stream(&self, timeout: Option<Duration>) -> impl Stream<Item = DeliveryRecord> + '_ {
        futures::stream::unfold(self, move |queue| async move {
            Some((queue.next(timeout).await, queue))
        })
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::{DisconnectCause, DisconnectInfo};
    use crate::domain::streaming::{InfoNotice, MessageKind};
    use futures::StreamExt;

    fn info(text: &str) -> DeliveryRecord {
        DeliveryRecord::Info(InfoNotice {
            message: text.to_string(),
        })
    }

    fn queue(pause: Duration) -> (DeliveryQueue, Arc<LinkShared>) {
        let shared = Arc::new(LinkShared::new());
        (DeliveryQueue::new(16, Arc::clone(&shared), pause), shared)
    }

    #[tokio::test]
    async fn queued_records_come_first_in_order() {
        let (queue, _) = queue(DEFAULT_DISCONNECTED_PAUSE);
        let sender = queue.sender();
        for text in ["a", "b", "c"] {
            sender.send(info(text)).await.unwrap();
        }

        assert_eq!(queue.next(None).await, info("a"));
        assert_eq!(queue.next(None).await, info("b"));
        assert_eq!(queue.next(None).await, info("c"));
        assert_eq!(queue.next(None).await.kind(), MessageKind::Disconnected);
    }

    #[tokio::test]
    async fn disconnected_carries_last_cause() {
        let (queue, shared) = queue(DEFAULT_DISCONNECTED_PAUSE);
        let cause = DisconnectInfo::new(DisconnectCause::HttpClientError(401), "unauthorized").exhausted();
        shared.record_disconnect(cause.clone());

        assert_eq!(queue.next(None).await, DeliveryRecord::Disconnected(cause));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_while_connected() {
        let (queue, shared) = queue(DEFAULT_DISCONNECTED_PAUSE);
        shared.publish(ConnectionState::Connected, true);

        let record = queue.next(Some(Duration::from_millis(50))).await;
        assert_eq!(record, DeliveryRecord::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_waits_for_the_next_record() {
        let (queue, shared) = queue(DEFAULT_DISCONNECTED_PAUSE);
        shared.publish(ConnectionState::Connected, true);
        let sender = queue.sender();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            sender.send(info("late")).await.unwrap();
        });

        assert_eq!(queue.next(Some(Duration::MAX)).await, info("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_disconnected_records_are_spaced() {
        let (queue, _) = queue(Duration::from_secs(2));

        let start = Instant::now();
        assert_eq!(queue.next(None).await.kind(), MessageKind::Disconnected);
        assert!(start.elapsed() < Duration::from_millis(10));

        assert_eq!(queue.next(None).await.kind(), MessageKind::Disconnected);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_ends_early_when_record_arrives() {
        let (queue, _) = queue(Duration::from_secs(60));
        let sender = queue.sender();

        assert_eq!(queue.next(None).await.kind(), MessageKind::Disconnected);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sender.send(info("late")).await.unwrap();
        });

        let start = Instant::now();
        assert_eq!(queue.next(None).await, info("late"));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_waits_without_synthetic_records() {
        let (queue, shared) = queue(DEFAULT_DISCONNECTED_PAUSE);
        shared.publish(ConnectionState::Disconnected, true);

        let waiter = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                shared.publish(ConnectionState::Disconnected, false);
            })
        };

        let start = Instant::now();
        let record = queue.next(Some(Duration::from_millis(10))).await;
        assert_eq!(record.kind(), MessageKind::Disconnected);
        assert!(start.elapsed() >= Duration::from_secs(30));
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn retrying_next_stays_pending_until_a_record_arrives() {
        let (queue, shared) = queue(DEFAULT_DISCONNECTED_PAUSE);
        shared.publish(ConnectionState::Disconnected, true);

        let mut next = tokio_test::task::spawn(queue.next(None));
        tokio_test::assert_pending!(next.poll());

        queue.sender().try_send(info("resumed")).unwrap();
        assert!(next.is_woken());
        assert_eq!(tokio_test::assert_ready!(next.poll()), info("resumed"));
    }

    #[tokio::test]
    async fn stream_yields_same_records() {
        let (queue, _) = queue(DEFAULT_DISCONNECTED_PAUSE);
        let sender = queue.sender();
        sender.send(info("x")).await.unwrap();

        let records: Vec<_> = queue.stream(None).take(2).collect().await;
        assert_eq!(records[0], info("x"));
        assert_eq!(records[1].kind(), MessageKind::Disconnected);
    }
}
