//! Message Dispatcher
//!
//! Turns each raw inbound frame into exactly one [`DeliveryRecord`]. Decode
//! failures become [`ErrorNotice`]s carrying the raw text, so nothing is ever
//! dropped. Successful events advance the watermark and feed the checkpoint
//! store.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::CheckpointPort;
use crate::domain::sequence::Watermark;
use crate::domain::streaming::{DeliveryRecord, ErrorNotice, InboundMessage, NoticeOrigin};
use crate::infrastructure::metrics;

use super::codec::JsonCodec;

/// Classifies frames and tracks delivery progress.
pub struct Dispatcher {
    codec: JsonCodec,
    watermark: Arc<Watermark>,
    checkpoint: Option<Arc<dyn CheckpointPort>>,
    checkpoint_interval: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("watermark", &self.watermark.get())
            .field("checkpoint", &self.checkpoint.is_some())
            .field("checkpoint_interval", &self.checkpoint_interval)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        watermark: Arc<Watermark>,
        checkpoint: Option<Arc<dyn CheckpointPort>>,
        checkpoint_interval: Duration,
    ) -> Self {
        Self {
            codec: JsonCodec::new(),
            watermark,
            checkpoint,
            checkpoint_interval,
        }
    }

    /// Classify one frame.
    pub fn dispatch(&self, raw: &str) -> DeliveryRecord {
        let record = match self.codec.decode(raw) {
            Ok(InboundMessage::Event(event)) => {
                if self.watermark.advance(event.id) {
                    self.persist(self.checkpoint_interval);
                }
                DeliveryRecord::Event(event)
            }
            Ok(message) => DeliveryRecord::from(message),
            Err(e) => {
                tracing::warn!(error = %e, raw_len = raw.len(), "Failed to decode frame");
                metrics::record_decode_failure();
                DeliveryRecord::Error(ErrorNotice {
                    origin: NoticeOrigin::Decode,
                    message: e.to_string(),
                    raw: raw.to_string(),
                })
            }
        };

        metrics::record_message_received(record.kind());
        record
    }

    /// Force the current watermark into the checkpoint store.
    pub fn flush(&self) {
        self.persist(Duration::ZERO);
    }

    fn persist(&self, min_interval: Duration) {
        let (Some(store), Some(id)) = (&self.checkpoint, self.watermark.get()) else {
            return;
        };

        match store.write(id, min_interval) {
            Ok(true) => metrics::record_checkpoint_write(),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, last_id = %id, "Checkpoint write failed"),
        }
    }
}
