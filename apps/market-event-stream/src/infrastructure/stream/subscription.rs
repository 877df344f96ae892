//! Subscription Controller
//!
//! Validates caller filters, builds `filter.set` / `filter.get` requests and
//! hands them to the live link. The last `filter.set` is kept verbatim so the
//! supervisor can replay it after every reconnect.

use std::sync::Arc;

use crate::domain::sequence::Watermark;
use crate::domain::subscription::{Filter, validate_filters};

use super::client::StreamError;
use super::codec::JsonCodec;
use super::messages::{FilterGetRequest, FilterSetRequest};
use super::supervisor::LinkShared;

/// Builds and sends filter requests.
#[derive(Debug)]
pub struct SubscriptionController {
    codec: JsonCodec,
    shared: Arc<LinkShared>,
    watermark: Arc<Watermark>,
}

impl SubscriptionController {
    /// Create a controller.
    #[must_use]
    pub const fn new(shared: Arc<LinkShared>, watermark: Arc<Watermark>) -> Self {
        Self {
            codec: JsonCodec::new(),
            shared,
            watermark,
        }
    }

    /// Replace the server-side filters.
    ///
    /// With `fill_last_id`, the request carries the current watermark (when
    /// one is known) so the server replays anything after it under the new
    /// filters.
    ///
    /// # Errors
    ///
    /// - [`StreamError::InvalidFilters`] listing every violation; nothing is
    ///   stored or sent.
    /// - [`StreamError::NotConnected`] when no link is open; the request is
    ///   still stored and goes out on the next connect.
    pub fn subscribe(
        &self,
        filters: &[Filter],
        request_id: Option<String>,
        fill_last_id: bool,
    ) -> Result<(), StreamError> {
        let specs = validate_filters(filters)?;

        let last_id = if fill_last_id { self.watermark.get() } else { None };
        let request = FilterSetRequest::new(&specs)
            .with_id(request_id)
            .with_last_id(last_id);
        let message = self.codec.encode(&request)?;

        tracing::info!(
            filters = specs.len(),
            request_id = ?request.id,
            last_id = ?last_id.map(|id| id.to_string()),
            "Updating subscription"
        );

        self.shared
            .store_and_send_subscription(message)
            .map_err(|_| StreamError::NotConnected)
    }

    /// Ask the server for the active filters. The reply arrives as a
    /// `Filters` record echoing `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotConnected`] when no link is open.
    pub fn request_active_filters(&self, request_id: Option<String>) -> Result<(), StreamError> {
        let message = self.codec.encode(&FilterGetRequest::new(request_id))?;
        self.shared
            .send(message)
            .map_err(|_| StreamError::NotConnected)
    }

    /// The stored `filter.set` message, exactly as it will be replayed.
    #[must_use]
    pub fn latest_filters(&self) -> Option<String> {
        self.shared.subscription()
    }
}
