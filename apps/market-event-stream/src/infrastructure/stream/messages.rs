//! Event Stream Wire Messages
//!
//! Wire format types for the event service's JSON protocol. Every message is
//! a single JSON object with a `type` discriminator.
//!
//! # Message Types
//!
//! ## Outbound
//! - `filter.set`: Replace the server-side filter list
//! - `filter.get`: Ask for the active filter list
//!
//! ## Inbound
//! - `event`: Change notification for one subject
//! - `filters`: Reply to `filter.get`
//! - `message` / `info`: Informational text
//! - `error`: Server-side error

use serde::{Deserialize, Serialize};

use crate::domain::sequence::SequenceId;
use crate::domain::streaming::{Event, EventKind, InstanceRef, parse_datetime};
use crate::domain::subscription::{
    AttributeFilter, FilterSelector, FilterSpec, FilterWindow, NameFilter,
};

use super::codec::CodecError;

// =============================================================================
// Message Type Discriminator
// =============================================================================

/// Known values of the `type` field on inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    /// Change notification.
    Event,
    /// Active filter list.
    Filters,
    /// Informational text.
    Info,
    /// Server error.
    Error,
}

impl MessageTag {
    /// Resolve a `type` value.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "event" => Some(Self::Event),
            "filters" => Some(Self::Filters),
            "message" | "info" => Some(Self::Info),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Outbound `type` for replacing filters.
pub const FILTER_SET: &str = "filter.set";

/// Outbound `type` for listing filters.
pub const FILTER_GET: &str = "filter.get";

// =============================================================================
// Filters
// =============================================================================

/// A filter as it appears on the wire, in both directions.
///
/// # Wire Format (JSON)
/// ```json
/// {"event_types": ["UPDATE"], "begin": "2024-01-01T00:00:00+00:00", "areas": ["DE"]}
/// {"event_types": ["UPDATE", "DELETE"], "names": ["DE Wind Power Production MWh/h 15min Actual"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFilter {
    /// Event-type tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,

    /// Window start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<String>,

    /// Window end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Explicit subject names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    /// Free-text query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    /// Areas.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub areas: Vec<String>,

    /// Categories (prefix match).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Categories (exact match).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exact_categories: Vec<String>,

    /// Commodities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commodities: Vec<String>,

    /// Sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Data types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_types: Vec<String>,
}

impl From<&FilterSpec> for WireFilter {
    fn from(spec: &FilterSpec) -> Self {
        let window = &spec.window;
        let mut wire = Self {
            event_types: window
                .event_types
                .iter()
                .map(|kind| kind.tag().to_string())
                .collect(),
            begin: window.begin.map(|dt| dt.to_rfc3339()),
            end: window.end.map(|dt| dt.to_rfc3339()),
            ..Self::default()
        };

        match &spec.selector {
            FilterSelector::Name(name) => wire.names.clone_from(&name.names),
            FilterSelector::Attribute(attrs) => {
                wire.q.clone_from(&attrs.q);
                wire.areas.clone_from(&attrs.areas);
                wire.categories.clone_from(&attrs.categories);
                wire.exact_categories.clone_from(&attrs.exact_categories);
                wire.commodities.clone_from(&attrs.commodities);
                wire.sources.clone_from(&attrs.sources);
                wire.data_types.clone_from(&attrs.data_types);
            }
        }

        wire
    }
}

impl TryFrom<WireFilter> for FilterSpec {
    type Error = CodecError;

    fn try_from(wire: WireFilter) -> Result<Self, Self::Error> {
        let event_types = wire
            .event_types
            .iter()
            .map(|tag| {
                EventKind::from_tag(tag).ok_or_else(|| CodecError::UnknownEventKind(tag.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let window = FilterWindow {
            event_types,
            begin: wire.begin.as_deref().map(datetime_field).transpose()?,
            end: wire.end.as_deref().map(datetime_field).transpose()?,
        };

        let selector = if wire.names.is_empty() {
            FilterSelector::Attribute(AttributeFilter {
                q: wire.q,
                areas: wire.areas,
                categories: wire.categories,
                exact_categories: wire.exact_categories,
                commodities: wire.commodities,
                sources: wire.sources,
                data_types: wire.data_types,
            })
        } else {
            FilterSelector::Name(NameFilter { names: wire.names })
        };

        Ok(Self { window, selector })
    }
}

fn datetime_field(raw: &str) -> Result<chrono::DateTime<chrono::FixedOffset>, CodecError> {
    parse_datetime(raw).ok_or_else(|| CodecError::InvalidFormat(format!("bad date-time {raw:?}")))
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Replace the server-side filter list.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "filter.set", "id": "req-1", "last_id": "1700000000000-0", "filters": [...]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSetRequest {
    /// Message type (always "filter.set")
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Caller correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resume point for the new filter set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<SequenceId>,

    /// New filter list.
    pub filters: Vec<WireFilter>,
}

impl FilterSetRequest {
    /// Build a request from validated filters.
    #[must_use]
    pub fn new(filters: &[FilterSpec]) -> Self {
        Self {
            msg_type: FILTER_SET.to_string(),
            id: None,
            last_id: None,
            filters: filters.iter().map(WireFilter::from).collect(),
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// Attach a resume point.
    #[must_use]
    pub const fn with_last_id(mut self, last_id: Option<SequenceId>) -> Self {
        self.last_id = last_id;
        self
    }
}

/// Ask for the active filter list.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "filter.get", "id": "req-2"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGetRequest {
    /// Message type (always "filter.get")
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Caller correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FilterGetRequest {
    /// Build a request.
    #[must_use]
    pub fn new(id: Option<String>) -> Self {
        Self {
            msg_type: FILTER_GET.to_string(),
            id,
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Instance reference inside an event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceMessage {
    /// Issue time.
    pub issued: String,
    /// Instance tag.
    #[serde(default)]
    pub tag: Option<String>,
}

/// Change notification.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "type": "event",
///   "id": "1700000000000-0",
///   "subject": "DE Wind Power Production MWh/h 15min Actual",
///   "event_type": "UPDATE",
///   "begin": "2024-01-01T00:00:00+01:00",
///   "end": "2024-01-02T00:00:00+01:00",
///   "values_changed": 96
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventMessage {
    /// Sequence id in wire form.
    pub id: String,
    /// Subject name.
    pub subject: String,
    /// Event-type tag.
    pub event_type: String,
    /// Affected range start.
    #[serde(default)]
    pub begin: Option<String>,
    /// Affected range end.
    #[serde(default)]
    pub end: Option<String>,
    /// Affected instance.
    #[serde(default)]
    pub instance: Option<InstanceMessage>,
    /// Number of values changed.
    #[serde(default)]
    pub values_changed: Option<u64>,
}

impl TryFrom<EventMessage> for Event {
    type Error = CodecError;

    fn try_from(msg: EventMessage) -> Result<Self, Self::Error> {
        let id: SequenceId = msg
            .id
            .parse()
            .map_err(|e: crate::domain::sequence::SequenceIdError| {
                CodecError::InvalidFormat(e.to_string())
            })?;

        let kind = EventKind::from_tag(&msg.event_type)
            .ok_or_else(|| CodecError::UnknownEventKind(msg.event_type.clone()))?;

        let instance = msg
            .instance
            .map(|inst| {
                datetime_field(&inst.issued).map(|issued| InstanceRef {
                    issued,
                    tag: inst.tag,
                })
            })
            .transpose()?;

        Ok(Self {
            id,
            subject: msg.subject,
            kind,
            begin: msg.begin.as_deref().map(datetime_field).transpose()?,
            end: msg.end.as_deref().map(datetime_field).transpose()?,
            instance,
            values_changed: msg.values_changed,
        })
    }
}

/// Reply to `filter.get`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FiltersMessage {
    /// Echoed correlation id.
    #[serde(default)]
    pub id: Option<String>,
    /// Active filters.
    #[serde(default)]
    pub filters: Vec<WireFilter>,
}

/// Informational text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NoticeMessage {
    /// Notice text.
    pub message: String,
}

/// Server error. Only the description is interpreted; the raw frame is kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Error text.
    #[serde(default)]
    pub message: Option<String>,
    /// Alternate error text field.
    #[serde(default)]
    pub description: Option<String>,
}

impl ErrorMessage {
    /// Best available description.
    #[must_use]
    pub fn text(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| "server error".to_string())
    }
}
