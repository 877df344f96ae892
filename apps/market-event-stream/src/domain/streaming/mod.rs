//! Event Streaming Types
//!
//! Core domain types for the push stream: events, notices, and the records
//! handed to consumers. These types are codec-agnostic; the wire mapping lives
//! in `infrastructure::stream::messages`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use super::connection::DisconnectInfo;
use super::sequence::SequenceId;
use super::subscription::FilterSpec;

// =============================================================================
// Event Kind Registry
// =============================================================================

/// What happened to the subject of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Subject was created.
    Create,
    /// Values were written.
    Update,
    /// Subject was deleted.
    Delete,
    /// Values were removed from a point onwards.
    Truncate,
}

impl EventKind {
    /// All kinds in registry order.
    pub const ALL: [Self; 4] = [Self::Create, Self::Update, Self::Delete, Self::Truncate];

    /// Canonical wire tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
        }
    }

    const fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Create => &["CREATE", "CURVE_CREATE"],
            Self::Update => &["UPDATE", "CURVE_UPDATE"],
            Self::Delete => &["DELETE", "CURVE_DELETE"],
            Self::Truncate => &["TRUNCATE", "CURVE_TRUNCATE"],
        }
    }

    /// Resolve a tag (case-insensitive) against the registry.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        EVENT_KINDS
            .get(tag.trim().to_ascii_uppercase().as_str())
            .copied()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

static EVENT_KINDS: LazyLock<HashMap<&'static str, EventKind>> = LazyLock::new(|| {
    EventKind::ALL
        .iter()
        .flat_map(|kind| kind.aliases().iter().map(move |alias| (*alias, *kind)))
        .collect()
});

// =============================================================================
// Date-Time Parsing
// =============================================================================

/// Parse a server or caller supplied date-time.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[T ]HH:MM[:SS[.fff]]` (taken as UTC) and
/// bare dates, which are promoted to midnight UTC.
#[must_use]
pub fn parse_datetime(input: &str) -> Option<DateTime<FixedOffset>> {
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Instance (issue) a forecast-style event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRef {
    /// Issue time of the instance.
    pub issued: DateTime<FixedOffset>,
    /// Optional instance tag.
    pub tag: Option<String>,
}

/// Change notification for a single subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Ordered identifier, also the resume point.
    pub id: SequenceId,
    /// Name of the changed subject.
    pub subject: String,
    /// What happened.
    pub kind: EventKind,
    /// Start of the affected range.
    pub begin: Option<DateTime<FixedOffset>>,
    /// End of the affected range.
    pub end: Option<DateTime<FixedOffset>>,
    /// Instance the change applies to, if any.
    pub instance: Option<InstanceRef>,
    /// Number of values changed, when reported.
    pub values_changed: Option<u64>,
}

/// Reply to a `filter.get` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterListReply {
    /// Request id echoed by the server.
    pub request_id: Option<String>,
    /// Filters active on the server.
    pub filters: Vec<FilterSpec>,
}

/// Informational text from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoNotice {
    /// Notice text.
    pub message: String,
}

/// Where an error notice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOrigin {
    /// The server sent an `error` message.
    Server,
    /// A frame could not be decoded locally.
    Decode,
}

/// Error reported by the server, or a frame that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    /// Server error or local decode failure.
    pub origin: NoticeOrigin,
    /// Human-readable description.
    pub message: String,
    /// Raw frame text as received.
    pub raw: String,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Change notification.
    Event(Event),
    /// Active filter list.
    Filters(FilterListReply),
    /// Informational notice.
    Info(InfoNotice),
    /// Server error notice.
    Error(ErrorNotice),
}

// =============================================================================
// Delivery Records
// =============================================================================

/// Kind tag for a [`DeliveryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Change notification.
    Event,
    /// Active filter list.
    Filters,
    /// Informational notice.
    Info,
    /// Server error or decode failure.
    Error,
    /// Synthetic: nothing arrived within the poll timeout.
    Timeout,
    /// Synthetic: the stream is disconnected and not retrying.
    Disconnected,
}

impl MessageKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Filters => "filters",
            Self::Info => "info",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether records of this kind are produced locally.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        matches!(self, Self::Timeout | Self::Disconnected)
    }
}

/// One item handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryRecord {
    /// Change notification.
    Event(Event),
    /// Active filter list.
    Filters(FilterListReply),
    /// Informational notice.
    Info(InfoNotice),
    /// Server error or decode failure.
    Error(ErrorNotice),
    /// Poll timed out while connected.
    Timeout,
    /// Stream is down and the supervisor has stopped retrying.
    Disconnected(DisconnectInfo),
}

impl DeliveryRecord {
    /// Kind tag of this record.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Event(_) => MessageKind::Event,
            Self::Filters(_) => MessageKind::Filters,
            Self::Info(_) => MessageKind::Info,
            Self::Error(_) => MessageKind::Error,
            Self::Timeout => MessageKind::Timeout,
            Self::Disconnected(_) => MessageKind::Disconnected,
        }
    }
}

impl From<InboundMessage> for DeliveryRecord {
    fn from(message: InboundMessage) -> Self {
        match message {
            InboundMessage::Event(event) => Self::Event(event),
            InboundMessage::Filters(reply) => Self::Filters(reply),
            InboundMessage::Info(notice) => Self::Info(notice),
            InboundMessage::Error(notice) => Self::Error(notice),
        }
    }
}
