//! Stream Codec Module
//!
//! Decodes inbound JSON frames into [`InboundMessage`]s and encodes outbound
//! requests. Classification is a closed match on [`MessageTag`]; an unknown
//! tag is only accepted when the object carries a plain `message` string, in
//! which case it is treated as an informational notice.

use serde_json::Value;

use crate::domain::streaming::{
    ErrorNotice, Event, FilterListReply, InboundMessage, InfoNotice, NoticeOrigin,
};
use crate::domain::subscription::FilterSpec;

use super::messages::{
    ErrorMessage, EventMessage, FiltersMessage, MessageTag, NoticeMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message has no string `type` field.
    #[error("missing message type")]
    MissingType,

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Event type tag not in the registry.
    #[error("unknown event type: {0}")]
    UnknownEventKind(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the event stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, has no usable
    /// `type`, or a typed payload fails to parse.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;

        let Some(object) = value.as_object() else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                text.chars().take(50).collect::<String>()
            )));
        };

        let tag = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?
            .to_string();

        match MessageTag::from_tag(&tag) {
            Some(MessageTag::Event) => {
                let m: EventMessage = serde_json::from_value(value)?;
                Ok(InboundMessage::Event(Event::try_from(m)?))
            }
            Some(MessageTag::Filters) => {
                let m: FiltersMessage = serde_json::from_value(value)?;
                let filters = m
                    .filters
                    .into_iter()
                    .map(FilterSpec::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(InboundMessage::Filters(FilterListReply {
                    request_id: m.id,
                    filters,
                }))
            }
            Some(MessageTag::Info) => {
                let m: NoticeMessage = serde_json::from_value(value)?;
                Ok(InboundMessage::Info(InfoNotice { message: m.message }))
            }
            Some(MessageTag::Error) => {
                let m: ErrorMessage = serde_json::from_value(value)?;
                Ok(InboundMessage::Error(ErrorNotice {
                    origin: NoticeOrigin::Server,
                    message: m.text(),
                    raw: text.to_string(),
                }))
            }
            None => match object.get("message").and_then(Value::as_str) {
                Some(message) => Ok(InboundMessage::Info(InfoNotice {
                    message: message.to_string(),
                })),
                None => Err(CodecError::UnknownMessageType(tag)),
            },
        }
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sequence::SequenceId;
    use crate::domain::streaming::EventKind;
    use crate::infrastructure::stream::messages::FilterGetRequest;

    #[test]
    fn decode_event() {
        let codec = JsonCodec::new();
        let json = r#"{"type":"event","id":"1700000000000-1","subject":"FR Price","event_type":"UPDATE"}"#;

        match codec.decode(json).unwrap() {
            InboundMessage::Event(event) => {
                assert_eq!(event.id, SequenceId::new(1_700_000_000_000, 1));
                assert_eq!(event.subject, "FR Price");
                assert_eq!(event.kind, EventKind::Update);
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn decode_filters_reply() {
        let codec = JsonCodec::new();
        let json = r#"{"type":"filters","id":"r1","filters":[{"event_types":["DELETE"],"names":["X"]}]}"#;

        match codec.decode(json).unwrap() {
            InboundMessage::Filters(reply) => {
                assert_eq!(reply.request_id.as_deref(), Some("r1"));
                assert_eq!(reply.filters.len(), 1);
                assert!(reply.filters[0].is_name_filter());
            }
            other => panic!("expected Filters, got {other:?}"),
        }
    }

    #[test]
    fn decode_info_variants() {
        let codec = JsonCodec::new();
        for json in [
            r#"{"type":"message","message":"hello"}"#,
            r#"{"type":"info","message":"hello"}"#,
            r#"{"type":"welcome","message":"hello"}"#,
        ] {
            assert_eq!(
                codec.decode(json).unwrap(),
                InboundMessage::Info(InfoNotice {
                    message: "hello".to_string()
                })
            );
        }
    }

    #[test]
    fn decode_server_error_keeps_raw() {
        let codec = JsonCodec::new();
        let json = r#"{"type":"error","description":"bad filter","code":400}"#;

        match codec.decode(json).unwrap() {
            InboundMessage::Error(notice) => {
                assert_eq!(notice.origin, NoticeOrigin::Server);
                assert_eq!(notice.message, "bad filter");
                assert_eq!(notice.raw, json);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn decode_failures() {
        let codec = JsonCodec::new();
        assert!(matches!(codec.decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(codec.decode("[1,2]"), Err(CodecError::InvalidFormat(_))));
        assert!(matches!(
            codec.decode(r#"{"id":"1-0"}"#),
            Err(CodecError::MissingType)
        ));
        assert!(matches!(
            codec.decode(r#"{"type":"mystery"}"#),
            Err(CodecError::UnknownMessageType(t)) if t == "mystery"
        ));
        assert!(matches!(
            codec.decode(r#"{"type":"event","id":"1-0","subject":"S"}"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn encode_request() {
        let codec = JsonCodec::new();
        let json = codec
            .encode(&FilterGetRequest::new(Some("abc".to_string())))
            .unwrap();
        assert_eq!(json, r#"{"type":"filter.get","id":"abc"}"#);
    }
}
