//! WebSocket Transport
//!
//! [`Transport`] over `tokio-tungstenite` with rustls. Each attempt sends the
//! API key in the `X-API-KEY` header and appends `?last_id=<id>` when
//! resuming. Tungstenite errors and close frames are folded into the
//! [`DisconnectCause`] taxonomy here so nothing above this layer sees them.

use std::io::ErrorKind;
use std::sync::Once;

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::application::ports::{Frame, OpenRequest, Transport, TransportError, TransportLink};
use crate::domain::connection::DisconnectCause;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

static CRYPTO_PROVIDER: Once = Once::new();

/// WebSocket [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport, installing the ring crypto provider for rustls
    /// if the process has none yet.
    #[must_use]
    pub fn new() -> Self {
        CRYPTO_PROVIDER.call_once(|| {
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                tracing::debug!("rustls crypto provider already installed");
            }
        });
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, request: &OpenRequest) -> Result<TransportLink, TransportError> {
        let url = request.url_with_resume();

        let mut client_request = url.as_str().into_client_request().map_err(map_ws_error)?;
        let api_key = HeaderValue::from_str(&request.api_key).map_err(|e| {
            TransportError::new(DisconnectCause::Unknown, format!("invalid API key header: {e}"))
        })?;
        client_request.headers_mut().insert(API_KEY_HEADER, api_key);

        let (ws_stream, response) = tokio_tungstenite::connect_async(client_request)
            .await
            .map_err(map_ws_error)?;
        tracing::debug!(status = response.status().as_u16(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(map_ws_error)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        let stream = read.filter_map(|message| future::ready(map_message(message)));

        Ok(TransportLink {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn map_message(message: Result<Message, WsError>) -> Option<Result<Frame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(Ok(Frame::Text(text))),
            Err(_) => {
                tracing::debug!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => Some(Ok(match frame {
            Some(frame) => Frame::Close {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.as_str().to_owned(),
            },
            None => Frame::Close {
                code: None,
                reason: "closed without status".to_string(),
            },
        })),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(map_ws_error(e))),
    }
}

/// Categorize a tungstenite error.
fn map_ws_error(error: WsError) -> TransportError {
    let cause = match &error {
        WsError::Http(response) => DisconnectCause::from_http_status(response.status().as_u16()),
        WsError::Io(io) => match io.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
                DisconnectCause::ConnectionRefused
            }
            ErrorKind::TimedOut => DisconnectCause::Timeout,
            _ => DisconnectCause::Abnormal,
        },
        WsError::ConnectionClosed | WsError::AlreadyClosed => DisconnectCause::Normal,
        WsError::Capacity(_) => DisconnectCause::PayloadTooLarge,
        WsError::Protocol(_) | WsError::Utf8(_) => DisconnectCause::ProtocolError,
        _ => DisconnectCause::Unknown,
    };
    TransportError::new(cause, error.to_string())
}
