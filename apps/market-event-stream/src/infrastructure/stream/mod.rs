//! Event Stream Adapters
//!
//! The persistent event-stream client and its parts:
//!
//! - **Codec**: JSON wire messages in and out
//! - **Dispatcher**: Frame classification, watermark and checkpoint updates
//! - **Delivery**: Bounded queue plus the consumer iterator
//! - **Subscription**: `filter.set` / `filter.get` requests and replay storage
//! - **Supervisor**: Connect, replay, pump and reconnect loop
//! - **WebSocket**: `tokio-tungstenite` transport

pub mod client;
pub mod codec;
pub mod delivery;
pub mod dispatcher;
pub mod messages;
pub mod reconnect;
pub mod subscription;
pub mod supervisor;
pub mod websocket;

pub use client::{ConnectOptions, EventStreamClient, StreamError};
pub use codec::{CodecError, JsonCodec};
pub use delivery::DeliveryQueue;
pub use dispatcher::Dispatcher;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use subscription::SubscriptionController;
pub use supervisor::{ConnectOutcome, LinkShared, Supervisor, SupervisorConfig};
pub use websocket::WebSocketTransport;
