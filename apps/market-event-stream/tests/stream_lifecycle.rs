//! Event Stream Lifecycle Integration Tests
//!
//! Drives `EventStreamClient` through a scripted in-process transport:
//! retry exhaustion, resume ids, subscription replay, delivery order and
//! shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::time::Instant;

use market_event_stream::{
    CheckpointPort, ClientConfig, ConnectOptions, ConnectOutcome, ConnectionState, Credentials,
    DeliveryRecord, DisconnectCause, EventStreamClient, FileCheckpointStore, Filter, Frame,
    MessageKind, NoticeOrigin, OpenRequest, SequenceId, StreamError, StreamSettings, Transport,
    TransportError, TransportLink,
};

// =============================================================================
// Scripted Transport
// =============================================================================

enum Step {
    Fail(TransportError),
    Hang,
    Open(TransportLink),
}

/// Server end of an in-process link.
struct ServerEnd {
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    fn send_text(&self, text: impl Into<String>) {
        self.to_client
            .unbounded_send(Ok(Frame::Text(text.into())))
            .unwrap();
    }

    fn send_event(&self, id: &str) {
        self.send_text(format!(
            r#"{{"type":"event","id":"{id}","subject":"FR Price","event_type":"UPDATE"}}"#
        ));
    }

    fn close(&self, code: u16) {
        self.to_client
            .unbounded_send(Ok(Frame::Close {
                code: Some(code),
                reason: "bye".to_string(),
            }))
            .unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        self.from_client.next().await
    }
}

fn link_pair() -> (ServerEnd, TransportLink) {
    let (to_client, client_rx) = mpsc::unbounded();
    let (client_tx, from_client) = mpsc::unbounded::<String>();

    let sink = client_tx
        .sink_map_err(|e| TransportError::new(DisconnectCause::Abnormal, e.to_string()));

    (
        ServerEnd {
            to_client,
            from_client,
        },
        TransportLink {
            sink: Box::pin(sink),
            stream: Box::pin(client_rx),
        },
    )
}

#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<OpenRequest>>,
}

impl ScriptedTransport {
    fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    fn open_link(&self) -> ServerEnd {
        let (server, link) = link_pair();
        self.push(Step::Open(link));
        server
    }

    fn attempts(&self) -> usize {
        self.requests.lock().len()
    }

    fn request(&self, index: usize) -> OpenRequest {
        self.requests.lock()[index].clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: &OpenRequest) -> Result<TransportLink, TransportError> {
        self.requests.lock().push(request.clone());
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Open(link)) => Ok(link),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportError::new(
                DisconnectCause::ConnectionRefused,
                "connection refused",
            )),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn settings() -> StreamSettings {
    StreamSettings {
        handshake_timeout: Duration::from_secs(2),
        max_retries: 3,
        ..StreamSettings::default()
    }
}

fn client_with(transport: &Arc<ScriptedTransport>, checkpoint: Option<&Path>) -> EventStreamClient {
    let mut config = ClientConfig::new(
        "wss://stream.test/events",
        Credentials::new("test-key".to_string()),
    );
    config.stream = settings();
    if let Some(path) = checkpoint {
        config = config.with_checkpoint_path(path);
    }
    EventStreamClient::with_transport(config, Arc::clone(transport) as Arc<dyn Transport>).unwrap()
}

fn options() -> ConnectOptions {
    ConnectOptions::from_settings(&settings())
}

fn event_id(record: &DeliveryRecord) -> SequenceId {
    match record {
        DeliveryRecord::Event(event) => event.id,
        other => panic!("expected event, got {other:?}"),
    }
}

// =============================================================================
// Connection Supervisor
// =============================================================================

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_makes_exactly_max_retries_attempts() {
    let transport = Arc::new(ScriptedTransport::default());
    let client = client_with(&transport, None);

    let start = Instant::now();
    let outcome = client.connect(options()).await;
    let elapsed = start.elapsed();

    let ConnectOutcome::Exhausted(info) = outcome else {
        panic!("expected exhaustion, got {outcome:?}");
    };
    assert!(info.retries_exhausted);
    assert_eq!(info.cause, DisconnectCause::ConnectionRefused);
    assert_eq!(transport.attempts(), 3);

    // Two pauses of 2s handshake + 0.5s margin + [1s, 5s] jitter
    assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
    assert!(elapsed <= Duration::from_secs(15), "{elapsed:?}");

    let status = client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.retrying);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn next_after_exhaustion_is_immediate_disconnected() {
    let transport = Arc::new(ScriptedTransport::default());
    let client = client_with(&transport, None);
    client.connect(options()).await;

    let start = Instant::now();
    let record = client.next(Some(Duration::from_secs(1))).await;

    assert!(start.elapsed() < Duration::from_millis(1));
    match record {
        DeliveryRecord::Disconnected(info) => {
            assert!(info.retries_exhausted);
            assert!(info.to_string().contains("retries exhausted"));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_is_a_disconnect_cause() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push(Step::Hang);
    let client = client_with(&transport, None);

    let outcome = client
        .connect(ConnectOptions {
            max_retries: 1,
            ..options()
        })
        .await;

    assert!(matches!(
        outcome,
        ConnectOutcome::Exhausted(info) if info.cause == DisconnectCause::Timeout
    ));
}

#[tokio::test(start_paused = true)]
async fn http_rejections_are_retried() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push(Step::Fail(TransportError::new(
        DisconnectCause::HttpClientError(401),
        "unauthorized",
    )));
    let _server = transport.open_link();
    let client = client_with(&transport, None);

    assert_eq!(client.connect(options()).await, ConnectOutcome::Connected);
    assert_eq!(transport.attempts(), 2);
    assert_eq!(
        client.last_disconnect().cause,
        DisconnectCause::HttpClientError(401)
    );
}

#[tokio::test(start_paused = true)]
async fn first_attempt_resumes_only_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("checkpoint.json");
    FileCheckpointStore::open(&path)
        .unwrap()
        .write(SequenceId::new(5, 0), Duration::ZERO)
        .unwrap();

    let transport = Arc::new(ScriptedTransport::default());
    transport.push(Step::Fail(TransportError::new(DisconnectCause::Abnormal, "reset")));
    let _server = transport.open_link();
    let client = client_with(&transport, Some(&path));
    assert_eq!(client.last_id(), Some(SequenceId::new(5, 0)));

    client.connect(options()).await;

    assert_eq!(transport.request(0).resume_from, None);
    assert_eq!(transport.request(1).resume_from, Some(SequenceId::new(5, 0)));
    assert_eq!(transport.request(1).attempt, 2);

    client.close().await;
    let _server = transport.open_link();
    client
        .connect(options().with_resume_from(Some(SequenceId::new(3, 1))))
        .await;
    assert_eq!(transport.request(2).resume_from, Some(SequenceId::new(3, 1)));
}

#[tokio::test(start_paused = true)]
async fn reconnect_resumes_from_watermark() {
    let transport = Arc::new(ScriptedTransport::default());
    let server = transport.open_link();
    let _second = transport.open_link();
    let client = client_with(&transport, None);
    client.connect(options()).await;

    server.send_event("10-0");
    server.send_event("11-2");
    assert_eq!(event_id(&client.next(None).await), SequenceId::new(10, 0));
    assert_eq!(event_id(&client.next(None).await), SequenceId::new(11, 2));

    server.close(1001);
    while transport.attempts() < 2 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(transport.request(1).resume_from, Some(SequenceId::new(11, 2)));
    assert_eq!(client.last_disconnect().cause, DisconnectCause::GoingAway);
}

// =============================================================================
// Subscription replay
// =============================================================================

#[tokio::test(start_paused = true)]
async fn subscription_is_replayed_before_new_events() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut first = transport.open_link();
    let mut second = transport.open_link();
    let client = client_with(&transport, None);
    client.connect(options()).await;

    client
        .subscribe(&[Filter::new().area("DE").event_type("UPDATE")], None, false)
        .unwrap();
    let stored = client.latest_filters().unwrap();
    assert_eq!(first.recv().await.unwrap(), stored);

    first.send_event("1-0");
    assert_eq!(event_id(&client.next(None).await), SequenceId::new(1, 0));

    first.close(1006);
    let replayed = second.recv().await.unwrap();
    assert_eq!(replayed, stored);

    second.send_event("2-0");
    assert_eq!(event_id(&client.next(None).await), SequenceId::new(2, 0));
}

#[tokio::test(start_paused = true)]
async fn subscribe_while_disconnected_fails_but_is_replayed() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut server = transport.open_link();
    let client = client_with(&transport, None);

    let result = client.subscribe(
        &[Filter::new().name("FR Price").event_type("DELETE")],
        Some("r1".to_string()),
        false,
    );
    assert!(matches!(result, Err(StreamError::NotConnected)));

    client.connect(options()).await;
    let replayed = server.recv().await.unwrap();
    assert_eq!(Some(replayed.clone()), client.latest_filters());
    assert!(replayed.contains(r#""names":["FR Price"]"#));
    assert!(replayed.contains(r#""id":"r1""#));
}

#[tokio::test]
async fn invalid_filters_report_every_violation() {
    let transport = Arc::new(ScriptedTransport::default());
    let client = client_with(&transport, None);

    let result = client.subscribe(
        &[
            Filter::new().event_type("EXPLODE").begin("yesterday"),
            Filter::new(),
        ],
        None,
        false,
    );

    let Err(StreamError::InvalidFilters(e)) = result else {
        panic!("expected InvalidFilters, got {result:?}");
    };
    assert!(e.violations.len() >= 3, "{e}");
    assert!(e.violations.iter().any(|v| v.index == 0));
    assert!(e.violations.iter().any(|v| v.index == 1));
    assert_eq!(client.latest_filters(), None);
}

#[tokio::test(start_paused = true)]
async fn active_filters_round_trip() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut server = transport.open_link();
    let client = client_with(&transport, None);
    client.connect(options()).await;

    client.request_active_filters(Some("q1".to_string())).unwrap();
    assert_eq!(
        server.recv().await.unwrap(),
        r#"{"type":"filter.get","id":"q1"}"#
    );

    server.send_text(r#"{"type":"filters","id":"q1","filters":[{"event_types":["UPDATE"],"areas":["DE"]}]}"#);
    match client.next(None).await {
        DeliveryRecord::Filters(reply) => {
            assert_eq!(reply.request_id.as_deref(), Some("q1"));
            assert_eq!(reply.filters.len(), 1);
        }
        other => panic!("expected Filters, got {other:?}"),
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn records_arrive_in_receipt_order() {
    let transport = Arc::new(ScriptedTransport::default());
    let server = transport.open_link();
    let client = client_with(&transport, None);
    client.connect(options()).await;

    for i in 0..20 {
        server.send_event(&format!("{i}-0"));
    }
    server.send_text(r#"{"type":"message","message":"halfway"}"#);
    server.send_text("{not json");
    server.send_event("20-0");

    for i in 0..20 {
        assert_eq!(event_id(&client.next(None).await), SequenceId::new(i, 0));
    }
    assert_eq!(client.next(None).await.kind(), MessageKind::Info);
    match client.next(None).await {
        DeliveryRecord::Error(notice) => {
            assert_eq!(notice.origin, NoticeOrigin::Decode);
            assert_eq!(notice.raw, "{not json");
        }
        other => panic!("expected decode error, got {other:?}"),
    }
    assert_eq!(event_id(&client.next(None).await), SequenceId::new(20, 0));
    assert_eq!(client.last_id(), Some(SequenceId::new(20, 0)));
}

#[tokio::test(start_paused = true)]
async fn idle_connection_yields_timeout() {
    let transport = Arc::new(ScriptedTransport::default());
    let _server = transport.open_link();
    let client = client_with(&transport, None);
    client.connect(options()).await;

    let start = Instant::now();
    let record = client.next(Some(Duration::from_millis(500))).await;

    assert_eq!(record, DeliveryRecord::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn stream_interface_matches_next() {
    let transport = Arc::new(ScriptedTransport::default());
    let server = transport.open_link();
    let client = client_with(&transport, None);
    client.connect(options()).await;

    server.send_event("1-0");
    let records: Vec<_> = client
        .stream(Some(Duration::from_millis(100)))
        .take(2)
        .collect()
        .await;

    assert_eq!(event_id(&records[0]), SequenceId::new(1, 0));
    assert_eq!(records[1], DeliveryRecord::Timeout);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_flushes_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");

    let transport = Arc::new(ScriptedTransport::default());
    let mut server = transport.open_link();
    let client = client_with(&transport, Some(&path));
    client.connect(options()).await;
    assert_eq!(client.state(), ConnectionState::Connected);

    server.send_event("7-0");
    server.send_event("8-3");
    client.next(None).await;
    client.next(None).await;

    client.close().await;
    client.close().await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    let info = client.last_disconnect();
    assert_eq!(info.cause, DisconnectCause::Normal);
    assert!(!info.retries_exhausted);
    assert_eq!(server.recv().await, None);

    assert_eq!(
        FileCheckpointStore::open(&path).unwrap().read(),
        Some(SequenceId::new(8, 3))
    );
    assert_eq!(client.next(None).await.kind(), MessageKind::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_interrupts_retry_sleep() {
    let transport = Arc::new(ScriptedTransport::default());
    let client = Arc::new(client_with(&transport, None));

    let connecting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .connect(ConnectOptions {
                    max_retries: 0,
                    ..options()
                })
                .await
        })
    };

    while transport.attempts() < 2 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    client.close().await;

    assert_eq!(connecting.await.unwrap(), ConnectOutcome::Cancelled);
    let attempts = transport.attempts();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.attempts(), attempts);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
