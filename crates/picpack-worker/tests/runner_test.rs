//! Poll-loop integration tests: fake queue in, webhook out.

mod common;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use common::{test_processor_config, FakeFetcher, FakeStorage};
use picpack_services::NotificationDispatcher;
use picpack_worker::{IdleShutdown, JobProcessor, JobSource, ReceivedMessage, Runner};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct FakeJobSource {
    queue: Mutex<VecDeque<ReceivedMessage>>,
    acknowledged: Mutex<Vec<String>>,
}

impl FakeJobSource {
    fn with_messages(bodies: &[&str]) -> Self {
        let queue = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| ReceivedMessage {
                body: body.to_string(),
                receipt_handle: format!("receipt-{}", i),
            })
            .collect();
        Self {
            queue: Mutex::new(queue),
            acknowledged: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JobSource for FakeJobSource {
    async fn receive(&self) -> anyhow::Result<Option<ReceivedMessage>> {
        let next = self.queue.lock().unwrap().pop_front();
        if next.is_none() {
            // Stand in for an empty long poll without spinning the loop hot.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(next)
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> anyhow::Result<()> {
        self.acknowledged
            .lock()
            .unwrap()
            .push(message.receipt_handle.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Hooked {
    bodies: Arc<Mutex<Vec<String>>>,
}

async fn spawn_webhook() -> (SocketAddr, Hooked) {
    let hooked = Hooked::default();
    let app = Router::new()
        .route(
            "/hook",
            post(|State(state): State<Hooked>, body: String| async move {
                state.bodies.lock().unwrap().push(body);
                StatusCode::OK
            }),
        )
        .with_state(hooked.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hooked)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test]
async fn message_is_processed_notified_and_acknowledged() {
    let (addr, hooked) = spawn_webhook().await;

    let body = r#"{
        "eventId": "evt-run",
        "email": "guest@example.com",
        "photos": [{"fileName": "a.jpg", "url": "https://cdn/a.jpg"}],
        "requestId": "req-run"
    }"#;
    let source = Arc::new(FakeJobSource::with_messages(&[body]));
    let fetcher = Arc::new(FakeFetcher::new().with_file("https://cdn/a.jpg", b"photo a"));
    let storage = Arc::new(FakeStorage::new());
    let processor = JobProcessor::new(fetcher, storage.clone(), test_processor_config());
    let notifier = NotificationDispatcher::new(
        vec![format!("http://{}/hook", addr)],
        Duration::from_secs(5),
    )
    .unwrap();
    let supervisor = IdleShutdown::new(Duration::from_secs(600));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let runner = Runner::new(
        source.clone(),
        processor,
        notifier,
        supervisor.clone(),
        picpack_core::RetryPolicy::unbounded(Duration::from_millis(50)),
    );
    let run_handle = tokio::spawn(runner.run(shutdown_rx));

    wait_until(|| !hooked.bodies.lock().unwrap().is_empty()).await;
    wait_until(|| !source.acknowledged.lock().unwrap().is_empty()).await;

    shutdown_tx.send(()).await.unwrap();
    run_handle.await.unwrap();

    let bodies = hooked.bodies.lock().unwrap();
    let payload: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(payload["eventId"], "evt-run");
    assert_eq!(payload["fileCount"], 1);
    assert_eq!(payload["requestId"], "req-run");

    assert_eq!(
        source.acknowledged.lock().unwrap().as_slice(),
        &["receipt-0".to_string()]
    );
    assert!(!supervisor.is_busy());
    assert_eq!(supervisor.snapshot().jobs_processed, 1);
}

#[tokio::test]
async fn failed_job_still_notifies_and_acknowledges() {
    let (addr, hooked) = spawn_webhook().await;

    // No items: the job fails immediately, yet the message must not be
    // left for indefinite redelivery.
    let body = r#"{"eventId": "evt-empty", "email": "guest@example.com", "photos": []}"#;
    let source = Arc::new(FakeJobSource::with_messages(&[body]));
    let fetcher = Arc::new(FakeFetcher::new());
    let storage = Arc::new(FakeStorage::new());
    let processor = JobProcessor::new(fetcher, storage, test_processor_config());
    let notifier = NotificationDispatcher::new(
        vec![format!("http://{}/hook", addr)],
        Duration::from_secs(5),
    )
    .unwrap();
    let supervisor = IdleShutdown::new(Duration::from_secs(600));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let runner = Runner::new(
        source.clone(),
        processor,
        notifier,
        supervisor.clone(),
        picpack_core::RetryPolicy::unbounded(Duration::from_millis(50)),
    );
    let run_handle = tokio::spawn(runner.run(shutdown_rx));

    wait_until(|| !source.acknowledged.lock().unwrap().is_empty()).await;
    shutdown_tx.send(()).await.unwrap();
    run_handle.await.unwrap();

    let bodies = hooked.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(payload["isError"], true);
    assert_eq!(payload["eventId"], "evt-empty");
}

#[tokio::test]
async fn malformed_message_is_dropped_without_notification() {
    let (addr, hooked) = spawn_webhook().await;

    let source = Arc::new(FakeJobSource::with_messages(&["this is not json"]));
    let fetcher = Arc::new(FakeFetcher::new());
    let storage = Arc::new(FakeStorage::new());
    let processor = JobProcessor::new(fetcher, storage, test_processor_config());
    let notifier = NotificationDispatcher::new(
        vec![format!("http://{}/hook", addr)],
        Duration::from_secs(5),
    )
    .unwrap();
    let supervisor = IdleShutdown::new(Duration::from_secs(600));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let runner = Runner::new(
        source.clone(),
        processor,
        notifier,
        supervisor.clone(),
        picpack_core::RetryPolicy::unbounded(Duration::from_millis(50)),
    );
    let run_handle = tokio::spawn(runner.run(shutdown_rx));

    wait_until(|| !source.acknowledged.lock().unwrap().is_empty()).await;
    shutdown_tx.send(()).await.unwrap();
    run_handle.await.unwrap();

    assert!(hooked.bodies.lock().unwrap().is_empty());
    assert_eq!(supervisor.snapshot().jobs_processed, 0);
    assert!(!supervisor.is_busy());
}
