//! Notification dispatcher tests against local webhook endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use picpack_core::models::{ArchiveEntryResult, JobOutcome, JobStatus};
use picpack_services::NotificationDispatcher;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Received {
    bodies: Arc<Mutex<Vec<String>>>,
}

async fn spawn_webhook() -> (SocketAddr, Received) {
    let received = Received::default();
    let app = Router::new()
        .route(
            "/hook",
            post(|State(state): State<Received>, body: String| async move {
                state.bodies.lock().unwrap().push(body);
                StatusCode::OK
            }),
        )
        .route(
            "/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "nope") }),
        )
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received)
}

fn completed_outcome() -> JobOutcome {
    JobOutcome {
        status: JobStatus::Completed,
        event_id: "evt-9".into(),
        recipient_email: "guest@example.com".into(),
        request_id: "req-9".into(),
        download_url: Some("https://cdn.example.com/bundle.zip".into()),
        succeeded_count: 2,
        failed_items: vec![ArchiveEntryResult::Failed {
            file_name: "skip.jpg".into(),
            reason: "404".into(),
        }],
        archive_bytes: 1024 * 1024,
        processing_time_seconds: 2.5,
        error: None,
    }
}

#[tokio::test]
async fn first_working_endpoint_receives_payload() {
    let (addr, received) = spawn_webhook().await;
    let dispatcher = NotificationDispatcher::new(
        vec![
            format!("http://{}/broken", addr),
            format!("http://{}/hook", addr),
        ],
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(dispatcher.notify(&completed_outcome()).await);

    let bodies = received.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(value["eventId"], "evt-9");
    assert_eq!(value["fileCount"], 2);
    assert_eq!(value["skippedFiles"][0], "skip.jpg");
}

#[tokio::test]
async fn delivery_stops_at_first_success() {
    let (addr, received) = spawn_webhook().await;
    let dispatcher = NotificationDispatcher::new(
        vec![
            format!("http://{}/hook", addr),
            format!("http://{}/hook", addr),
        ],
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(dispatcher.notify(&completed_outcome()).await);
    assert_eq!(received.bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn all_endpoints_failing_returns_false() {
    let (addr, _received) = spawn_webhook().await;
    let dispatcher = NotificationDispatcher::new(
        vec![
            format!("http://{}/broken", addr),
            format!("http://{}/broken", addr),
        ],
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(!dispatcher.notify(&completed_outcome()).await);
}

#[tokio::test]
async fn failure_outcome_posts_error_payload() {
    let (addr, received) = spawn_webhook().await;
    let dispatcher =
        NotificationDispatcher::new(vec![format!("http://{}/hook", addr)], Duration::from_secs(5))
            .unwrap();

    let outcome = JobOutcome {
        status: JobStatus::Failed,
        event_id: "evt-10".into(),
        recipient_email: "guest@example.com".into(),
        request_id: "req-10".into(),
        download_url: None,
        succeeded_count: 0,
        failed_items: Vec::new(),
        archive_bytes: 0,
        processing_time_seconds: 0.4,
        error: Some("no items could be fetched".into()),
    };
    assert!(dispatcher.notify(&outcome).await);

    let bodies = received.bodies.lock().unwrap();
    let value: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(value["isError"], true);
    assert_eq!(value["error"], "no items could be fetched");
}
