//! HTTP surface integration tests
//!
//! Router driven with `tower::ServiceExt::oneshot`; the database is a
//! temporary SQLite file and the coordinator runs on scripted adapters.

mod helpers;

use abr_common::events::{EventBus, ResolverEvent};
use abr_meta::extractors::ProviderPayload;
use abr_meta::types::{SourceError, SourceResult};
use abr_meta::workflow::{MetadataCoordinator, QueueWorker, ResolutionQueue};
use abr_meta::{build_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppState,
    /// Present when the worker was deliberately not started
    _idle_worker: Option<QueueWorker>,
    _dir: TempDir,
}

async fn test_app(coordinator: MetadataCoordinator, capacity: usize, run_worker: bool) -> TestApp {
    let dir = TempDir::new().unwrap();
    let db = abr_meta::db::init_database_pool(&dir.path().join("abr.db"))
        .await
        .unwrap();

    let coordinator = Arc::new(coordinator);
    let (queue, worker) = ResolutionQueue::new(Arc::clone(&coordinator), capacity);
    let idle_worker = if run_worker {
        tokio::spawn(worker.run());
        None
    } else {
        Some(worker)
    };

    let state = AppState::new(db, EventBus::new(100), queue, coordinator);
    TestApp {
        router: build_router(state.clone()),
        state,
        _idle_worker: idle_worker,
        _dir: dir,
    }
}

fn unavailable() -> SourceError {
    SourceError::Unavailable("connection refused".to_string())
}

/// Every source fails except the fallback search
fn fallback_coordinator() -> MetadataCoordinator {
    coordinator(
        Some(Arc::new(StubScraper::new(Err(unavailable())))),
        Arc::new(StubLookup::new(Err(unavailable()))),
        Arc::new(StubSearch::new(Ok(audible_payload(
            "The Wolf's Advance",
            "Shane Purdy",
        )))),
        short_timeouts(),
    )
}

fn lookup_coordinator(result: SourceResult<ProviderPayload>) -> MetadataCoordinator {
    coordinator(
        None,
        Arc::new(StubLookup::new(result)),
        Arc::new(StubSearch::new(Err(unavailable()))),
        short_timeouts(),
    )
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn next_event(rx: &mut broadcast::Receiver<ResolverEvent>) -> ResolverEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event not received in time")
        .unwrap()
}

#[tokio::test]
async fn webhook_is_accepted_resolved_and_persisted() {
    // Given: a running worker and an SSE-style subscriber
    let app = test_app(fallback_coordinator(), 10, true).await;
    let mut events = app.state.event_bus.subscribe();

    // When: the indexer posts a release
    let payload = json!({ "name": WOLF_RELEASE, "url": MAM_URL }).to_string();
    let response = app
        .router
        .clone()
        .oneshot(post_json("/webhook", &payload))
        .await
        .unwrap();

    // Then: 202 with a request id, then queued and resolved events
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "queued");
    let request_id = accepted["request_id"].as_str().unwrap().to_string();

    match next_event(&mut events).await {
        ResolverEvent::RequestQueued { request_id: id, name, .. } => {
            assert_eq!(id.to_string(), request_id);
            assert_eq!(name.as_deref(), Some(WOLF_RELEASE));
        }
        other => panic!("expected RequestQueued, got {:?}", other),
    }

    match next_event(&mut events).await {
        ResolverEvent::RequestResolved {
            request_id: id,
            path,
            notification,
            ..
        } => {
            assert_eq!(id.to_string(), request_id);
            assert_eq!(path, "fallback_after_scrape");
            assert_eq!(notification.headline, "The Wolf's Advance by Shane Purdy");
            assert_eq!(notification.confidence, "medium");
            assert_eq!(notification.source_url.as_deref(), Some(MAM_URL));
        }
        other => panic!("expected RequestResolved, got {:?}", other),
    }

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/requests/{}", request_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["status"], "resolved");
    assert_eq!(record["source_url"], MAM_URL);
    assert_eq!(record["metadata"]["title"], "The Wolf's Advance");
    assert_eq!(record["metadata"]["provenance"]["path"], "fallback_after_scrape");

    let response = app.router.clone().oneshot(get("/requests")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_resolution_is_persisted_and_broadcast() {
    let coordinator = coordinator(
        Some(Arc::new(StubScraper::new(Ok(asin("B0CHYQ2RZ5"))))),
        Arc::new(StubLookup::new(Err(SourceError::Misconfigured(
            "region missing".into(),
        )))),
        Arc::new(StubSearch::new(Err(unavailable()))),
        short_timeouts(),
    );
    let app = test_app(coordinator, 10, true).await;
    let mut events = app.state.event_bus.subscribe();

    let payload = json!({ "name": WOLF_RELEASE, "url": MAM_URL }).to_string();
    let response = app
        .router
        .clone()
        .oneshot(post_json("/webhook", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let request_id = body_json(response).await["request_id"]
        .as_str()
        .unwrap()
        .to_string();

    next_event(&mut events).await;
    match next_event(&mut events).await {
        ResolverEvent::RequestFailed { message, .. } => {
            assert!(message.contains("configuration error"), "{}", message);
        }
        other => panic!("expected RequestFailed, got {:?}", other),
    }

    let record = body_json(
        app.router
            .clone()
            .oneshot(get(&format!("/requests/{}", request_id)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(record["status"], "failed");
    assert!(record["metadata"].is_null());

    let health = body_json(app.router.clone().oneshot(get("/health")).await.unwrap()).await;
    assert!(health["last_error"].as_str().unwrap().contains(&request_id));
}

#[tokio::test]
async fn non_object_webhook_body_is_rejected() {
    let app = test_app(fallback_coordinator(), 10, true).await;

    let response = app
        .router
        .clone()
        .oneshot(post_json("/webhook", r#"["not", "an", "object"]"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let response = app
        .router
        .clone()
        .oneshot(post_json("/webhook", "{oops"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.state.queue.stats().enqueued, 0);
}

#[tokio::test]
async fn full_queue_answers_503() {
    // Worker never runs, so the single slot stays taken
    let app = test_app(fallback_coordinator(), 1, false).await;
    let payload = json!({ "name": WOLF_RELEASE }).to_string();

    let first = app
        .router
        .clone()
        .oneshot(post_json("/webhook", &payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .router
        .clone()
        .oneshot(post_json("/webhook", &payload))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(second).await["error"]["code"], "SERVICE_UNAVAILABLE");

    let health = body_json(app.router.clone().oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["queue"]["depth"], 1);
}

#[tokio::test]
async fn lookup_resolves_asin_through_primary() {
    let app = test_app(
        lookup_coordinator(Ok(audnex_payload("Project Hail Mary", "Andy Weir"))),
        10,
        true,
    )
    .await;

    let response = app
        .router
        .clone()
        .oneshot(post_json("/lookup", r#"{"asin": "b08g9prs1k"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["title"], "Project Hail Mary");
    assert_eq!(record["author"], "Andy Weir");
    assert_eq!(record["source_identifier"], "B08G9PRS1K");
    assert_eq!(record["provenance"]["path"], "primary");
}

#[tokio::test]
async fn lookup_rejects_invalid_asin() {
    let app = test_app(lookup_coordinator(Err(unavailable())), 10, true).await;

    let response = app
        .router
        .clone()
        .oneshot(post_json("/lookup", r#"{"asin": "not-an-asin"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(post_json("/lookup", r#"{"title": "missing asin"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lookup_maps_source_failures() {
    let app = test_app(
        lookup_coordinator(Err(SourceError::NotFound("404".into()))),
        10,
        true,
    )
    .await;
    let response = app
        .router
        .clone()
        .oneshot(post_json("/lookup", r#"{"asin": "B000000000"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = test_app(lookup_coordinator(Err(unavailable())), 10, true).await;
    let response = app
        .router
        .clone()
        .oneshot(post_json("/lookup", r#"{"asin": "B000000000"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn health_reports_module_and_queue() {
    let app = test_app(fallback_coordinator(), 8, true).await;

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["module"], "abr-meta");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["queue"]["capacity"], 8);
    assert_eq!(health["queue"]["max_in_flight"], 0);
    assert!(health.get("last_error").is_none());
}

#[tokio::test]
async fn request_lookup_validates_id() {
    let app = test_app(fallback_coordinator(), 10, true).await;

    let response = app
        .router
        .clone()
        .oneshot(get("/requests/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/requests/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.router.clone().oneshot(get("/requests?limit=0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}
