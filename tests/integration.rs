//! End-to-end HTTP surface tests, driven in-process via `tower::ServiceExt::oneshot`
//! (spec §10.4), mirroring the root-level `tests/` the teacher uses for its
//! own server crate.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use icvsb_client::{LogMirror, Registry, RequestClient};
use icvsb_core::types::Service;
use icvsb_provider::scripted::ScriptedProvider;
use icvsb_provider::LabelProvider;
use icvsb_server::AppState;
use icvsb_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

/// Backs the store with a real temp-file sqlite database rather than
/// `sqlite::memory:` (spec §10.4): an in-memory database is private per
/// connection, and the store's pool hands out more than one.
async fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}/icvsb-test.db", dir.path().display());

    let store = Store::open(&url).await.expect("open store");

    let mut providers: HashMap<Service, Arc<dyn LabelProvider>> = HashMap::new();
    for service in Service::ALL {
        providers.insert(service, Arc::new(ScriptedProvider::new()));
    }
    let client = Arc::new(RequestClient::new(store, providers));
    let registry = Arc::new(Registry::new());
    let log_mirror = LogMirror::new();

    (dir, AppState::new(registry, client, log_mirror, 64))
}

#[tokio::test]
async fn health_and_ready_report_ok() {
    let (_dir, state) = test_state().await;
    let app = icvsb_server::build_router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

/// Spec §8 scenario 1 ("first-benchmark isolation"): a BRC created with
/// `autobenchmark: false` has no current key and is not mid-benchmark until
/// the caller drives `benchmark()` explicitly.
#[tokio::test]
async fn first_benchmark_isolation() {
    let (_dir, state) = test_state().await;
    let app = icvsb_server::build_router(state);

    let body = serde_json::json!({
        "service": "google",
        "dataset": ["https://example.com/u1.jpg", "https://example.com/u2.jpg"],
        "autobenchmark": false,
    });

    let create_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/benchmark")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_resp.status(), StatusCode::CREATED);

    let bytes = axum::body::to_bytes(create_resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let id = created["id"].as_i64().expect("id field");

    let get_resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/benchmark/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(get_resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let view: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(view["current_key_id"].is_null());
    assert_eq!(view["is_benchmarking"], serde_json::json!(false));
    assert_eq!(view["benchmark_count"], serde_json::json!(0));
}

/// `POST /benchmark` with an empty dataset is a validation error, not a
/// panic or a 500 (spec §7: validation failures are 400).
#[tokio::test]
async fn create_benchmark_rejects_empty_dataset() {
    let (_dir, state) = test_state().await;
    let app = icvsb_server::build_router(state);

    let body = serde_json::json!({
        "service": "google",
        "dataset": [],
    });

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/benchmark")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

/// Unknown `:id` at `/benchmark/:id` is a 400, not a panic (spec §6.2).
#[tokio::test]
async fn get_unknown_benchmark_is_bad_request() {
    let (_dir, state) = test_state().await;
    let app = icvsb_server::build_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/benchmark/999999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
