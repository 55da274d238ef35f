// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /tasks (accepted, unknown agent, payload mismatch, scrape url check)
// - GET /tasks/{id} (known + unknown)
// - POST /newsletter/trigger (409 on a second trigger for the same period)
// - GET /sources, GET /trends

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use serde_json::Value as Json;
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use aec_news_pipeline::config::SourceConfig;
use aec_news_pipeline::delivery::Outbox;
use aec_news_pipeline::scout::fetch::StaticFetcher;
use aec_news_pipeline::sources::CredibilityTable;
use aec_news_pipeline::store::MemoryStore;
use aec_news_pipeline::{create_router, Pipeline, PipelineConfig};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Build the same Router the binary uses, minus the metrics exporter.
fn test_router() -> Router {
    let cfg = PipelineConfig {
        sources: vec![SourceConfig {
            source_id: "aecmag".into(),
            url: "https://aecmag.test/feed".into(),
            category_hint: None,
            credibility_weight: Some(0.8),
            min_request_interval_ms: None,
        }],
        ..Default::default()
    };
    let pipeline = Pipeline::build(
        &cfg,
        &CredibilityTable::default_seed(),
        Arc::new(StaticFetcher::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(Outbox::new()),
    );
    create_router(pipeline.orchestrator, None)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, v)
}

#[tokio::test]
async fn health_reports_every_component() {
    let app = test_router();
    let (status, v) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK, "health should be 200");
    for key in ["orchestrator", "scout", "curator", "writer"] {
        assert_eq!(v[key], "healthy", "{key} should start healthy");
    }
    assert_eq!(v["queued"], 0);
}

#[tokio::test]
async fn submitted_task_can_be_looked_up() {
    let app = test_router();
    let payload = json!({
        "agent_type": "curator",
        "priority": 1,
        "payload": { "type": "curate", "item_ids": ["abc"] }
    });
    let (status, v) = send(&app, "POST", "/tasks", Some(payload)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = v["task_id"].as_str().expect("task_id").to_string();

    let (status, t) = send(&app, "GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t["status"], "queued");
    assert_eq!(t["agent_type"], "curator");
    assert_eq!(t["priority"], 1);
    assert_eq!(t["attempt_count"], 0);
}

#[tokio::test]
async fn malformed_tasks_are_bad_requests() {
    let app = test_router();

    let unknown = json!({ "agent_type": "editor", "payload": { "type": "curate", "item_ids": ["a"] } });
    let (status, v) = send(&app, "POST", "/tasks", Some(unknown)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "validation");

    let mismatch = json!({ "agent_type": "scout", "payload": { "type": "compose", "period_key": "2024-W03" } });
    let (status, _) = send(&app, "POST", "/tasks", Some(mismatch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = json!({ "agent_type": "curator" });
    let (status, _) = send(&app, "POST", "/tasks", Some(missing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_url = json!({ "agent_type": "scout", "payload": { "type": "scrape", "url": "news.test/a" } });
    let (status, v) = send(&app, "POST", "/tasks", Some(bad_url)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "validation");

    let scrape = json!({ "agent_type": "scout", "payload": { "type": "scrape", "url": "https://news.test/a" } });
    let (status, _) = send(&app, "POST", "/tasks", Some(scrape)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let app = test_router();
    let (status, v) = send(&app, "GET", "/tasks/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "unknown_task");
}

#[tokio::test]
async fn second_newsletter_trigger_conflicts() {
    let app = test_router();
    let body = json!({ "period_key": "2024-W03" });
    let (status, _) = send(&app, "POST", "/newsletter/trigger", Some(body.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, v) = send(&app, "POST", "/newsletter/trigger", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["error"], "already_running");
}

#[tokio::test]
async fn discovery_trigger_is_accepted() {
    let app = test_router();
    let (status, v) = send(&app, "POST", "/discovery/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(v["task_id"].is_string());
}

#[tokio::test]
async fn sources_and_trends_are_listed() {
    let app = test_router();
    let (status, v) = send(&app, "GET", "/sources", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = v.as_array().expect("array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["source_id"], "aecmag");
    assert_eq!(list[0]["health"], "healthy");

    let (status, v) = send(&app, "GET", "/trends?days=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(v.is_object());
}
