//! End-to-end scenarios against the full router, exercised with
//! `tower::ServiceExt::oneshot` (no real network bind).

use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use code_graph_rag_server::config::Settings;
use code_graph_rag_server::gateway::router::{create_router, AppState, INFLIGHT_PERMITS};
use code_graph_rag_server::graph::GraphHandle;
use code_graph_rag_server::health::HealthProbe;
use code_graph_rag_server::lifecycle::{Lifecycle, LifecycleState};
use code_graph_rag_server::registry::tools::register_default_tools;
use code_graph_rag_server::registry::RegistryBuilder;

async fn build_state() -> Arc<AppState> {
    let settings = Settings::default();
    let mut builder = RegistryBuilder::new();
    register_default_tools(&mut builder).unwrap();
    let graph = Arc::new(
        GraphHandle::connect(settings.dependencies.get("memgraph").unwrap(), "neo4j", "")
            .await
            .unwrap(),
    );
    let probe = HealthProbe::start(&settings, Arc::clone(&graph));
    let lifecycle = Lifecycle::default();
    lifecycle.set(LifecycleState::Healthy);
    Arc::new(AppState {
        registry: Arc::new(builder.build()),
        health_cache: probe.cache(),
        lifecycle,
        graph,
        inflight: Arc::new(Semaphore::new(INFLIGHT_PERMITS)),
        bind_time: Instant::now(),
        inflight_count: AtomicI64::new(0),
        settings: Arc::new(settings),
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn scenario_discovery_lists_tools_alphabetically() {
    let router = create_router(build_state().await);
    let response = router.oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "code-graph-rag");
    let names: Vec<&str> = body["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn scenario_unknown_tool_is_tool_not_found() {
    let router = create_router(build_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call-tool")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"tool":"does_not_exist","arguments":{}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "TOOL_NOT_FOUND");
    assert!(body["error"].as_str().unwrap().contains("does_not_exist"));
}

#[tokio::test]
async fn scenario_invalid_arguments_cites_missing_field() {
    let router = create_router(build_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/call-tool")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"tool":"query_callers","arguments":{"max_depth":999}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_ARGUMENTS");
}

#[tokio::test]
async fn response_always_carries_x_request_id_header() {
    let router = create_router(build_state().await);
    let response = router.oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap()).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn discovery_is_byte_stable_across_calls() {
    let state = build_state().await;
    let router_a = create_router(Arc::clone(&state));
    let router_b = create_router(state);

    let first = router_a.oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap()).await.unwrap();
    let first_bytes = to_bytes(first.into_body(), usize::MAX).await.unwrap();
    let second = router_b.oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap()).await.unwrap();
    let second_bytes = to_bytes(second.into_body(), usize::MAX).await.unwrap();

    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn health_reports_unknown_status_before_first_probe_cycle() {
    let router = create_router(build_state().await);
    let response = router.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["dependencies"]["memgraph"]["status"], "unknown");
    assert_eq!(body["status"], "degraded");
}
