//! HTTP Dispatcher: exactly three endpoints, wired through the common
//! correlation-id/logging/CORS/panic-safety middleware stack.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Extension, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Settings;
use crate::envelope::{is_valid_request_id, map_exception, new_request_id, Envelope, ErrorCode};
use crate::error::Error;
use crate::graph::GraphHandle;
use crate::health::HealthCache;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::registry::{Registry, ToolContext, ToolSchema};

use super::middleware::{correlation_id_middleware, cors_layer, RequestId};

/// A large but finite permit pool; acquiring one permit per in-flight
/// `/call-tool` request turns "wait for drain" into "wait for all permits".
pub const INFLIGHT_PERMITS: usize = 10_000;

/// Shared application state threaded through every handler.
pub struct AppState {
    /// Validated settings, immutable after startup.
    pub settings: Arc<Settings>,
    /// The immutable tool catalog.
    pub registry: Arc<Registry>,
    /// Lifecycle state machine.
    pub lifecycle: Lifecycle,
    /// Dependency status cache, written by the health probe.
    pub health_cache: HealthCache,
    /// Graph-store dependency handle passed opaquely to handlers.
    pub graph: Arc<GraphHandle>,
    /// In-flight concurrency accounting / drain coordination.
    pub inflight: Arc<Semaphore>,
    /// When the listener was bound; origin for `uptime_seconds`.
    pub bind_time: Instant,
    /// Monotonic count of requests currently being handled (diagnostic only).
    pub inflight_count: AtomicI64,
}

/// Build the three-endpoint router with its middleware stack.
///
/// `CatchPanicLayer` is added last, making it the outermost layer: a panic
/// inside a handler, or inside any inner layer, is caught before
/// `correlation_id_middleware`, `TraceLayer`, or CORS ever see the request
/// unwind, and turned into a well-formed envelope instead of tower-http's
/// default plain-text 500.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.security.cors);

    Router::new()
        .route("/tools", get(tools_handler))
        .route("/call-tool", post(call_tool_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(correlation_id_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Turn a caught panic into an `INTERNAL_ERROR` envelope.
///
/// Being outermost, this responder sits above `correlation_id_middleware`
/// and has no access to the request's extensions, so it cannot reuse the
/// correlation id that middleware would have echoed on a non-panicking
/// response; it mints a fresh one instead.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "handler panicked".to_string());
    error!(panic = %detail, "panic caught at the HTTP boundary");
    let (envelope, status) = Envelope::failure(ErrorCode::InternalError, "an internal error occurred", new_request_id());
    (status, Json(envelope)).into_response()
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    service: String,
    version: String,
    tools: Vec<ToolSchema>,
}

async fn tools_handler(State(state): State<Arc<AppState>>, Extension(request_id): Extension<RequestId>) -> Response {
    if state.lifecycle.get() == LifecycleState::Initializing {
        let (envelope, status) = Envelope::failure(
            ErrorCode::ServiceUnavailable,
            "server has not finished startup initialization",
            request_id.0,
        );
        return (status, [("retry-after", HeaderValue::from_static("5"))], Json(envelope)).into_response();
    }

    let info = ServiceInfo {
        service: state.settings.service.name.clone(),
        version: state.settings.service.version.clone(),
        tools: state.registry.list(),
    };
    (StatusCode::OK, Json(info)).into_response()
}

#[derive(Debug, Deserialize)]
struct CallToolRequest {
    tool: String,
    arguments: Value,
    #[serde(default)]
    request_id: Option<String>,
}

async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    Extension(correlation_id): Extension<RequestId>,
    body: Result<Json<CallToolRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let started_at = Instant::now();

    // 1. Parse & correlate.
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let (envelope, status) =
                Envelope::failure(ErrorCode::InvalidArguments, rejection.body_text(), correlation_id.0);
            return (status, Json(envelope)).into_response();
        }
    };

    // The envelope and the `X-Request-Id` response header always agree: both
    // come from `correlation_id`, which the middleware already committed to
    // the response header before this handler ran. A client-supplied body
    // `request_id` is validated (malformed values are rejected) but never
    // adopted, only compared, so the two can never disagree in one response.
    match &request.request_id {
        Some(candidate) if !is_valid_request_id(candidate) => {
            let (envelope, status) = Envelope::failure(
                ErrorCode::InvalidArguments,
                format!("request_id {candidate:?} is not a valid UUID"),
                correlation_id.0,
            );
            return (status, Json(envelope)).into_response();
        }
        Some(candidate) if candidate != &correlation_id.0 => {
            tracing::warn!(
                header_request_id = %correlation_id.0,
                body_request_id = %candidate,
                "X-Request-Id header and body request_id disagree; header wins"
            );
        }
        _ => {}
    }
    let request_id = correlation_id.0.clone();

    // 2. Readiness.
    if !state.lifecycle.is_serving() {
        let (envelope, status) = Envelope::failure(
            ErrorCode::ServiceUnavailable,
            "server is not currently serving requests",
            request_id,
        );
        return (status, Json(envelope)).into_response();
    }

    let outcome = dispatch_tool_call(&state, &request.tool, request.arguments, &request_id, started_at).await;

    let response = match outcome {
        Ok(data) => (StatusCode::OK, Json(Envelope::success(data, request_id.clone(), started_at))).into_response(),
        Err(err) => {
            let (code, status, message) = map_exception(&err);
            if code == ErrorCode::InternalError {
                error!(request_id = %request_id, error = %err, "internal dispatcher fault");
            }
            let (envelope, _) = Envelope::failure(code, message, request_id.clone());
            (status, Json(envelope)).into_response()
        }
    };

    info!(
        request_id = %request_id,
        tool = %request.tool,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        status = response.status().as_u16(),
        "call-tool completed"
    );

    response
}

async fn dispatch_tool_call(
    state: &AppState,
    tool: &str,
    arguments: Value,
    request_id: &str,
    started_at: Instant,
) -> Result<Value, Error> {
    // 3. Lookup.
    let (_, handler) = state.registry.get(tool)?;
    let handler = Arc::clone(handler);

    // 4. Validate arguments.
    state.registry.validate(tool, &arguments)?;

    // 5. Execute under deadline.
    let timeout = Duration::from_secs(state.settings.server.timeout);
    let deadline = started_at + timeout;
    let ctx = ToolContext {
        request_id: request_id.to_string(),
        deadline,
        graph: Arc::clone(&state.graph),
    };

    let _permit = state
        .inflight
        .acquire()
        .await
        .map_err(|_| Error::Internal("in-flight semaphore closed".to_string()))?;
    state.inflight_count.fetch_add(1, Ordering::SeqCst);
    let result = tokio::time::timeout(timeout, handler.call(&ctx, arguments)).await;
    state.inflight_count.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(inner) => inner,
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    service: String,
    version: String,
    uptime_seconds: u64,
    dependencies: HashMap<String, crate::health::DependencyStatus>,
    timestamp: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let dependencies = state.health_cache.snapshot();
    let shutting_down = matches!(state.lifecycle.get(), LifecycleState::ShuttingDown | LifecycleState::Stopped);

    let status = if shutting_down {
        "unavailable"
    } else if dependencies
        .values()
        .all(|d| matches!(d, crate::health::DependencyStatus::Connected { .. }))
    {
        "healthy"
    } else {
        "degraded"
    };

    let body = HealthStatus {
        status,
        service: state.settings.service.name.clone(),
        version: state.settings.service.version.clone(),
        uptime_seconds: state.bind_time.elapsed().as_secs(),
        dependencies,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    (StatusCode::OK, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let settings = Settings::default();
        let mut builder = crate::registry::RegistryBuilder::new();
        crate::registry::tools::register_default_tools(&mut builder).unwrap();
        let graph = Arc::new(
            GraphHandle::connect(settings.dependencies.get("memgraph").unwrap(), "neo4j", "password")
                .await
                .unwrap(),
        );
        Arc::new(AppState {
            registry: Arc::new(builder.build()),
            lifecycle: Lifecycle::default(),
            health_cache: crate::health::HealthProbe::start(&settings, Arc::clone(&graph)).cache(),
            graph,
            inflight: Arc::new(Semaphore::new(INFLIGHT_PERMITS)),
            bind_time: Instant::now(),
            inflight_count: AtomicI64::new(0),
            settings: Arc::new(settings),
        })
    }

    #[tokio::test]
    async fn tools_returns_503_while_initializing() {
        let state = test_state().await;
        let router = create_router(state);
        let response = router
            .oneshot(axum::http::Request::builder().uri("/tools").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("retry-after").unwrap(), "5");
    }

    #[tokio::test]
    async fn tools_lists_alphabetically_once_healthy() {
        let state = test_state().await;
        state.lifecycle.set(LifecycleState::Healthy);
        let router = create_router(state);
        let response = router
            .oneshot(axum::http::Request::builder().uri("/tools").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let names: Vec<_> =
            parsed["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["list_dependencies", "query_callers"]);
    }

    #[tokio::test]
    async fn call_tool_unknown_tool_is_404() {
        let state = test_state().await;
        state.lifecycle.set(LifecycleState::Healthy);
        let router = create_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/call-tool")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"tool":"does_not_exist","arguments":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["code"], "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn call_tool_invalid_request_id_is_400() {
        let state = test_state().await;
        state.lifecycle.set(LifecycleState::Healthy);
        let router = create_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/call-tool")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        r#"{"tool":"query_callers","arguments":{},"request_id":"not-a-uuid"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn call_tool_differing_body_request_id_is_overridden_by_header() {
        let state = test_state().await;
        state.lifecycle.set(LifecycleState::Healthy);
        let router = create_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/call-tool")
                    .header("content-type", "application/json")
                    .header("x-request-id", "11111111-1111-1111-1111-111111111111")
                    .body(axum::body::Body::from(
                        r#"{"tool":"query_callers","arguments":{"function":"main"},"request_id":"22222222-2222-2222-2222-222222222222"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let header_id = response.headers().get("x-request-id").unwrap().to_str().unwrap().to_string();
        assert_eq!(header_id, "11111111-1111-1111-1111-111111111111");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["request_id"], header_id);
    }

    #[tokio::test]
    async fn call_tool_not_serving_is_503() {
        let state = test_state().await;
        let router = create_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/call-tool")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"tool":"query_callers","arguments":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_is_always_200() {
        let state = test_state().await;
        let router = create_router(state);
        let response = router
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
