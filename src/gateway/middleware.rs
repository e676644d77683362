//! Common middleware applied to all three endpoints: correlation id
//! assignment, request/response logging, and CORS. Panic safety is provided
//! by `tower_http::catch_panic::CatchPanicLayer` in `router.rs`.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::config::CorsSettings;
use crate::envelope::{is_valid_request_id, new_request_id};

/// Correlation id threaded through request extensions for handlers and
/// response middleware to share without a contextual global.
#[derive(Clone)]
pub struct RequestId(pub String);

/// Assigns a correlation id to every request before routing, threads it into
/// the log context, and echoes it as the `X-Request-Id` response header.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let header_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_valid_request_id(v))
        .map(ToString::to_string);

    let request_id = header_id.clone().unwrap_or_else(new_request_id);
    request.extensions_mut().insert(RequestId(request_id.clone()));

    info!(request_id = %request_id, method = %method, path = %path, "request received");

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

/// Build the CORS layer from configuration. When disabled, no CORS headers
/// are emitted at all (`CorsLayer::new()` with no allowances).
#[must_use]
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    if !settings.enabled {
        return CorsLayer::new();
    }
    let patterns = settings.allowed_origins.clone();
    CorsLayer::new().allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(origin) = origin.to_str() else { return false };
        patterns.iter().any(|pattern| origin_matches(pattern, origin))
    }))
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => origin.starts_with(prefix),
        None => pattern == origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_matches_exact() {
        assert!(origin_matches("http://localhost:3000", "http://localhost:3000"));
        assert!(!origin_matches("http://localhost:3000", "http://localhost:4000"));
    }

    #[test]
    fn origin_matches_trailing_wildcard() {
        assert!(origin_matches("http://localhost:*", "http://localhost:3000"));
        assert!(!origin_matches("http://localhost:*", "http://example.com"));
    }
}
