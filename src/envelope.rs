//! Canonical response envelope and wire error-code taxonomy.
//!
//! Every handler in this crate funnels its outcome through [`Envelope::success`]
//! or [`Envelope::failure`] so the invariants below hold structurally, never
//! by convention: no handler writes a raw HTTP body.

use std::time::Instant;

use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Stable wire values for the seven possible failure classifications.
///
/// `Serialize`/`Deserialize` use the upper-snake-case wire spelling directly
/// (`TOOL_NOT_FOUND`, not `ToolNotFound`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Requested tool name not in registry.
    ToolNotFound,
    /// Argument object fails the tool's JSON-Schema validation, or request body malformed.
    InvalidArguments,
    /// Handler ran but failed.
    ExecutionError,
    /// Unhandled fault inside the dispatcher itself.
    InternalError,
    /// Handler exceeded the configured per-request time budget.
    Timeout,
    /// Reserved; enforcement may be disabled in this version.
    RateLimited,
    /// Server has not finished startup initialization, or is shutting down.
    ServiceUnavailable,
}

impl ErrorCode {
    /// Fixed HTTP status mapping for each failure classification. Callers MUST NOT override this.
    #[must_use]
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::ToolNotFound => StatusCode::NOT_FOUND,
            Self::InvalidArguments => StatusCode::BAD_REQUEST,
            Self::ExecutionError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Optional vendor metadata attached to a successful envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Wall-clock milliseconds the handler took. Always populated on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// The canonical JSON container for every HTTP response body this crate emits
/// for `/call-tool`. `/tools` and `/health` return their own bare shapes (see
/// `DESIGN.md`'s Open Question decisions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Present iff `success == true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Present iff `success == false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present iff `success == false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Version-4 UUID. Echoed from the request if the client supplied a
    /// valid one; otherwise generated server-side.
    pub request_id: String,
    /// ISO-8601 UTC instant with millisecond precision and a trailing `Z`.
    pub timestamp: String,
    /// Optional vendor metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

fn now_rfc3339_millis() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Envelope {
    /// `Success(data, request_id, started_at) → Envelope`.
    ///
    /// Stamps `timestamp = now_utc()` and `meta.execution_time_ms = now_utc()
    /// − started_at`, rounded to the nearest non-negative integer millisecond.
    #[must_use]
    pub fn success(data: serde_json::Value, request_id: impl Into<String>, started_at: Instant) -> Self {
        let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            request_id: request_id.into(),
            timestamp: now_rfc3339_millis(),
            meta: Some(Meta {
                execution_time_ms: Some(elapsed_ms),
            }),
        }
    }

    /// `Failure(code, message, request_id) → (Envelope, http_status)`.
    #[must_use]
    pub fn failure(code: ErrorCode, message: impl Into<String>, request_id: impl Into<String>) -> (Self, StatusCode) {
        let status = code.http_status();
        let envelope = Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
            request_id: request_id.into(),
            timestamp: now_rfc3339_millis(),
            meta: None,
        };
        (envelope, status)
    }
}

/// Generate a fresh correlation id.
#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Syntactically validate a client-supplied correlation id.
#[must_use]
pub fn is_valid_request_id(candidate: &str) -> bool {
    Uuid::parse_str(candidate).is_ok()
}

/// `MapException(err) → (code, http_status, message)`.
///
/// The single seam through which every internal [`Error`] becomes a wire
/// [`ErrorCode`] plus a short, non-technical message. No handler bypasses
/// this function.
#[must_use]
pub fn map_exception(err: &Error) -> (ErrorCode, StatusCode, String) {
    let code = match err {
        Error::ToolNotFound(_) => ErrorCode::ToolNotFound,
        Error::InvalidArguments(_) => ErrorCode::InvalidArguments,
        Error::Timeout(_) => ErrorCode::Timeout,
        Error::ExecutionFailed(_) | Error::Graph(_) => ErrorCode::ExecutionError,
        Error::Config(_) | Error::Json(_) | Error::Internal(_) => ErrorCode::InternalError,
    };
    let message = match err {
        Error::ToolNotFound(name) => format!("Tool not found: {name}"),
        Error::InvalidArguments(detail) => detail.clone(),
        Error::Timeout(budget) => format!("handler exceeded the configured budget of {budget:?}"),
        Error::ExecutionFailed(detail) => detail.clone(),
        Error::Graph(_) => "a required dependency is unavailable".to_string(),
        Error::Config(_) | Error::Json(_) | Error::Internal(_) => "an internal error occurred".to_string(),
    };
    (code, code.http_status(), message)
}
