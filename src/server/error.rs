use axum::Json;
use axum::http::{ header, StatusCode };
use axum::response::{ IntoResponse, Response };
use serde::Serialize;

use crate::llm::UpstreamError;

pub const DETAIL_RATE_LIMITED: &str = "You're sending messages too quickly. Please wait a moment.";
pub const DETAIL_NOT_CONFIGURED: &str = "The chat service is not configured yet.";
pub const DETAIL_UPSTREAM_FAILED: &str = "The assistant is temporarily unavailable. Please try again.";
pub const DETAIL_UPSTREAM_TIMEOUT: &str = "The assistant took too long to reply. Please try again.";
pub const DETAIL_INTERNAL: &str = "Something went wrong. Please try again.";

/// Everything a request can fail with, mapped at the endpoint boundary
/// to one status code and one user-facing detail string. Internal error
/// text never reaches the client; it is logged at the call site instead.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Configuration,
    RateLimited {
        retry_after_seconds: u64,
    },
    UpstreamTimeout,
    Upstream,
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(rename = "retryAfterSeconds", skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(_) => ApiError::UpstreamTimeout,
            UpstreamError::Status { .. } | UpstreamError::Transport(_) => ApiError::Upstream,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail, retry_after) = match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message, None, None),
            ApiError::Configuration =>
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Service not configured".to_string(),
                    Some(DETAIL_NOT_CONFIGURED.to_string()),
                    None,
                ),
            ApiError::RateLimited { retry_after_seconds } =>
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many requests".to_string(),
                    Some(DETAIL_RATE_LIMITED.to_string()),
                    Some(retry_after_seconds),
                ),
            ApiError::UpstreamTimeout =>
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Upstream timeout".to_string(),
                    Some(DETAIL_UPSTREAM_TIMEOUT.to_string()),
                    None,
                ),
            ApiError::Upstream =>
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream error".to_string(),
                    Some(DETAIL_UPSTREAM_FAILED.to_string()),
                    None,
                ),
            ApiError::Internal =>
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(DETAIL_INTERNAL.to_string()),
                    None,
                ),
        };

        let body = ErrorBody {
            error,
            detail,
            retry_after_seconds: retry_after,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = seconds.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
