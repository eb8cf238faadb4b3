#[cfg(test)]
#[path = "cors_test.rs"]
mod tests;

use axum::extract::Request;
use axum::http::{ HeaderValue, Method, StatusCode };
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::{ AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer };

/// Origins compare case-insensitively with any trailing slash stripped.
pub fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

pub fn parse_allowed_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_origin)
        .filter(|origin| !origin.is_empty())
        .collect()
}

/// Builds the CORS layer. Allow-listed origins are echoed back verbatim
/// with `Vary: Origin`; preflight mirrors the requested method and
/// headers. An empty allow-list is the documented permissive fallback.
pub fn layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let allowed = allowed_origins.to_vec();
    CorsLayer::new()
        .allow_origin(
            AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|origin| allowed.contains(&normalize_origin(origin)))
                    .unwrap_or(false)
            })
        )
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Preflight responses short-circuit with 204 and no body. The CORS
/// layer beneath this one has already attached its headers.
pub async fn preflight_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;
    if is_options {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
