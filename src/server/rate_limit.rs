#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;

use axum::extract::{ ConnectInfo, Request, State };
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{ IntoResponse, Response };
use governor::clock::{ Clock, DefaultClock };
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{ Quota, RateLimiter };
use std::net::{ IpAddr, SocketAddr };
use std::num::NonZeroU32;
use std::time::Duration;

use crate::server::api::AppState;
use crate::server::error::ApiError;

const HEALTH_PATH: &str = "/health";

/// Per-client-IP limiter: a burst of `max_requests` replenishing evenly
/// over `window`, which approximates "max N requests per window". The
/// retry hint is the limiter's wait time rounded up to whole seconds.
pub struct IpRateLimiter {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    clock: DefaultClock,
}

impl IpRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max = NonZeroU32::new(max_requests.max(1)).unwrap();
        let window = window.max(Duration::from_secs(1));
        let replenish = Duration::from_secs_f64(window.as_secs_f64() / f64::from(max.get()));
        let quota = Quota::with_period(replenish).unwrap().allow_burst(max);

        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Ok when the request fits the budget; Err carries the number of
    /// seconds the client should wait before retrying.
    pub fn check(&self, client_ip: &str) -> Result<(), u64> {
        match self.limiter.check_key(&client_ip.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                let mut seconds = wait.as_secs();
                if wait.subsec_nanos() > 0 {
                    seconds += 1;
                }
                Err(seconds.max(1))
            }
        }
    }
}

/// The normalized request IP: the last X-Forwarded-For hop (one trusted
/// proxy), falling back to the socket peer address.
pub fn client_ip(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|hop| !hop.is_empty())
                .last()
        })
        .and_then(|hop| hop.parse::<IpAddr>().ok());

    if let Some(ip) = forwarded {
        return ip.to_canonical().to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_canonical().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Preflight and health checks never consume budget.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next
) -> Response {
    if req.method() == Method::OPTIONS || req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }

    let ip = client_ip(&req);
    match state.limiter.check(&ip) {
        Ok(()) => next.run(req).await,
        Err(retry_after_seconds) => {
            log::warn!("Rate limit exceeded for {}", ip);
            ApiError::RateLimited { retry_after_seconds }.into_response()
        }
    }
}
