//! Per-action rate limiting over the shared fixed-window counter store.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use huddle_core::{
    error::AppError,
    ratelimit::{check_fail_open, RateCounter},
};
use std::net::SocketAddr;
use std::sync::Arc;

/// One action's limit, attachable as a route layer.
#[derive(Clone)]
pub struct ActionLimit {
    pub counter: Arc<dyn RateCounter>,
    pub action: &'static str,
    pub limit: u32,
    pub window_secs: u64,
}

impl ActionLimit {
    pub fn new(
        counter: Arc<dyn RateCounter>,
        action: &'static str,
        limit: u32,
        window_secs: u64,
    ) -> Self {
        Self {
            counter,
            action,
            limit,
            window_secs,
        }
    }
}

/// Middleware guarding an endpoint with a fixed window per (action, IP).
///
/// The counter store failing is never a reason to block the request; the
/// check fails open with a warning.
pub async fn action_rate_limit_middleware(
    State(limit): State<ActionLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(source) = client_ip(&request) else {
        tracing::warn!(action = limit.action, "could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    let key = format!("rl:{}:{}", limit.action, source);
    let decision =
        check_fail_open(limit.counter.as_ref(), &key, limit.limit, limit.window_secs).await;

    if !decision.allowed {
        let retry_after = (decision.reset_at - chrono::Utc::now()).num_seconds().max(0) as u64;
        return Err(AppError::TooManyRequests(Some(retry_after)));
    }

    Ok(next.run(request).await)
}

fn client_ip(request: &Request) -> Option<String> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
}
