//! services/api/src/web/rate_limit.rs
//!
//! Axum middleware that counts requests to the AI-backed endpoints and rejects
//! callers that exceed their quota with `429 Too Many Requests`.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use planning_core::rate_limit::{RateLimitDecision, RateLimitKey};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ErrorBody;
use crate::web::state::{AppState, CurrentUser};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// The first `X-Forwarded-For` entry, else the socket peer.
fn client_ip(req: &Request) -> Option<IpAddr> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_epoch_secs()));
}

pub fn too_many_requests(decision: &RateLimitDecision) -> Response {
    let body = ErrorBody::new("Too many requests").with_message(format!(
        "Rate limit exceeded. Try again in {} seconds.",
        decision.retry_after_secs
    ));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    apply_headers(headers, decision);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
    response
}

/// Must run inside the session guard so the caller's identity is available.
pub async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    if !limiter.config().applies_to(req.uri().path()) {
        return next.run(req).await;
    }

    let user_id = req.extensions().get::<CurrentUser>().map(CurrentUser::id);
    let key = RateLimitKey::resolve(user_id, client_ip(&req));

    let decision = match limiter.check(&key, Utc::now()).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!(key = %key, error = %e, "Rate limit store failed, allowing request.");
            return next.run(req).await;
        }
    };

    if !decision.allowed {
        info!(key = %key, path = %req.uri().path(), "Rate limit exceeded.");
        return too_many_requests(&decision);
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision);
    response
}
