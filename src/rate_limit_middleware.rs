// rate_limit_middleware.rs
//! Fixed-window per-IP rate limiting backed by the cache service.
//! Fails open: a cache error never blocks a request.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::common::AppState;

#[derive(Serialize)]
struct RateLimitErrorResponse {
    error: String,
    code: String,
    retry_after: u64,
}

/// Extract IP address from request
fn extract_ip_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    // Try X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP in the chain
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    // Try X-Real-IP header
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    // Fall back to connection info
    connect_info.map(|info| info.0.ip().to_string())
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let state = state_lock.read().await.clone();

    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let ip = extract_ip_address(request.headers(), connect_info.as_ref())
        .unwrap_or_else(|| "unknown".to_string());
    let path = request.uri().path().to_string();

    let key = format!("rate:{}", ip);
    match state
        .cache
        .incr(&key, state.config.rate_limit_window_secs)
        .await
    {
        Ok(count) if count <= state.config.rate_limit_max_requests => {
            debug!(ip = %ip, path = %path, count = count, "Request allowed by rate limiter");
            Ok(next.run(request).await)
        }
        Ok(count) => {
            warn!(
                ip = %ip,
                path = %path,
                count = count,
                "Request blocked by rate limiter"
            );

            let retry_after = state.config.rate_limit_window_secs;
            let error_response = RateLimitErrorResponse {
                error: "Rate limit exceeded. Please try again later.".to_string(),
                code: "RATE_LIMIT_EXCEEDED".to_string(),
                retry_after,
            };

            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, Json(error_response)).into_response();

            if let Ok(retry_header) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("retry-after", retry_header);
            }

            Err(response)
        }
        Err(e) => {
            warn!(error = %e, ip = %ip, "Error checking rate limit, allowing request");
            // On error, allow the request to proceed
            Ok(next.run(request).await)
        }
    }
}
