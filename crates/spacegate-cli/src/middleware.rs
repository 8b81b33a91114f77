//! HTTP middleware for authentication, rate limiting, etc.

use crate::auth::authenticate_request;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use governor::{state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use spacegate_core::CallContext;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Header carrying the id of a request
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Rate limiter type
pub type KeyedRateLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

/// Create a rate limiter
pub fn create_rate_limiter(requests_per_second: u32) -> Arc<KeyedRateLimiter> {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_second(rps)))
}

/// Authentication middleware; stores the [`CallContext`] in request extensions
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = authenticate_request(&state.gateway, request.headers(), state.config.auth_enabled)?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Rate limiting middleware, keyed by caller
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .extensions()
        .get::<CallContext>()
        .map(|ctx| ctx.user_key())
        .filter(|key| !key.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    if limiter.check_key(&key).is_err() {
        return Err(ApiError::SlowDown);
    }

    Ok(next.run(request).await)
}

/// Request ID middleware; keeps an incoming `x-request-id`
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request ID extension
#[derive(Clone)]
pub struct RequestId(pub String);

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        request_id = %request_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rate_limiter() {
        let limiter = create_rate_limiter(1);

        assert!(limiter.check_key(&"einstein".to_string()).is_ok());
        assert!(limiter.check_key(&"einstein".to_string()).is_err());
        // keys are limited independently
        assert!(limiter.check_key(&"marie".to_string()).is_ok());
    }

    #[test]
    fn test_zero_rps_still_admits() {
        let limiter = create_rate_limiter(0);
        assert!(limiter.check_key(&"anonymous".to_string()).is_ok());
    }
}
