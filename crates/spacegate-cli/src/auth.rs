//! Session token extraction

use crate::ApiError;
use axum::http::HeaderMap;
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use spacegate_core::{CallContext, Gateway};

/// Header carrying the session token for clients that cannot set `Authorization`
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Extract the session token, preferring a bearer `Authorization` header
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Build the call context of a request.
///
/// Without a token the call is anonymous, unless `required` is set.
pub fn authenticate_request(
    gateway: &Gateway,
    headers: &HeaderMap,
    required: bool,
) -> Result<CallContext, ApiError> {
    match extract_token(headers) {
        Some(token) => gateway.context_from_token(&token).map_err(|e| {
            tracing::debug!(error = %e, "session token rejected");
            ApiError::Unauthenticated("invalid or expired token".to_string())
        }),
        None if required => Err(ApiError::Unauthenticated(
            "authentication required".to_string(),
        )),
        None => Ok(CallContext::anonymous()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use spacegate_core::GatewayConfig;
    use spacegate_services::{MemoryPool, TokenScope, User, UserId};
    use std::sync::Arc;

    fn gateway() -> Gateway {
        Gateway::new(GatewayConfig::default(), Arc::new(MemoryPool::new()))
    }

    fn einstein() -> User {
        User {
            id: UserId::new("example.org", "einstein"),
            username: "einstein".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic eHl6"));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_extract_access_token_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("abc123"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_authenticate_request() {
        let gateway = gateway();
        let token = gateway
            .tokens()
            .mint_session(&einstein(), &TokenScope::owner())
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let ctx = authenticate_request(&gateway, &headers, true).unwrap();
        assert_eq!(ctx.user_key(), "einstein");
        assert_eq!(ctx.token, token);
    }

    #[test]
    fn test_missing_token() {
        let gateway = gateway();
        let headers = HeaderMap::new();

        assert!(matches!(
            authenticate_request(&gateway, &headers, true),
            Err(ApiError::Unauthenticated(_))
        ));
        let ctx = authenticate_request(&gateway, &headers, false).unwrap();
        assert!(ctx.user.is_none());
    }

    #[test]
    fn test_forged_token() {
        let gateway = gateway();
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("not-a-jwt"));

        assert!(matches!(
            authenticate_request(&gateway, &headers, false),
            Err(ApiError::Unauthenticated(_))
        ));
    }
}
