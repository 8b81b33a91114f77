//! Data gateway: forwards transfers to the endpoint sealed in a transfer token

use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Header carrying the transfer token on `/data`
pub const TRANSFER_TOKEN_HEADER: &str = "x-transfer-token";

/// tus expiration header, set from the token expiry on `HEAD` and `PATCH`
pub const UPLOAD_EXPIRES_HEADER: &str = "upload-expires";

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_BY_HOP.iter() {
        forwarded.remove(name);
    }
    forwarded.remove("keep-alive");
    forwarded.remove(TRANSFER_TOKEN_HEADER);
    forwarded
}

/// GET|HEAD|PUT|PATCH /data/{token}
pub async fn data_with_path_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    forward(&state, &token, method, headers, body).await
}

/// GET|HEAD|PUT|PATCH /data with the token in `X-Transfer-Token`
pub async fn data_with_header_token(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let token = headers
        .get(TRANSFER_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .ok_or(ApiError::InvalidTransferToken)?;
    forward(&state, &token, method, headers, body).await
}

/// Uploads stream through untouched; downloads carry no request body
fn upstream_body(method: &Method, body: Body) -> Option<reqwest::Body> {
    match *method {
        Method::PUT | Method::PATCH | Method::POST => {
            Some(reqwest::Body::wrap_stream(body.into_data_stream()))
        }
        _ => None,
    }
}

async fn forward(
    state: &AppState,
    token: &str,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let claims = state.gateway.tokens().verify_transfer(token).map_err(|e| {
        tracing::debug!(error = %e, "transfer token rejected");
        ApiError::InvalidTransferToken
    })?;

    tracing::debug!(method = %method, target = %claims.target, "forwarding transfer");
    let tus = matches!(method, Method::HEAD | Method::PATCH);
    let mut request = state
        .data_client
        .request(method.clone(), &claims.target)
        .headers(forwarded_headers(&headers));
    if let Some(body) = upstream_body(&method, body) {
        request = request.body(body);
    }
    let upstream = request
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let status = upstream.status();
    let mut builder = Response::builder().status(status);
    if let Some(response_headers) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            if !HOP_BY_HOP.contains(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }
        if tus {
            if let Some(value) = upload_expires(claims.exp) {
                response_headers.insert(UPLOAD_EXPIRES_HEADER, value);
            }
        }
    }

    // failed transfers answer with an empty body so reverse proxies don't wait on it
    let body = if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
        Body::from_stream(upstream.bytes_stream())
    } else {
        if let Some(response_headers) = builder.headers_mut() {
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        }
        Body::empty()
    };
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn upload_expires(exp: i64) -> Option<HeaderValue> {
    let expires = DateTime::<Utc>::from_timestamp(exp, 0)?;
    HeaderValue::from_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).ok()
}
