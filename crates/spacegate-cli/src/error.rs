//! Error types and their HTTP rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use spacegate_core::GatewayError;
use spacegate_services::{Code, Status};
use thiserror::Error;

/// HTTP status used for a response status code
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::InvalidArgument | Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Missing, forged or expired transfer token on the data gateway
    #[error("invalid transfer token")]
    InvalidTransferToken,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("please reduce your request rate")]
    SlowDown,

    /// The data endpoint behind a transfer token failed
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    status: Status,
}

impl ApiError {
    /// Status carried in the response body
    pub fn status(&self) -> Status {
        match self {
            Self::Gateway(e) => e.status(),
            Self::Unauthenticated(m) => Status::unauthenticated(m.clone()),
            Self::InvalidTransferToken => Status::permission_denied(self.to_string()),
            Self::BadRequest(m) => Status::invalid_argument(m.clone()),
            Self::UnknownOperation(_) => Status::unimplemented(self.to_string()),
            Self::SlowDown => Status::permission_denied(self.to_string()),
            Self::Upstream(_) => Status::internal("error reaching data endpoint"),
            Self::Internal(m) => Status::internal(m.clone()),
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTransferToken => StatusCode::FORBIDDEN,
            Self::UnknownOperation(_) => StatusCode::NOT_FOUND,
            Self::SlowDown => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            other => http_status(other.status().code),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        match &self {
            Self::Gateway(e) if e.is_expected() => tracing::debug!(error = %e, "request refused"),
            _ if status_code.is_server_error() => tracing::error!(error = %self, "request failed"),
            _ => tracing::debug!(error = %self, "request rejected"),
        }
        (
            status_code,
            Json(ErrorBody {
                status: self.status(),
            }),
        )
            .into_response()
    }
}
