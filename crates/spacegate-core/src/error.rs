//! Error types for the spacegate-core crate

use spacegate_services::{Code, ServiceError, Status};
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures originating in the gateway itself
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No provider, space or share matches
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not do this
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No or invalid credentials
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Malformed reference or missing required ids
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Operation not allowed in the current state
    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    /// A collaborator lacks the capability
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Resource already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Contract violation or unexpected backend answer
    #[error("internal error: {0}")]
    Internal(String),

    /// Transport failure talking to a collaborator
    #[error("{op}: {source}")]
    Service {
        op: &'static str,
        #[source]
        source: ServiceError,
    },

    /// Signing or verifying a token failed
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl GatewayError {
    /// Wrap a transport error with the name of the failing operation
    pub fn service(op: &'static str) -> impl FnOnce(ServiceError) -> Self {
        move |source| Self::Service { op, source }
    }

    /// Status code this error surfaces as
    pub fn code(&self) -> Code {
        match self {
            Self::NotFound(_) => Code::NotFound,
            Self::PermissionDenied(_) => Code::PermissionDenied,
            Self::Unauthenticated(_) => Code::Unauthenticated,
            Self::BadRequest(_) => Code::InvalidArgument,
            Self::FailedPrecondition(_) => Code::FailedPrecondition,
            Self::NotSupported(_) => Code::Unimplemented,
            Self::AlreadyExists(_) => Code::AlreadyExists,
            Self::Internal(_) | Self::Service { .. } | Self::Token(_) => Code::Internal,
        }
    }

    /// Status carried in responses; transport details are not leaked
    pub fn status(&self) -> Status {
        let message = match self {
            Self::Service { op, .. } => format!("error calling {op}"),
            Self::Token(_) => "error handling token".to_string(),
            other => other.message().to_string(),
        };
        Status::new(self.code(), message)
    }

    /// Whether the error is an expected, caller-facing outcome
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::PermissionDenied(_) | Self::Unauthenticated(_)
        )
    }

    fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::PermissionDenied(m)
            | Self::Unauthenticated(m)
            | Self::BadRequest(m)
            | Self::FailedPrecondition(m)
            | Self::NotSupported(m)
            | Self::AlreadyExists(m)
            | Self::Internal(m) => m,
            Self::Service { op, .. } => op,
            Self::Token(_) => "token",
        }
    }

    /// Carry a non-OK collaborator status as an error of the same kind
    pub fn from_status(status: &Status) -> Self {
        let message = status.message.clone();
        match status.code {
            Code::NotFound => Self::NotFound(message),
            Code::PermissionDenied => Self::PermissionDenied(message),
            Code::Unauthenticated => Self::Unauthenticated(message),
            Code::InvalidArgument | Code::OutOfRange => Self::BadRequest(message),
            Code::FailedPrecondition => Self::FailedPrecondition(message),
            Code::Unimplemented => Self::NotSupported(message),
            Code::AlreadyExists => Self::AlreadyExists(message),
            Code::Ok | Code::Internal => Self::Internal(message),
        }
    }

    /// Classify a non-OK status returned by a storage registry lookup
    pub fn from_registry(status: &Status) -> Self {
        let message = status.message.clone();
        match status.code {
            Code::NotFound => Self::NotFound(message),
            Code::PermissionDenied => Self::PermissionDenied(message),
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
                Self::BadRequest(message)
            }
            Code::Unimplemented => Self::NotSupported(message),
            _ => Self::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Code::NotFound, Code::NotFound)]
    #[case(Code::PermissionDenied, Code::PermissionDenied)]
    #[case(Code::InvalidArgument, Code::InvalidArgument)]
    #[case(Code::FailedPrecondition, Code::InvalidArgument)]
    #[case(Code::OutOfRange, Code::InvalidArgument)]
    #[case(Code::Unimplemented, Code::Unimplemented)]
    #[case(Code::Unauthenticated, Code::Internal)]
    #[case(Code::Internal, Code::Internal)]
    fn test_registry_status_mapping(#[case] returned: Code, #[case] surfaced: Code) {
        let err = GatewayError::from_registry(&Status::new(returned, "lookup failed"));
        assert_eq!(err.code(), surfaced);
    }

    #[test]
    fn test_service_error_hides_transport_detail() {
        let err = GatewayError::service("ListStorageProviders")(ServiceError::Connection(
            "10.0.0.7:9142 refused".into(),
        ));
        let status = err.status();
        assert_eq!(status.code, Code::Internal);
        assert_eq!(status.message, "error calling ListStorageProviders");
        assert!(err.to_string().contains("refused"));
    }
}
