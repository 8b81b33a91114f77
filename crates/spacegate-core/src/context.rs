//! Identity of the caller of a gateway operation

use spacegate_services::{TokenScope, User, UserId};

/// Per-request caller identity, built from a verified session token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    pub user: Option<User>,
    /// Raw session token, forwarded to app providers
    pub token: String,
    pub scope: TokenScope,
}

impl CallContext {
    pub fn new(user: User, token: impl Into<String>, scope: TokenScope) -> Self {
        Self {
            user: Some(user),
            token: token.into(),
            scope,
        }
    }

    /// Context of an unauthenticated call
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }

    /// Opaque id of the caller, empty when anonymous
    pub fn user_key(&self) -> &str {
        self.user_id().map(|id| id.opaque_id.as_str()).unwrap_or("")
    }
}
