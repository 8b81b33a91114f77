//! In-memory auth registry and provider

use super::respond;
use crate::*;
use dashmap::DashMap;

/// Maps authentication types to provider addresses
#[derive(Default)]
pub struct MemoryAuthRegistry {
    providers: DashMap<String, Vec<String>>,
}

impl MemoryAuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, auth_type: impl Into<String>, address: impl Into<String>) {
        self.providers
            .entry(auth_type.into())
            .or_default()
            .push(address.into());
    }
}

#[async_trait::async_trait]
impl AuthRegistry for MemoryAuthRegistry {
    async fn get_auth_providers(
        &self,
        req: GetAuthProvidersRequest,
    ) -> Result<GetAuthProvidersResponse> {
        match self.providers.get(&req.auth_type) {
            Some(addresses) if !addresses.is_empty() => Ok(GetAuthProvidersResponse {
                status: Status::ok(),
                addresses: addresses.clone(),
            }),
            _ => respond(Err(Status::not_found(format!(
                "no auth provider for type {}",
                req.auth_type
            )))),
        }
    }
}

struct Account {
    secret: String,
    user: User,
    scope: TokenScope,
}

/// Static credential store
#[derive(Default)]
pub struct MemoryAuthProvider {
    accounts: DashMap<String, Account>,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `client_id`/`secret` for `user` with the given scope
    pub fn add_account(
        &self,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        user: User,
        scope: TokenScope,
    ) {
        self.accounts.insert(
            client_id.into(),
            Account {
                secret: secret.into(),
                user,
                scope,
            },
        );
    }
}

#[async_trait::async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn authenticate(
        &self,
        req: ProviderAuthenticateRequest,
    ) -> Result<ProviderAuthenticateResponse> {
        let Some(account) = self.accounts.get(&req.client_id) else {
            return respond(Err(Status::not_found(format!(
                "unknown user {}",
                req.client_id
            ))));
        };
        if account.secret != req.client_secret {
            return respond(Err(Status::permission_denied("wrong password")));
        }
        Ok(ProviderAuthenticateResponse {
            status: Status::ok(),
            user: Some(account.user.clone()),
            token_scope: Some(account.scope.clone()),
        })
    }
}
