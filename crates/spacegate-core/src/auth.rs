//! Login: credential verification, session minting and home bootstrap

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use spacegate_services::*;
use tracing::instrument;

impl Gateway {
    /// Verify credentials with the auth provider registered for `req.auth_type`.
    ///
    /// Owners logging in for the first time get their home created; a failure
    /// to create it fails the login.
    #[instrument(skip(self, req), fields(auth_type = %req.auth_type, client_id = %req.client_id))]
    pub async fn authenticate(&self, req: AuthenticateRequest) -> Result<AuthenticateResponse> {
        let registry = self
            .pool
            .auth_registry(&self.config.auth_registry)
            .map_err(GatewayError::service("GetAuthRegistryClient"))?;
        let providers = registry
            .get_auth_providers(GetAuthProvidersRequest {
                auth_type: req.auth_type.clone(),
            })
            .await
            .map_err(GatewayError::service("GetAuthProviders"))?;
        let address = match providers.addresses.first() {
            Some(address) if providers.status.is_ok() => address,
            _ => {
                tracing::error!(status = %providers.status, "no auth provider for type");
                return Err(GatewayError::Internal(format!(
                    "error getting auth provider for type: {}",
                    req.auth_type
                )));
            }
        };
        let provider = self
            .pool
            .auth_provider(address)
            .map_err(GatewayError::service("GetAuthProviderClient"))?;

        let res = provider
            .authenticate(ProviderAuthenticateRequest {
                client_id: req.client_id.clone(),
                client_secret: req.client_secret,
            })
            .await
            .map_err(GatewayError::service("Authenticate"))?;
        match res.status.code {
            Code::Ok => {}
            Code::PermissionDenied | Code::Unauthenticated | Code::NotFound => {
                tracing::debug!(status = %res.status, "authentication refused");
                return Ok(AuthenticateResponse::from_status(res.status));
            }
            _ => {
                tracing::error!(status = %res.status, "auth provider failed");
                return Err(GatewayError::Internal(format!(
                    "error authenticating user {}",
                    req.client_id
                )));
            }
        }

        let mut user = res.user.ok_or_else(|| {
            GatewayError::Internal("user after Authenticate is nil".to_string())
        })?;
        if user.id.opaque_id.is_empty() {
            return Err(GatewayError::Internal(
                "user id after Authenticate is nil".to_string(),
            ));
        }
        if self.config.skip_user_groups_in_token {
            user.groups.clear();
        }
        let scope = res.token_scope.unwrap_or_default();
        let token = self.tokens.mint_session(&user, &scope)?;

        if scope.role != ScopeRole::Owner || self.config.disable_home_creation_on_login {
            tracing::debug!(role = ?scope.role, "skipping home creation");
            return Ok(AuthenticateResponse {
                status: Status::ok(),
                user: Some(user),
                token,
            });
        }

        let ctx = CallContext::new(user.clone(), token.clone(), scope);
        let home = self
            .create_home(&ctx, CreateHomeRequest::default())
            .await
            .map_err(|e| GatewayError::Internal(format!("error creating user home: {e}")))?;
        match home.status.code {
            Code::Ok | Code::AlreadyExists => {}
            _ => {
                tracing::error!(status = %home.status, user = %user.id.opaque_id, "home creation failed");
                return Err(GatewayError::Internal(format!(
                    "error creating user home: {}",
                    home.status
                )));
            }
        }

        Ok(AuthenticateResponse {
            status: Status::ok(),
            user: Some(user),
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::testing::Fixture;

    fn login(auth_type: &str, client_id: &str, secret: &str) -> AuthenticateRequest {
        AuthenticateRequest {
            auth_type: auth_type.to_string(),
            client_id: client_id.to_string(),
            client_secret: secret.to_string(),
        }
    }

    #[tokio::test]
    async fn test_owner_login_creates_home() {
        let fx = Fixture::new();
        let res = fx
            .gateway
            .authenticate(login("basic", "einstein", "relativity"))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert_eq!(res.user.unwrap().username, "einstein");

        let claims = fx.gateway.tokens().verify_session(&res.token).unwrap();
        assert_eq!(claims.sub, "einstein");
        assert_eq!(claims.user.groups, vec!["physics".to_string()]);
        assert_eq!(fx.provider.spaces().len(), 1);

        // a second login finds the home in place
        let again = fx
            .gateway
            .authenticate(login("basic", "einstein", "relativity"))
            .await
            .unwrap();
        assert!(again.status.is_ok());
        assert_eq!(fx.provider.spaces().len(), 1);
    }

    #[tokio::test]
    async fn test_refused_credentials_pass_through() {
        let fx = Fixture::new();
        let wrong = fx
            .gateway
            .authenticate(login("basic", "einstein", "newton"))
            .await
            .unwrap();
        assert_eq!(wrong.status.code, Code::PermissionDenied);
        assert!(wrong.token.is_empty());

        let unknown = fx
            .gateway
            .authenticate(login("basic", "bohr", "atom"))
            .await
            .unwrap();
        assert_eq!(unknown.status.code, Code::NotFound);
        assert!(fx.provider.spaces().is_empty());
    }

    #[tokio::test]
    async fn test_machine_login_skips_home() {
        let fx = Fixture::new();
        let res = fx
            .gateway
            .authenticate(login("basic", "backup", "s3cr3t"))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert!(!res.token.is_empty());
        assert!(fx.provider.spaces().is_empty());
    }

    #[tokio::test]
    async fn test_home_creation_can_be_disabled() {
        let fx = Fixture::with_config(GatewayConfig {
            disable_home_creation_on_login: true,
            skip_user_groups_in_token: true,
            ..Default::default()
        });
        let res = fx
            .gateway
            .authenticate(login("basic", "einstein", "relativity"))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert!(res.user.unwrap().groups.is_empty());
        assert!(fx.provider.spaces().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_auth_type() {
        let fx = Fixture::new();
        let err = fx
            .gateway
            .authenticate(login("oidc", "einstein", "relativity"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }
}
