//! Signed session and transfer tokens

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use spacegate_services::{TokenScope, User};

/// Audience of transfer tokens
pub const TRANSFER_AUDIENCE: &str = "spacegate";

/// Audience of session tokens
pub const SESSION_AUDIENCE: &str = "spacegate-session";

/// Claims of a data transfer capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferClaims {
    /// Expiration time
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// Audience
    pub aud: String,
    /// Data endpoint the bearer may read from or write to
    pub target: String,
}

/// Claims of a session minted at login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user opaque id)
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub aud: String,
    pub user: User,
    #[serde(default)]
    pub scope: TokenScope,
}

/// Mints and verifies HS256 tokens with the configured secrets
#[derive(Clone)]
pub struct TokenManager {
    transfer_secret: String,
    transfer_expires: chrono::Duration,
    session_secret: String,
    session_expires: chrono::Duration,
}

impl TokenManager {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            transfer_secret: config.transfer_shared_secret.clone(),
            transfer_expires: config.transfer_expires(),
            session_secret: config.token_secret.clone(),
            session_expires: config.token_expires(),
        }
    }

    /// Default expiry of a transfer token issued now
    pub fn default_transfer_expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.transfer_expires
    }

    /// Sign a capability for `target` valid until `expires_at`
    pub fn sign_transfer(&self, target: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let claims = TransferClaims {
            exp: expires_at.timestamp(),
            iat: Utc::now().timestamp(),
            aud: TRANSFER_AUDIENCE.to_string(),
            target: target.to_string(),
        };
        sign(&claims, &self.transfer_secret)
    }

    pub fn verify_transfer(&self, token: &str) -> Result<TransferClaims> {
        verify(token, &self.transfer_secret, TRANSFER_AUDIENCE)
    }

    /// Mint a session token for an authenticated user
    pub fn mint_session(&self, user: &User, scope: &TokenScope) -> Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user.id.opaque_id.clone(),
            exp: (now + self.session_expires).timestamp(),
            iat: now.timestamp(),
            aud: SESSION_AUDIENCE.to_string(),
            user: user.clone(),
            scope: scope.clone(),
        };
        sign(&claims, &self.session_secret)
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        verify(token, &self.session_secret, SESSION_AUDIENCE)
    }
}

fn sign<C: Serialize>(claims: &C, secret: &str) -> Result<String> {
    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

fn verify<C: for<'de> Deserialize<'de>>(token: &str, secret: &str, audience: &str) -> Result<C> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.set_audience(&[audience]);
    decode::<C>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("token validation failed: {}", e);
            GatewayError::Unauthenticated("invalid or expired token".to_string())
        })
}
