//! Signed access and refresh tokens.
//!
//! Tokens are HS256 JWTs. Verification only proves integrity and expiry;
//! whether the referenced session is still live is checked separately by
//! the session registry.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::config::AuthConfig;
use super::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity carried by both token kinds.
///
/// Tenant and role fields are `None` while a user is not yet attached to a
/// company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub session_id: String,
    pub user_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<i32>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub identity: ClaimSet,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Result<Self, String> {
        config.validate()?;

        let secret = config.jwt_secret.as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.token_leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(TokenCodec {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        })
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Signs `identity` as a token of `kind` with the configured lifetime.
    pub fn issue(&self, identity: &ClaimSet, kind: TokenKind) -> Result<String, AuthError> {
        self.issue_with_ttl(identity, kind, self.ttl(kind))
    }

    pub fn issue_with_ttl(
        &self,
        identity: &ClaimSet,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            identity: identity.clone(),
            kind,
            sub: identity.user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!("Failed to sign {:?} token: {}", kind, e);
            AuthError::Internal
        })
    }

    /// Checks signature and expiry. Says nothing about session liveness.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => debug!("Rejected expired token"),
                    other => debug!("Rejected token: {:?}", other),
                }
                AuthError::TokenExpiredOrInvalid
            })
    }

    /// Like [`verify`](Self::verify) but also requires the token type.
    pub fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        if claims.kind != expected {
            return Err(AuthError::TokenExpiredOrInvalid);
        }
        Ok(claims)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}
