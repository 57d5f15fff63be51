//! HS256 token verification and session revocation check.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheClient, CacheError};
use crate::config::AuthConfig;
use crate::context::{Principal, RequestContext};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("session revoked")]
    Revoked,

    #[error("session revocation status unavailable")]
    RevocationUnavailable,
}

impl AuthError {
    /// Whether the caller is identified but not allowed (403) rather than unidentified (401).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::Revoked | AuthError::RevocationUnavailable)
    }
}

/// `sub` may arrive as a JSON number or a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    Id(u64),
    Text(String),
}

impl Subject {
    fn user_id(&self) -> Result<u64, AuthError> {
        match self {
            Subject::Id(id) => Ok(*id),
            Subject::Text(s) => s
                .parse()
                .map_err(|_| AuthError::Malformed(format!("subject '{}' is not a user id", s))),
        }
    }
}

/// Claims carried by access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Subject,
    pub sid: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Cache key marking a session as revoked.
pub fn revocation_key(session_id: &str) -> String {
    format!("revoked:{}", session_id)
}

/// Verifies bearer tokens against a pre-shared key.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    cache: CacheClient,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("leeway", &self.validation.leeway)
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig, cache: CacheClient) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            cache,
        }
    }

    /// Check signature and time claims. No I/O.
    pub fn decode(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::ImmatureSignature => AuthError::NotYetValid,
                _ => AuthError::Malformed(e.to_string()),
            }
        })?;
        let claims = data.claims;

        if claims.sid.is_empty() {
            return Err(AuthError::Malformed("empty session id".into()));
        }

        Ok(Principal {
            user_id: claims.sub.user_id()?,
            session_id: claims.sid,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Full verification of an `Authorization` header value, including the
    /// revocation lookup.
    pub async fn verify(
        &self,
        ctx: &RequestContext,
        authorization: Option<&str>,
    ) -> Result<Principal, AuthError> {
        let token = bearer_token(authorization)?;
        let principal = self.decode(token)?;

        match self
            .cache
            .get_str(ctx, &revocation_key(&principal.session_id))
            .await
        {
            Err(CacheError::NotFound) => Ok(principal),
            Ok(_) => {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    user_id = principal.user_id,
                    "Rejected revoked session"
                );
                Err(AuthError::Revoked)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    error = %e,
                    "Revocation check failed; rejecting request"
                );
                Err(AuthError::RevocationUnavailable)
            }
        }
    }
}

fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let header = authorization.ok_or(AuthError::Missing)?;
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::Malformed("expected 'Bearer <token>'".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed(format!("unsupported scheme '{}'", scheme)));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token)
}
