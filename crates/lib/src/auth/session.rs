//! Session decoding: (user, email, org) from an HS256 session token.
//!
//! The token comes from the `token` query parameter or, failing that, the `tdtAuthToken`
//! cookie. Requests without either get the anonymous [`DEFAULT_USER`] session.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ApiError;

/// User name of callers without a session token.
pub const DEFAULT_USER: &str = "visitor";

/// Cookie carrying the session token.
pub const AUTH_COOKIE: &str = "tdtAuthToken";

/// Per-request caller identity. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user: String,
    pub email: Option<String>,
    pub repo_org: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            email: None,
            repo_org: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user == DEFAULT_USER
    }
}

/// Claims carried by the session token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_org: Option<String>,
    /// Expiry, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not valid before, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token presented but no token secret is configured")]
    NoSecret,
    #[error("malformed session token")]
    Malformed,
    #[error("unsupported session token algorithm")]
    Algorithm,
    #[error("invalid session token signature")]
    Signature,
    #[error("session token expired")]
    Expired,
    #[error("session token not valid yet")]
    NotYetValid,
    #[error("session token could not be signed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => SessionError::Expired,
            ErrorKind::ImmatureSignature => SessionError::NotYetValid,
            ErrorKind::InvalidSignature => SessionError::Signature,
            ErrorKind::InvalidAlgorithm => SessionError::Algorithm,
            _ => SessionError::Malformed,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Auth(e.to_string())
    }
}

/// Verifies session tokens against the configured secret.
#[derive(Debug, Clone, Default)]
pub struct SessionDecoder {
    secret: Option<String>,
}

impl SessionDecoder {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Session for a request: query token first, then the auth cookie, else anonymous.
    pub fn decode_request(
        &self,
        token_param: Option<&str>,
        cookie_header: Option<&str>,
    ) -> Result<Session, SessionError> {
        let token = token_param
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .or_else(|| cookie_header.and_then(|h| cookie_value(h, AUTH_COOKIE)));
        match token {
            Some(t) => self.decode_token(&t),
            None => Ok(Session::anonymous()),
        }
    }

    /// Verify an HS256 token and extract the session.
    pub fn decode_token(&self, token: &str) -> Result<Session, SessionError> {
        let secret = self.secret.as_deref().ok_or(SessionError::NoSecret)?;
        let claims = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation(),
        )?
        .claims;
        Ok(Session {
            user: claims
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            email: claims.email,
            repo_org: claims.repo_org,
        })
    }
}

/// HS256 only; `exp` and `nbf` are checked when present but not required.
fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;
    validation
}

/// Issue an HS256 session token for the given claims.
pub fn sign_token(claims: &SessionClaims, secret: &str) -> Result<String, SessionError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| SessionError::Signing(e.to_string()))
}

/// Value of cookie `name` in a `Cookie` header.
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name)
            .then(|| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}
