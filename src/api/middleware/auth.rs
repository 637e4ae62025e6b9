//! Bearer credential extraction
//!
//! Pulls the caller's access token out of `Authorization: Bearer <token>`.
//! The token is opaque here; it is verified later by the identity service.
//! Stores the token in request extensions for downstream handlers.

use actix_web::{http::header::HeaderValue, HttpMessage};
use actix_web_httpauth::headers::authorization::{Bearer, Scheme};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Credential extraction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing or malformed bearer credential")]
    MissingCredential,
}

/// Extension type holding the caller's bearer token
#[derive(Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Short SHA-256 fingerprint, safe to log
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.0)
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Strict: the header must exist, use the `Bearer` scheme and carry a
/// non-empty token.
pub fn extract_bearer_token(header: Option<&HeaderValue>) -> Result<String, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    let bearer = Bearer::parse(header).map_err(|_| AuthError::MissingCredential)?;

    let token = bearer.token().trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }

    Ok(token.to_string())
}

/// First 12 hex chars of the token's SHA-256
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

/// Access to the bearer token stored by the auth middleware
pub trait BearerTokenExt {
    fn bearer_token(&self) -> Option<BearerToken>;
}

impl<T: HttpMessage> BearerTokenExt for T {
    fn bearer_token(&self) -> Option<BearerToken> {
        self.extensions().get::<BearerToken>().cloned()
    }
}
