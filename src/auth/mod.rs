//! Owner identity resolution.
//!
//! The dashboard's session provider hands the browser an opaque bearer token;
//! this module turns the `Authorization` header into the owner id that scopes
//! every credential path. Unresolved requests are answered with 401.

use crate::config::SessionConfig;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::collections::HashMap;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Resolves the authenticated owner of a request.
pub trait IdentityProvider: Send + Sync {
    /// Returns the owner id, or `None` when the request is unauthenticated.
    fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// Identity provider backed by a fixed table of bearer sessions.
#[derive(Debug, Clone, Default)]
pub struct BearerSessions {
    owners: HashMap<String, String>,
}

impl BearerSessions {
    pub fn new<I, T, O>(sessions: I) -> Self
    where
        I: IntoIterator<Item = (T, O)>,
        T: Into<String>,
        O: Into<String>,
    {
        Self {
            owners: sessions
                .into_iter()
                .map(|(token, owner)| (token.into(), owner.into()))
                .collect(),
        }
    }

    pub fn from_config(sessions: &[SessionConfig]) -> Self {
        Self::new(sessions.iter().map(|s| (s.token.clone(), s.owner.clone())))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl IdentityProvider for BearerSessions {
    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let token = extract_bearer_token(headers).ok()?;
        self.owners.get(&token).cloned()
    }
}

/// Reads the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively and surrounding whitespace is ignored.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    let (scheme, token) = value.split_once(' ').ok_or(TokenError::InvalidFormat)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    match token.trim() {
        "" => Err(TokenError::Empty),
        token => Ok(token.to_string()),
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TokenError {
    #[error("Authorization header not provided")]
    Missing,
    /// Not "Bearer <token>"
    #[error("Authorization header is not a bearer token")]
    InvalidFormat,
    #[error("Bearer token is empty")]
    Empty,
}
