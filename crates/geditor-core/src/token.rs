//! Session token provider
//!
//! The sync controller never authenticates by itself: it asks a provider
//! for a short-lived bearer token and hands it to the transport.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Errors when fetching a session token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("No session credential configured")]
    MissingCredential,

    #[error("Token request failed: {0}")]
    Request(String),

    #[error("Token endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Opaque bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Supplies access tokens on demand
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, TokenError>;
}

/// Provider handing out a fixed token
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<AccessToken>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<AccessToken>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Result<AccessToken, TokenError> {
        self.token.clone().ok_or(TokenError::MissingCredential)
    }
}
