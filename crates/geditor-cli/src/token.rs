//! Session token exchange
//!
//! Trades the user's session credential for an access token by calling the
//! token endpoint with `Authorization: Bearer <credential>`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use geditor_core::{AccessToken, Config, StaticTokenProvider, TokenError, TokenProvider};

/// Environment variable holding the session credential
pub const CREDENTIAL_ENV: &str = "GEDITOR_SESSION_TOKEN";

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Fetches the access token from the token endpoint
pub struct HttpTokenProvider {
    client: reqwest::Client,
    url: String,
    credential: Option<String>,
}

impl HttpTokenProvider {
    pub fn new(
        url: impl Into<String>,
        credential: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("geditor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            credential,
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<AccessToken, TokenError> {
        let credential = self
            .credential
            .as_deref()
            .ok_or(TokenError::MissingCredential)?;

        debug!("Requesting access token from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenError::Status(response.status().as_u16()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        if body.token.trim().is_empty() {
            return Err(TokenError::Malformed("empty token".to_string()));
        }
        Ok(AccessToken::new(body.token))
    }
}

/// Token source picked from configuration
pub enum CliTokenProvider {
    /// Exchange the credential at `token_url`
    Http(HttpTokenProvider),
    /// No `token_url`: the credential is the access token
    Static(StaticTokenProvider),
}

impl CliTokenProvider {
    pub fn from_config(config: &Config, credential: Option<String>) -> Result<Self> {
        Ok(match &config.token_url {
            Some(url) => CliTokenProvider::Http(HttpTokenProvider::new(
                url.clone(),
                credential,
                config.request_timeout(),
            )?),
            None => CliTokenProvider::Static(StaticTokenProvider::new(
                credential.map(AccessToken::new),
            )),
        })
    }
}

#[async_trait]
impl TokenProvider for CliTokenProvider {
    async fn fetch_token(&self) -> Result<AccessToken, TokenError> {
        match self {
            CliTokenProvider::Http(provider) => provider.fetch_token().await,
            CliTokenProvider::Static(provider) => provider.fetch_token().await,
        }
    }
}

/// Credential from the command line, falling back to the environment
pub fn resolve_credential(flag: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var(CREDENTIAL_ENV).ok())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
