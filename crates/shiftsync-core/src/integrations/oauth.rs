//! OAuth2 refresh-token exchange.
//!
//! shiftsync never runs the interactive authorization flow. It is given a
//! long-lived refresh token and trades it for short-lived access tokens at
//! the token endpoint, caching the result in-process.

use std::sync::Mutex;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OAuthError;

/// Refresh tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>, // Unix timestamp
    pub token_type: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub service_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Exchange `refresh` for a fresh access token.
pub async fn refresh_token(
    client: &Client,
    config: &OAuthConfig,
    refresh: &str,
) -> Result<OAuthTokens, OAuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];

    let resp = client.post(&config.token_url).form(&params).send().await?;
    let status = resp.status();
    let body: serde_json::Value = resp.json().await?;

    if let Some(error) = body.get("error") {
        let description = body["error_description"].as_str().unwrap_or_default();
        return Err(OAuthError::TokenRefreshFailed(format!(
            "{}: {error} {description}",
            config.service_name
        )));
    }
    if !status.is_success() {
        return Err(OAuthError::TokenRefreshFailed(format!(
            "{}: token endpoint returned {status}",
            config.service_name
        )));
    }

    let access_token = body["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            OAuthError::TokenRefreshFailed(format!(
                "{}: response has no access_token",
                config.service_name
            ))
        })?
        .to_string();

    let expires_in = body.get("expires_in").and_then(|v| v.as_i64());
    let expires_at = expires_in.map(|ei| chrono::Utc::now().timestamp() + ei);

    Ok(OAuthTokens {
        access_token,
        refresh_token: body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| Some(refresh.to_string())),
        expires_at,
        token_type: body["token_type"]
            .as_str()
            .unwrap_or("Bearer")
            .to_string(),
        scope: body.get("scope").and_then(|v| v.as_str()).map(String::from),
    })
}

/// Check if tokens are expired (with 60s buffer).
pub fn is_expired(tokens: &OAuthTokens) -> bool {
    match tokens.expires_at {
        Some(exp) => chrono::Utc::now().timestamp() > exp - EXPIRY_MARGIN_SECS,
        None => false,
    }
}

/// Access-token cache in front of [`refresh_token`].
pub struct TokenProvider {
    client: Client,
    config: OAuthConfig,
    refresh: String,
    cached: Mutex<Option<OAuthTokens>>,
}

impl TokenProvider {
    pub fn new(client: Client, config: OAuthConfig, refresh: impl Into<String>) -> Self {
        Self {
            client,
            config,
            refresh: refresh.into(),
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, refreshing first if the cached one is stale.
    pub async fn access_token(&self) -> Result<String, OAuthError> {
        if let Some(tokens) = self.cached_tokens() {
            if !is_expired(&tokens) {
                return Ok(tokens.access_token);
            }
        }

        debug!(service = %self.config.service_name, "refreshing access token");
        let tokens = refresh_token(&self.client, &self.config, &self.refresh).await?;
        let access = tokens.access_token.clone();
        *self.lock() = Some(tokens);
        Ok(access)
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn cached_tokens(&self) -> Option<OAuthTokens> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OAuthTokens>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
