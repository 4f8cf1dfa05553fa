//! OAuth token exchange and page listing.

use super::PlatformClient;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

/// Maximum number of `/me/accounts` result pages followed.
const MAX_ACCOUNT_PAGES: usize = 50;

/// Platform token endpoint response
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// User access token with its expiry, when reported.
#[derive(Clone, Debug, PartialEq)]
pub struct UserToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One page the user manages, with its page access token.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PageGrant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub access_token: String,
}

#[derive(Deserialize, Debug)]
struct AccountsResponse {
    #[serde(default)]
    data: Vec<PageGrant>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Deserialize, Debug)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

impl From<TokenResponse> for UserToken {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
        }
    }
}

impl PlatformClient {
    /// Exchanges an authorization code for a short-lived user token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<UserToken> {
        debug!("Exchanging authorization code for user token");
        let response = self
            .http
            .get(format!("{}/oauth/access_token", self.graph_api_base))
            .query(&[
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await
            .context("Failed to send token exchange request")?;

        let token: TokenResponse = parse_json(response, "Token exchange").await?;
        Ok(token.into())
    }

    /// Upgrades a short-lived user token to a long-lived one.
    pub async fn exchange_long_lived(&self, short_lived: &str) -> Result<UserToken> {
        debug!("Upgrading user token to long-lived");
        let response = self
            .http
            .get(format!("{}/oauth/access_token", self.graph_api_base))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("fb_exchange_token", short_lived),
            ])
            .send()
            .await
            .context("Failed to send long-lived token request")?;

        let token: TokenResponse = parse_json(response, "Long-lived token exchange").await?;
        Ok(token.into())
    }

    /// Lists every page the user manages, following pagination.
    pub async fn list_pages(&self, user_token: &str) -> Result<Vec<PageGrant>> {
        let mut pages = Vec::new();

        let first = self
            .http
            .get(format!("{}/me/accounts", self.graph_api_base))
            .query(&[("fields", "id,name,access_token"), ("access_token", user_token)])
            .send()
            .await
            .context("Failed to request page list")?;
        let mut batch: AccountsResponse = parse_json(first, "Page listing").await?;

        for _ in 0..MAX_ACCOUNT_PAGES {
            pages.append(&mut batch.data);
            let Some(next) = batch.paging.and_then(|p| p.next) else {
                debug!(count = pages.len(), "Page listing complete");
                return Ok(pages);
            };
            let response = self
                .http
                .get(&next)
                .send()
                .await
                .context("Failed to request next page list batch")?;
            batch = parse_json(response, "Page listing").await?;
        }

        Err(anyhow!(
            "Page listing exceeded {} result pages",
            MAX_ACCOUNT_PAGES
        ))
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        bail!("{} failed with status {}: {}", what, status, body);
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", what.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "EAAB-user",
            "token_type": "bearer",
            "expires_in": 5183944
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "EAAB-user");
        assert_eq!(response.expires_in, Some(5183944));

        let token: UserToken = response.into();
        assert!(token.expires_at.unwrap() > Utc::now() + Duration::days(59));
    }

    #[test]
    fn test_token_response_minimal() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token": "t"}"#).unwrap();
        let token: UserToken = response.into();
        assert_eq!(token.access_token, "t");
        assert_eq!(token.expires_at, None);
    }

    #[test]
    fn test_accounts_response_deserialization() {
        let json = r#"{
            "data": [
                {"id": "101", "name": "Corner Bakery", "access_token": "p101", "category": "Bakery"}
            ],
            "paging": {"cursors": {"before": "a", "after": "b"}}
        }"#;

        let response: AccountsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].name, "Corner Bakery");
        assert!(response.paging.unwrap().next.is_none());
    }
}
