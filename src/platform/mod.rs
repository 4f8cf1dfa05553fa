//! Messaging platform client.
//!
//! Covers only what credential creation needs: building the authorization
//! URL, exchanging the authorization code, upgrading to a long-lived user
//! token, and listing the pages (with their page tokens) the user manages.

mod exchange;

pub use exchange::{PageGrant, UserToken};

use crate::config::PlatformConfig;
use crate::credentials::{CredentialStore, Credentials};
use anyhow::{Context, Result};
use tracing::info;

/// OAuth application credentials issued by the platform.
#[derive(Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthApp {
    /// Reads `PAGEVAULT_{PLATFORM}_CLIENT_ID` / `_CLIENT_SECRET`.
    pub fn from_env(platform: &str) -> Option<Self> {
        let prefix = platform.to_uppercase();
        let client_id = std::env::var(format!("PAGEVAULT_{}_CLIENT_ID", prefix)).ok()?;
        let client_secret = std::env::var(format!("PAGEVAULT_{}_CLIENT_SECRET", prefix)).ok()?;
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

/// HTTP client for the platform's OAuth and Graph endpoints.
#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    app: OAuthApp,
    graph_api_base: String,
    auth_url: String,
    scopes: Vec<String>,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig, app: OAuthApp) -> Self {
        Self {
            http: reqwest::Client::new(),
            app,
            graph_api_base: config.graph_api_base.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.clone(),
            scopes: config.scopes.clone(),
        }
    }

    /// Authorization URL the owner is redirected to.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let scope = self.scopes.join(",");
        let query = serde_urlencoded::to_string([
            ("client_id", self.app.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("response_type", "code"),
        ])
        .context("Failed to encode authorization query")?;
        Ok(format!("{}?{}", self.auth_url, query))
    }
}

/// Persists a completed grant: the platform-level user token and one
/// credential per page. Each document is a full replacement; pages stored by
/// an earlier grant but missing from this one are deleted in one batch.
///
/// Returns the ids of the dropped pages.
pub async fn persist_grant(
    store: &CredentialStore,
    owner: &str,
    user: &UserToken,
    pages: &[PageGrant],
) -> Result<Vec<String>> {
    store
        .store_platform(owner, &Credentials::new(&user.access_token, None, user.expires_at))
        .await?;

    for page in pages {
        // Page tokens derived from a long-lived user token carry no expiry.
        let credentials = Credentials::new(&page.access_token, Some(page.name.as_str()), None);
        store
            .store_page(owner, &page.id, &credentials)
            .await
            .with_context(|| format!("Failed to persist page {}", page.id))?;
    }

    let dropped: Vec<String> = store
        .list_pages(owner)
        .await?
        .into_iter()
        .map(|p| p.id)
        .filter(|id| !pages.iter().any(|g| &g.id == id))
        .collect();
    if !dropped.is_empty() {
        store.delete_pages(owner, &dropped).await?;
    }

    info!(owner = %owner, pages = pages.len(), dropped = dropped.len(), "Platform grant persisted");
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialVault;
    use crate::store::SqliteDocumentStore;
    use std::sync::Arc;

    fn client() -> PlatformClient {
        PlatformClient::new(
            &PlatformConfig::default(),
            OAuthApp {
                client_id: "app-123".to_string(),
                client_secret: "shh".to_string(),
            },
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = client()
            .authorization_url("https://dash.example.com/meta/oauth/callback", "st&ate")
            .unwrap();

        assert!(url.starts_with("https://www.facebook.com/v19.0/dialog/oauth?"));
        assert!(url.contains("client_id=app-123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fdash.example.com%2Fmeta%2Foauth%2Fcallback"));
        assert!(url.contains("scope=pages_show_list%2Cpages_messaging%2Cpages_manage_metadata"));
        assert!(url.contains("state=st%26ate"));
        assert!(!url.contains("shh"));
    }

    #[tokio::test]
    async fn test_persist_grant() {
        let documents = Arc::new(SqliteDocumentStore::new(":memory:").unwrap());
        let store = CredentialStore::new(documents, CredentialVault::new(&[1u8; 32]).unwrap(), "meta");
        let user = UserToken {
            access_token: "user-long-lived".to_string(),
            expires_at: None,
        };
        let pages = vec![
            PageGrant {
                id: "101".to_string(),
                name: "Corner Bakery".to_string(),
                access_token: "page-101".to_string(),
            },
            PageGrant {
                id: "202".to_string(),
                name: "Night Market".to_string(),
                access_token: "page-202".to_string(),
            },
        ];

        let dropped = persist_grant(&store, "owner-1", &user, &pages).await.unwrap();
        assert!(dropped.is_empty());

        let listed = store.list_pages("owner-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|p| !p.legacy));
        let opened = store.open_page("owner-1", "202").await.unwrap();
        assert_eq!(opened.access_token, "page-202");
        assert_eq!(opened.name.as_deref(), Some("Night Market"));
    }

    #[tokio::test]
    async fn test_regrant_drops_pages_no_longer_managed() {
        let documents = Arc::new(SqliteDocumentStore::new(":memory:").unwrap());
        let store = CredentialStore::new(documents, CredentialVault::new(&[1u8; 32]).unwrap(), "meta");
        let user = UserToken {
            access_token: "user-long-lived".to_string(),
            expires_at: None,
        };
        let grant = |id: &str| PageGrant {
            id: id.to_string(),
            name: format!("Page {}", id),
            access_token: format!("page-{}", id),
        };

        persist_grant(&store, "owner-1", &user, &[grant("101"), grant("202")])
            .await
            .unwrap();
        store
            .store_page("owner-2", "101", &Credentials::new("other", None, None))
            .await
            .unwrap();

        let dropped = persist_grant(&store, "owner-1", &user, &[grant("202"), grant("303")])
            .await
            .unwrap();

        assert_eq!(dropped, vec!["101".to_string()]);
        let mut ids: Vec<String> = store
            .list_pages("owner-1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["202".to_string(), "303".to_string()]);
        assert!(store.open_page("owner-1", "101").await.unwrap_err().needs_reauth());
        assert_eq!(store.open_page("owner-2", "101").await.unwrap().access_token, "other");
    }
}
