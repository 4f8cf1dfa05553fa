//! Credential store adapter over the document store.
//!
//! Maps `(owner, platform, page)` to a document holding the encrypted triple.
//! All encryption and decryption goes through the [`CredentialVault`].

use super::{CredentialDocument, CredentialError, CredentialVault, Credentials, VaultError};
use crate::store::{DocumentPath, DocumentStore};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Page entry returned by a listing, without decrypting anything.
#[derive(Clone, Debug, PartialEq)]
pub struct PageSummary {
    pub id: String,
    pub name: Option<String>,
    /// Encrypted blob present but no authentication tag
    pub legacy: bool,
}

/// Encrypted credential storage for one platform.
pub struct CredentialStore {
    documents: Arc<dyn DocumentStore>,
    vault: CredentialVault,
    platform: String,
}

impl CredentialStore {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        vault: CredentialVault,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            vault,
            platform: platform.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// `users/{owner}/integrations/{platform}`
    pub fn platform_path(&self, owner: &str) -> DocumentPath {
        DocumentPath::from_segments(&["users", owner, "integrations", self.platform.as_str()])
    }

    /// `users/{owner}/integrations/{platform}/pages`
    pub fn pages_path(&self, owner: &str) -> DocumentPath {
        self.platform_path(owner).child("pages")
    }

    pub fn page_path(&self, owner: &str, page: &str) -> DocumentPath {
        self.pages_path(owner).child(page)
    }

    /// Encrypts and stores a page credential, replacing any previous document.
    pub async fn store_page(&self, owner: &str, page: &str, credentials: &Credentials) -> Result<()> {
        let doc = self.seal(credentials).context("Failed to encrypt page token")?;
        self.documents
            .put(&self.page_path(owner, page), doc)
            .await
            .with_context(|| format!("Failed to store credential for page {}", page))?;
        debug!(owner = %owner, page = %page, "Page credential stored");
        Ok(())
    }

    /// Encrypts and stores the platform-level OAuth credential.
    pub async fn store_platform(&self, owner: &str, credentials: &Credentials) -> Result<()> {
        let doc = self.seal(credentials).context("Failed to encrypt platform token")?;
        self.documents
            .put(&self.platform_path(owner), doc)
            .await
            .context("Failed to store platform credential")?;
        debug!(owner = %owner, platform = %self.platform, "Platform credential stored");
        Ok(())
    }

    /// Reads a page document without decrypting it.
    pub async fn load_page(&self, owner: &str, page: &str) -> Result<Option<CredentialDocument>> {
        let Some(value) = self
            .documents
            .get(&self.page_path(owner, page))
            .await
            .with_context(|| format!("Failed to read credential for page {}", page))?
        else {
            return Ok(None);
        };

        let doc = serde_json::from_value(value)
            .with_context(|| format!("Malformed credential document for page {}", page))?;
        Ok(Some(doc))
    }

    /// Reads and decrypts a page credential.
    ///
    /// # Errors
    /// - `NotConnected` when no document exists
    /// - `Decryption` when the document is legacy, malformed or fails verification
    /// - `Store` when the backend call itself fails
    pub async fn open_page(&self, owner: &str, page: &str) -> Result<Credentials, CredentialError> {
        let value = self
            .documents
            .get(&self.page_path(owner, page))
            .await
            .with_context(|| format!("Failed to read credential for page {}", page))?
            .ok_or_else(|| CredentialError::NotConnected {
                owner: owner.to_string(),
                page: page.to_string(),
            })?;

        let unreadable = |source: VaultError| CredentialError::Decryption {
            owner: owner.to_string(),
            page: page.to_string(),
            source,
        };

        let doc: CredentialDocument = serde_json::from_value(value).map_err(|e| {
            unreadable(VaultError::Integrity(format!("malformed credential document: {}", e)))
        })?;

        let access_token = self
            .vault
            .decrypt(&doc.encrypted_blob, &doc.nonce, doc.auth_tag.as_deref())
            .map_err(unreadable)?;

        Ok(Credentials {
            access_token,
            name: doc.name,
            issued_at: doc.issued_at.unwrap_or_else(chrono::Utc::now),
            expires_at: doc.expires_at,
        })
    }

    /// Lists every page registered for `owner`, ordered by page id.
    pub async fn list_pages(&self, owner: &str) -> Result<Vec<PageSummary>> {
        let documents = self
            .documents
            .list_children(&self.pages_path(owner))
            .await
            .context("Failed to list pages")?;

        Ok(documents
            .into_iter()
            .map(|doc| PageSummary {
                name: doc.data.get("name").and_then(Value::as_str).map(str::to_string),
                legacy: is_legacy_value(&doc.data),
                id: doc.id,
            })
            .collect())
    }

    /// Pages whose document is in the legacy tag-less format.
    pub async fn find_legacy_pages(&self, owner: &str) -> Result<Vec<PageSummary>> {
        let mut pages = self.list_pages(owner).await?;
        pages.retain(|p| p.legacy);
        Ok(pages)
    }

    /// Deletes one page document. Succeeds when it is already absent.
    pub async fn delete_page(&self, owner: &str, page: &str) -> Result<()> {
        self.documents
            .delete(&self.page_path(owner, page))
            .await
            .with_context(|| format!("Failed to delete credential for page {}", page))
    }

    /// Deletes the given page documents in one atomic batch.
    pub async fn delete_pages(&self, owner: &str, pages: &[String]) -> Result<()> {
        let paths: Vec<DocumentPath> = pages.iter().map(|p| self.page_path(owner, p)).collect();
        self.documents
            .batch_delete(&paths)
            .await
            .context("Failed to batch delete page credentials")
    }

    /// Deletes the platform credential and every page document together.
    ///
    /// Returns the ids of the pages that were removed.
    pub async fn delete_platform(&self, owner: &str) -> Result<Vec<String>> {
        let pages = self
            .documents
            .list_children(&self.pages_path(owner))
            .await
            .context("Failed to list pages for disconnect")?;

        let page_ids: Vec<String> = pages.into_iter().map(|d| d.id).collect();
        let mut paths = vec![self.platform_path(owner)];
        paths.extend(page_ids.iter().map(|p| self.page_path(owner, p)));

        self.documents
            .batch_delete(&paths)
            .await
            .context("Failed to batch delete platform credentials")?;
        Ok(page_ids)
    }

    fn seal(&self, credentials: &Credentials) -> Result<Value> {
        let secret = self.vault.encrypt(&credentials.access_token)?;
        let doc = CredentialDocument {
            encrypted_blob: secret.ciphertext,
            nonce: secret.nonce,
            auth_tag: Some(secret.tag),
            name: credentials.name.clone(),
            issued_at: Some(credentials.issued_at),
            expires_at: credentials.expires_at,
        };
        Ok(serde_json::to_value(doc)?)
    }
}

fn is_legacy_value(data: &Value) -> bool {
    CredentialDocument::deserialize(data).map_or(false, |doc| doc.is_legacy())
}
