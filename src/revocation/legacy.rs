//! Legacy record maintenance.
//!
//! Documents written by the old scheme carry `encryptedBlob` without an
//! `authTag`. They are never decrypted; an operator can list them and, with an
//! explicit purge, delete them. Nothing calls the purge automatically.

use super::Revocation;
use crate::credentials::PageSummary;
use anyhow::Result;
use tracing::{info, warn};

impl Revocation {
    /// Lists pages of `owner` whose credential is in the legacy format.
    pub async fn scan_legacy(&self, owner: &str) -> Result<Vec<PageSummary>> {
        let legacy = self.cache.credential_store().find_legacy_pages(owner).await?;
        if !legacy.is_empty() {
            warn!(owner = %owner, count = legacy.len(), "Legacy credential records found");
        }
        Ok(legacy)
    }

    /// Deletes every legacy page credential of `owner` in one batch.
    ///
    /// Irreversible; the affected pages must be connected again.
    pub async fn purge_legacy(&self, owner: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = self
            .scan_legacy(owner)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if ids.is_empty() {
            return Ok(ids);
        }

        self.cache.credential_store().delete_pages(owner, &ids).await?;
        for id in &ids {
            self.cache.evict(owner, id);
        }
        info!(owner = %owner, purged = ids.len(), "Legacy credential records purged");
        Ok(ids)
    }
}
