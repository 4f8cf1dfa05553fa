//! Page and platform disconnect.
//!
//! Revocation deletes documents directly and then evicts cache entries; it
//! never reads through the cache.

mod legacy;

use crate::cache::TokenCache;
use anyhow::Result;
use tracing::info;

pub struct Revocation {
    cache: TokenCache,
}

impl Revocation {
    pub fn new(cache: TokenCache) -> Self {
        Self { cache }
    }

    /// Deletes one page credential and evicts its cache entry.
    ///
    /// Idempotent: disconnecting an already-absent page succeeds.
    pub async fn disconnect_page(&self, owner: &str, page: &str) -> Result<()> {
        self.cache.credential_store().delete_page(owner, page).await?;
        let evicted = self.cache.evict(owner, page);
        info!(owner = %owner, page = %page, evicted, "Page disconnected");
        Ok(())
    }

    /// Deletes the platform credential and all page credentials of `owner` in
    /// one atomic batch, then evicts every cache entry of the owner.
    ///
    /// Returns the number of page documents removed.
    pub async fn disconnect_platform(&self, owner: &str) -> Result<usize> {
        let store = self.cache.credential_store();
        let removed = store.delete_platform(owner).await?;
        let evicted = self.cache.evict_owner(owner);
        info!(
            owner = %owner,
            platform = %store.platform(),
            pages = removed.len(),
            evicted,
            "Platform disconnected"
        );
        Ok(removed.len())
    }
}
