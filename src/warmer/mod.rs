//! Cold-start cache warming.
//!
//! Pages are fetched one at a time in listing order with a fixed delay between
//! consecutive fetches. The sequential loop is the backpressure against the
//! store's request quota: do not fan this out without adding a rate limiter.

use crate::cache::TokenCache;
use crate::config::WarmerConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Summary of one `warm_all` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmResult {
    /// True only when every page warmed
    pub success: bool,
    pub warmed: usize,
    pub total: usize,
    /// Page ids in attempt order
    pub pages: Vec<String>,
    pub failed: usize,
    pub failed_pages: Vec<String>,
}

pub struct BulkWarmer {
    cache: TokenCache,
    delay: Duration,
}

impl BulkWarmer {
    pub fn new(cache: TokenCache, config: &WarmerConfig) -> Self {
        Self {
            cache,
            delay: Duration::from_millis(config.inter_request_delay_ms),
        }
    }

    /// Fills the cache for every page registered to `owner`.
    ///
    /// Individual page failures are recorded in the result. Only a failure of
    /// the page listing itself is returned as an error.
    pub async fn warm_all(&self, owner: &str) -> Result<WarmResult> {
        let pages = self
            .cache
            .credential_store()
            .list_pages(owner)
            .await
            .with_context(|| format!("Failed to list pages for owner {}", owner))?;

        let total = pages.len();
        let mut attempted = Vec::with_capacity(total);
        let mut failed_pages = Vec::new();

        for (i, page) in pages.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }

            match self.cache.fetch(owner, &page.id).await {
                Ok(_) => {}
                Err(e) if e.needs_reauth() => {
                    warn!(owner = %owner, page = %page.id, error = %e, "Page needs re-authentication");
                    failed_pages.push(page.id.clone());
                }
                Err(e) => {
                    if e.is_quota_exceeded() {
                        warn!(owner = %owner, page = %page.id, "Store quota exceeded while warming page");
                    } else {
                        error!(owner = %owner, page = %page.id, error = %e, "Failed to warm page");
                    }
                    failed_pages.push(page.id.clone());
                }
            }
            attempted.push(page.id);
        }

        let failed = failed_pages.len();
        let result = WarmResult {
            success: failed == 0,
            warmed: total - failed,
            total,
            pages: attempted,
            failed,
            failed_pages,
        };

        info!(
            owner = %owner,
            warmed = result.warmed,
            failed = result.failed,
            total = result.total,
            "Cache warm complete"
        );
        Ok(result)
    }
}
