//! Quota guard in front of a document store.
//!
//! Every call is charged against the bucket of the owner named in its path.
//! Over the ceiling the call fails with [`StoreError::ResourceExhausted`]
//! without reaching the backend, the same signal a hosted store returns when
//! its quota is exhausted.

use super::{Document, DocumentPath, DocumentStore, StoreError};
use crate::rate_limit::RateLimiter;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Bucket used for paths that are not owner-scoped.
const SHARED_BUCKET: &str = "_shared";

pub struct RateLimitedStore {
    inner: Arc<dyn DocumentStore>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedStore {
    pub fn new(inner: Arc<dyn DocumentStore>, max_requests_per_minute: u64) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::new(max_requests_per_minute)),
        }
    }

    /// Shared handle to the per-owner buckets, for the idle-bucket cleanup task.
    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    fn charge(&self, path: &DocumentPath) -> Result<()> {
        let owner = path.owner().unwrap_or_else(|| SHARED_BUCKET.to_string());
        let Err(retry_in) = self.limiter.try_acquire(&owner) else {
            return Ok(());
        };

        warn!(
            owner = %owner,
            limit_per_minute = self.limiter.limit_per_minute(),
            retry_in_ms = retry_in.as_millis() as u64,
            "Document store request ceiling reached"
        );
        Err(StoreError::ResourceExhausted(format!(
            "Quota exceeded for owner '{}' ({} requests/minute)",
            owner,
            self.limiter.limit_per_minute()
        ))
        .into())
    }
}

#[async_trait]
impl DocumentStore for RateLimitedStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>> {
        self.charge(path)?;
        self.inner.get(path).await
    }

    async fn put(&self, path: &DocumentPath, data: Value) -> Result<()> {
        self.charge(path)?;
        self.inner.put(path, data).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.charge(path)?;
        self.inner.delete(path).await
    }

    async fn list_children(&self, collection: &DocumentPath) -> Result<Vec<Document>> {
        self.charge(collection)?;
        self.inner.list_children(collection).await
    }

    async fn batch_delete(&self, paths: &[DocumentPath]) -> Result<()> {
        // A batch is one commit, charged once.
        if let Some(first) = paths.first() {
            self.charge(first)?;
        }
        self.inner.batch_delete(paths).await
    }
}
