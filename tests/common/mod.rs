// Shared fixtures for integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagevault::cache::TokenCache;
use pagevault::config::CacheConfig;
use pagevault::credentials::{CredentialStore, CredentialVault, Credentials};
use pagevault::store::{Document, DocumentPath, DocumentStore, SqliteDocumentStore, StoreError};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const OWNER: &str = "owner-1";
pub const SESSION_TOKEN: &str = "session-token-1";

/// In-memory SQLite store that counts reads and can inject failures.
pub struct CountingStore {
    inner: SqliteDocumentStore,
    gets: AtomicUsize,
    lists: AtomicUsize,
    fail_list_quota: AtomicBool,
    failing_paths: Mutex<HashSet<String>>,
    hold_reads: AtomicBool,
    read_done: Notify,
    read_released: Notify,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteDocumentStore::new(":memory:").unwrap(),
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            fail_list_quota: AtomicBool::new(false),
            failing_paths: Mutex::new(HashSet::new()),
            hold_reads: AtomicBool::new(false),
            read_done: Notify::new(),
            read_released: Notify::new(),
        })
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Makes every collection listing fail with quota exhaustion.
    pub fn fail_list_with_quota(&self) {
        self.fail_list_quota.store(true, Ordering::SeqCst);
    }

    /// Makes reads of `path` fail with a generic backend error.
    pub fn fail_reads_of(&self, path: &DocumentPath) {
        self.failing_paths
            .lock()
            .unwrap()
            .insert(path.as_str().to_string());
    }

    /// Makes the next document read stop after loading its data and wait for
    /// [`CountingStore::release_reads`] before returning it.
    pub fn hold_reads(&self) {
        self.hold_reads.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held read has loaded its data.
    pub async fn read_held(&self) {
        self.read_done.notified().await;
    }

    pub fn release_reads(&self) {
        self.hold_reads.store(false, Ordering::SeqCst);
        self.read_released.notify_one();
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_paths.lock().unwrap().contains(path.as_str()) {
            return Err(anyhow!("backend unavailable"));
        }
        let data = self.inner.get(path).await;
        if self.hold_reads.load(Ordering::SeqCst) {
            self.read_done.notify_one();
            self.read_released.notified().await;
        }
        data
    }

    async fn put(&self, path: &DocumentPath, data: Value) -> Result<()> {
        self.inner.put(path, data).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn list_children(&self, collection: &DocumentPath) -> Result<Vec<Document>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_quota.load(Ordering::SeqCst) {
            return Err(StoreError::ResourceExhausted("Quota exceeded.".to_string()).into());
        }
        self.inner.list_children(collection).await
    }

    async fn batch_delete(&self, paths: &[DocumentPath]) -> Result<()> {
        self.inner.batch_delete(paths).await
    }
}

pub fn test_vault() -> CredentialVault {
    CredentialVault::new(&[7u8; 32]).unwrap()
}

pub fn credential_store(documents: Arc<CountingStore>) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(documents, test_vault(), "meta"))
}

pub fn token_cache(
    documents: Arc<CountingStore>,
    refresh_threshold_seconds: u64,
) -> TokenCache {
    TokenCache::new(
        credential_store(documents),
        &CacheConfig {
            refresh_threshold_seconds,
            assumed_ttl_seconds: 3600,
        },
    )
}

pub async fn seed_page(
    store: &CredentialStore,
    page: &str,
    token: &str,
    expires_at: Option<DateTime<Utc>>,
) {
    store
        .store_page(OWNER, page, &Credentials::new(token, Some(page), expires_at))
        .await
        .unwrap();
}

/// Writes a page document in the legacy layout (no auth tag).
pub async fn seed_legacy_page(documents: &CountingStore, store: &CredentialStore, page: &str) {
    documents
        .put(
            &store.page_path(OWNER, page),
            json!({
                "encryptedBlob": "bGVnYWN5LWNpcGhlcnRleHQ=",
                "nonce": "AAAAAAAAAAAAAAAA",
                "name": page,
            }),
        )
        .await
        .unwrap();
}

/// Polls until `condition` holds, yielding to spawned tasks in between.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
