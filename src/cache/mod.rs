//! In-process page token cache with stale-while-revalidate refresh.
//!
//! Every caller obtains page tokens through [`TokenCache::get_token`]:
//!
//! ```text
//!   now < expires_at - threshold          → cached token, no I/O
//!   expires_at - threshold ≤ now < expires_at
//!                                         → cached token + one background refresh
//!   no entry, or now ≥ expires_at         → blocking read + decrypt, entry replaced
//! ```
//!
//! An entry whose `expires_at` has passed is never returned. The cache is a
//! disposable view of the document store: nothing here is persisted and every
//! entry can be rebuilt with [`TokenCache::fetch`].

use crate::config::CacheConfig;
use crate::credentials::{CredentialError, CredentialStore};
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound for configured durations (~100 years).
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    owner: String,
    page: String,
}

impl CacheKey {
    fn new(owner: &str, page: &str) -> Self {
        Self {
            owner: owner.to_string(),
            page: page.to_string(),
        }
    }
}

/// Cached, decrypted page token.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub token: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Where an entry sits relative to its expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Still usable, refresh due
    Stale,
    Expired,
}

impl CacheEntry {
    pub fn freshness(&self, now: DateTime<Utc>, refresh_threshold: Duration) -> Freshness {
        if now >= self.expires_at {
            Freshness::Expired
        } else if now >= self.expires_at - refresh_threshold {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

/// Shared page token cache. Cloning shares the same entries.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<CredentialStore>,
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    /// Keys with a background refresh in flight
    refreshing: Arc<DashSet<CacheKey>>,
    /// Bumped on every eviction of an owner's entries. A read that started
    /// under an older generation must not install its result.
    generations: Arc<DashMap<String, u64>>,
    refresh_threshold: Duration,
    assumed_ttl: Duration,
}

impl TokenCache {
    pub fn new(store: Arc<CredentialStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            entries: Arc::new(DashMap::new()),
            refreshing: Arc::new(DashSet::new()),
            generations: Arc::new(DashMap::new()),
            refresh_threshold: seconds(config.refresh_threshold_seconds),
            assumed_ttl: seconds(config.assumed_ttl_seconds),
        }
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Returns a usable token for `(owner, page)`.
    ///
    /// # Errors
    /// - `NotConnected` when the page has no credential document
    /// - `Decryption` when the document is legacy or corrupt (needs re-authentication)
    /// - `Expired` when the stored credential itself has expired
    /// - `Store` on backend failure (see [`CredentialError::is_quota_exceeded`])
    pub async fn get_token(&self, owner: &str, page: &str) -> Result<String, CredentialError> {
        let key = CacheKey::new(owner, page);
        let cached = self.entries.get(&key).map(|e| e.value().clone());

        if let Some(entry) = cached {
            match entry.freshness(Utc::now(), self.refresh_threshold) {
                Freshness::Fresh => return Ok(entry.token),
                Freshness::Stale => {
                    self.schedule_refresh(key);
                    return Ok(entry.token);
                }
                Freshness::Expired => {
                    debug!(owner = %owner, page = %page, "Cached token expired, refetching");
                }
            }
        }

        self.fetch(owner, page).await
    }

    /// Blocking fill: reads and decrypts the credential and replaces the entry.
    pub async fn fetch(&self, owner: &str, page: &str) -> Result<String, CredentialError> {
        let key = CacheKey::new(owner, page);
        let generation = self.generation(owner);

        let credentials = match self.store.open_page(owner, page).await {
            Ok(c) => c,
            Err(e) => {
                if e.needs_reauth() {
                    self.entries.remove(&key);
                }
                return Err(e);
            }
        };

        let entry = self.entry_for(credentials.access_token, credentials.expires_at);
        if entry.expires_at <= entry.cached_at {
            self.entries.remove(&key);
            return Err(CredentialError::Expired {
                owner: owner.to_string(),
                page: page.to_string(),
                expires_at: entry.expires_at,
            });
        }

        let token = entry.token.clone();
        let expires_at = entry.expires_at;
        if self.install(key, generation, entry, false) {
            debug!(owner = %owner, page = %page, expires_at = %expires_at, "Token cached");
        } else {
            debug!(owner = %owner, page = %page, "Evicted during read, result not cached");
        }
        Ok(token)
    }

    /// Current entry, if any, without triggering I/O.
    pub fn peek(&self, owner: &str, page: &str) -> Option<CacheEntry> {
        self.entries
            .get(&CacheKey::new(owner, page))
            .map(|e| e.value().clone())
    }

    /// Removes one entry. Returns whether it was present.
    pub fn evict(&self, owner: &str, page: &str) -> bool {
        self.bump_generation(owner);
        self.entries.remove(&CacheKey::new(owner, page)).is_some()
    }

    /// Removes every entry belonging to `owner`. Returns the number removed.
    pub fn evict_owner(&self, owner: &str) -> usize {
        self.bump_generation(owner);
        let before = self.entries.len();
        self.entries.retain(|key, _| key.owner != owner);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of background refreshes currently running.
    pub fn refreshes_in_flight(&self) -> usize {
        self.refreshing.len()
    }

    fn generation(&self, owner: &str) -> u64 {
        self.generations.get(owner).map_or(0, |g| *g)
    }

    fn bump_generation(&self, owner: &str) {
        *self.generations.entry(owner.to_string()).or_insert(0) += 1;
    }

    /// Stores `entry` unless the owner was evicted since `generation` was read.
    ///
    /// The generation shard stays locked until the entry is written, so an
    /// eviction either sees the entry and removes it or invalidates the write.
    fn install(&self, key: CacheKey, generation: u64, entry: CacheEntry, replace_only: bool) -> bool {
        let current = self.generations.entry(key.owner.clone()).or_insert(0);
        if *current != generation {
            return false;
        }

        if replace_only {
            match self.entries.get_mut(&key) {
                Some(mut slot) => *slot = entry,
                None => return false,
            }
        } else {
            self.entries.insert(key, entry);
        }
        true
    }

    fn entry_for(&self, token: String, expires_at: Option<DateTime<Utc>>) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            token,
            cached_at: now,
            expires_at: expires_at.unwrap_or(now + self.assumed_ttl),
        }
    }

    /// Fire-and-forget refresh. Failures are logged and leave the current
    /// entry in place; it keeps serving until it actually expires.
    fn schedule_refresh(&self, key: CacheKey) {
        if !self.refreshing.insert(key.clone()) {
            return;
        }

        let cache = self.clone();
        let generation = self.generation(&key.owner);
        tokio::spawn(async move {
            match cache.store.open_page(&key.owner, &key.page).await {
                Ok(credentials) => {
                    let entry = cache.entry_for(credentials.access_token, credentials.expires_at);
                    // Only replace: an entry evicted meanwhile (revocation) stays evicted.
                    if cache.install(key.clone(), generation, entry, true) {
                        debug!(owner = %key.owner, page = %key.page, "Background refresh complete");
                    }
                }
                Err(e) => {
                    warn!(
                        owner = %key.owner,
                        page = %key.page,
                        quota_exceeded = e.is_quota_exceeded(),
                        needs_reauth = e.needs_reauth(),
                        error = %e,
                        "Background token refresh failed"
                    );
                }
            }
            cache.refreshing.remove(&key);
        });
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}
