//! Durable document store abstraction.
//!
//! Credentials live as opaque JSON documents under an owner-scoped
//! hierarchical path:
//!
//! ```text
//! users/{owner}/integrations/{platform}              platform OAuth credential
//! users/{owner}/integrations/{platform}/pages/{page} one document per page
//! ```
//!
//! The cache and the revocation flow only talk to [`DocumentStore`]; the
//! concrete backend is chosen in `main`.

mod rate_limited;
mod sqlite;

pub use rate_limited::RateLimitedStore;
pub use sqlite::SqliteDocumentStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised by store backends themselves (as opposed to plumbing errors
/// wrapped in `anyhow` context).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend's request-rate or resource ceiling was exceeded.
    #[error("RESOURCE_EXHAUSTED: {0}")]
    ResourceExhausted(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Slash-separated document path. Every segment is percent-encoded, so ids
/// containing `/` cannot escape their collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let encoded: Vec<String> = segments
            .iter()
            .map(|s| urlencoding::encode(s.as_ref()).into_owned())
            .collect();
        Self(encoded.join("/"))
    }

    /// Wraps an already-encoded path as read back from a backend.
    pub fn from_encoded(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Appends one (unencoded) segment.
    pub fn child(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            return Self(urlencoding::encode(segment).into_owned());
        }
        Self(format!("{}/{}", self.0, urlencoding::encode(segment)))
    }

    /// The containing collection, or `None` for a top-level path.
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('/').map(|(parent, _)| Self(parent.to_string()))
    }

    /// Decoded last segment.
    pub fn id(&self) -> String {
        let last = self.0.rsplit('/').next().unwrap_or_default();
        urlencoding::decode(last)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| last.to_string())
    }

    /// Decoded owner id for paths under `users/{owner}`.
    pub fn owner(&self) -> Option<String> {
        let mut segments = self.0.split('/');
        match (segments.next(), segments.next()) {
            (Some("users"), Some(owner)) => urlencoding::decode(owner).ok().map(|s| s.into_owned()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document returned by a collection listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Decoded id (last path segment)
    pub id: String,
    pub data: Value,
}

/// Document store contract consumed by the credential subsystem.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document. `Ok(None)` when absent.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>>;

    /// Writes a document, fully replacing any previous version.
    async fn put(&self, path: &DocumentPath, data: Value) -> Result<()>;

    /// Deletes one document. Deleting an absent document succeeds.
    async fn delete(&self, path: &DocumentPath) -> Result<()>;

    /// Lists the direct children of a collection, ordered by id.
    async fn list_children(&self, collection: &DocumentPath) -> Result<Vec<Document>>;

    /// Deletes every path or none of them.
    async fn batch_delete(&self, paths: &[DocumentPath]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments_are_encoded() {
        let path = DocumentPath::from_segments(&["users", "owner/1", "integrations"]);
        assert_eq!(path.as_str(), "users/owner%2F1/integrations");
        assert_eq!(path.owner(), Some("owner/1".to_string()));
    }

    #[test]
    fn test_child_parent_and_id() {
        let pages = DocumentPath::from_segments(&["users", "u1", "integrations", "meta", "pages"]);
        let page = pages.child("1234 5");

        assert_eq!(page.id(), "1234 5");
        assert_eq!(page.parent(), Some(pages));
    }

    #[test]
    fn test_owner_requires_users_root() {
        let path = DocumentPath::from_segments(&["tenants", "u1"]);
        assert_eq!(path.owner(), None);
        assert_eq!(DocumentPath::from_segments(&["users"]).owner(), None);
    }
}
