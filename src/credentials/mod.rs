//! Encrypted credential storage for connected pages.
//!
//! Page access tokens and the platform-level OAuth token are stored only as
//! AES-256-GCM triples inside documents of the durable store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - (owner, platform, page) → document    │
//! │  - Transparent encryption/decryption     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialVault                    │
//! │  - AES-256-GCM, detached tag             │
//! │  - Unique nonce per encryption           │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       DocumentStore                      │
//! │  - Encrypted documents at rest           │
//! │  - Atomic batch delete                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use pagevault::credentials::{CredentialStore, CredentialVault, Credentials};
//! use pagevault::store::SqliteDocumentStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let vault = CredentialVault::from_base64(&std::env::var("PAGEVAULT_ENCRYPTION_KEY")?)?;
//! let documents = Arc::new(SqliteDocumentStore::new("pagevault.db")?);
//! let store = CredentialStore::new(documents, vault, "meta");
//!
//! store
//!     .store_page("owner-1", "1122334455", &Credentials::new("EAAG...", Some("My Page"), None))
//!     .await?;
//! let creds = store.open_page("owner-1", "1122334455").await?;
//! println!("page token expires at {:?}", creds.expires_at);
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Documents never contain plaintext tokens
//! - A document without `authTag` was written by the legacy tag-less scheme
//!   and is reported as unreadable, never decrypted
//! - Documents are replaced whole; no field is ever patched in place

use crate::quota;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod encryption;
mod storage;

pub use encryption::{decrypt, encrypt, validate_key, CredentialVault, EncryptedSecret, VaultError};
pub use storage::{CredentialStore, PageSummary};

/// Decrypted credential for one page or for the platform-level grant.
///
/// Never persisted in this form.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub access_token: String,

    /// Display name of the page (absent for the platform credential)
    pub name: Option<String>,

    pub issued_at: DateTime<Utc>,

    /// Platform-reported expiry; `None` when the platform did not report one
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        name: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            name: name.map(str::to_string),
            issued_at: Utc::now(),
            expires_at,
        }
    }
}

/// Persisted form of a credential.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDocument {
    pub encrypted_blob: String,

    #[serde(default)]
    pub nonce: String,

    /// Missing on records written by the legacy unauthenticated scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialDocument {
    pub fn is_legacy(&self) -> bool {
        self.auth_tag.as_deref().map_or(true, str::is_empty)
    }
}

/// Errors returned when resolving a usable token.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential document exists for the page.
    #[error("page '{page}' is not connected for owner '{owner}'")]
    NotConnected { owner: String, page: String },

    /// The document exists but cannot be decrypted (legacy or corrupt record).
    #[error("credential for page '{page}' is unreadable and needs re-authentication")]
    Decryption {
        owner: String,
        page: String,
        #[source]
        source: VaultError,
    },

    /// The platform-reported expiry has already passed.
    #[error("credential for page '{page}' expired at {expires_at}")]
    Expired {
        owner: String,
        page: String,
        expires_at: DateTime<Utc>,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CredentialError {
    /// True when the only remedy is for the owner to connect the page again.
    pub fn needs_reauth(&self) -> bool {
        !matches!(self, CredentialError::Store(_))
    }

    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            CredentialError::Store(e) => quota::classify(e).quota_exceeded,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use serde_json::json;

    #[test]
    fn test_document_wire_shape() {
        let doc = CredentialDocument {
            encrypted_blob: "YmxvYg==".to_string(),
            nonce: "bm9uY2U=".to_string(),
            auth_tag: Some("dGFn".to_string()),
            name: Some("Corner Bakery".to_string()),
            issued_at: None,
            expires_at: None,
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "encryptedBlob": "YmxvYg==",
                "nonce": "bm9uY2U=",
                "authTag": "dGFn",
                "name": "Corner Bakery"
            })
        );
        assert!(!doc.is_legacy());
    }

    #[test]
    fn test_legacy_document_without_tag() {
        let doc: CredentialDocument =
            serde_json::from_value(json!({"encryptedBlob": "abc", "iv": "xyz", "name": "Old"})).unwrap();
        assert!(doc.is_legacy());
        assert_eq!(doc.nonce, "");

        let doc: CredentialDocument =
            serde_json::from_value(json!({"encryptedBlob": "abc", "nonce": "n", "authTag": ""})).unwrap();
        assert!(doc.is_legacy());
    }

    #[test]
    fn test_error_classification() {
        let not_connected = CredentialError::NotConnected {
            owner: "o".to_string(),
            page: "p".to_string(),
        };
        assert!(not_connected.needs_reauth());
        assert!(!not_connected.is_quota_exceeded());

        let quota: CredentialError =
            anyhow::Error::from(StoreError::ResourceExhausted("limit".to_string())).into();
        assert!(!quota.needs_reauth());
        assert!(quota.is_quota_exceeded());
    }
}
