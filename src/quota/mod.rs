//! Quota-aware classification of document store failures.
//!
//! Store errors arrive as `anyhow` chains. A chain is a quota failure when it
//! carries [`StoreError::ResourceExhausted`] anywhere, or when any layer's
//! message has a resource-exhaustion signature (hosted backends report it as
//! text, e.g. `8 RESOURCE_EXHAUSTED: Quota exceeded.`).

use crate::store::StoreError;
use std::error::Error as StdError;

/// Message returned to HTTP callers when the store quota is exhausted.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "Service quota exceeded. Please try again later.";

/// Lower-cased substrings that identify a resource-exhaustion error.
const EXHAUSTION_SIGNATURES: &[&str] = &[
    "resource_exhausted",
    "resource-exhausted",
    "resource exhausted",
    "quota exceeded",
];

/// Result of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub quota_exceeded: bool,
}

/// Classifies an `anyhow` error by walking its whole context chain.
pub fn classify(error: &anyhow::Error) -> Classification {
    Classification {
        quota_exceeded: error.chain().any(is_exhaustion),
    }
}

/// Classifies a plain error and its `source()` chain.
pub fn classify_error(error: &(dyn StdError + 'static)) -> Classification {
    let mut current = Some(error);
    while let Some(err) = current {
        if is_exhaustion(err) {
            return Classification {
                quota_exceeded: true,
            };
        }
        current = err.source();
    }
    Classification::default()
}

fn is_exhaustion(err: &(dyn StdError + 'static)) -> bool {
    if let Some(store_err) = err.downcast_ref::<StoreError>() {
        return matches!(store_err, StoreError::ResourceExhausted(_));
    }
    let message = err.to_string().to_lowercase();
    EXHAUSTION_SIGNATURES.iter().any(|sig| message.contains(sig))
}
