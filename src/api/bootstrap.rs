//! Cache warm-up endpoint.

use super::{require_owner, AppError, CredentialAppState};
use crate::quota;
use crate::warmer::WarmResult;
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub fn create_bootstrap_router(state: CredentialAppState) -> Router {
    Router::new()
        .route("/bootstrap", post(bootstrap))
        .with_state(Arc::new(state))
}

/// POST /bootstrap - Warm the cache for every page of the authenticated owner
///
/// Partial failure is still a 200: failed pages are listed in `failedPages`.
/// Only a failure of the page listing itself is an error (503 on quota
/// exhaustion, 500 otherwise).
async fn bootstrap(
    State(state): State<Arc<CredentialAppState>>,
    headers: HeaderMap,
) -> Result<Json<WarmResult>, AppError> {
    let owner = require_owner(state.identity.as_ref(), &headers)?;

    info!(owner = %owner, "Bootstrap requested");

    let result = state.warmer.warm_all(&owner).await.map_err(|e| {
        if quota::classify(&e).quota_exceeded {
            warn!(owner = %owner, error = %e, "Store quota exceeded while listing pages");
        } else {
            error!(owner = %owner, error = %e, "Failed to list pages for bootstrap");
        }
        AppError::from_store(&e, "Failed to warm page tokens")
    })?;

    Ok(Json(result))
}
