//! Revocation endpoints.

use super::{require_owner, AppError, CredentialAppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Response for POST /meta/disconnect
#[derive(Serialize, Debug)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// Response for POST /meta/pages/:id/disconnect
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectPageResponse {
    pub success: bool,
    pub page_id: String,
}

pub fn create_disconnect_router(state: CredentialAppState) -> Router {
    Router::new()
        .route("/meta/disconnect", post(disconnect_platform))
        .route("/meta/pages/:id/disconnect", post(disconnect_page))
        .with_state(Arc::new(state))
}

/// POST /meta/disconnect - Remove the platform grant and every page credential
async fn disconnect_platform(
    State(state): State<Arc<CredentialAppState>>,
    headers: HeaderMap,
) -> Result<Json<DisconnectResponse>, AppError> {
    let owner = require_owner(state.identity.as_ref(), &headers)?;

    state
        .revocation
        .disconnect_platform(&owner)
        .await
        .map_err(|e| {
            error!(owner = %owner, error = %e, "Failed to disconnect platform");
            AppError::from_store(&e, "Failed to disconnect")
        })?;

    Ok(Json(DisconnectResponse { success: true }))
}

/// POST /meta/pages/:id/disconnect - Remove one page credential
///
/// Disconnecting a page that is already gone still succeeds.
async fn disconnect_page(
    State(state): State<Arc<CredentialAppState>>,
    headers: HeaderMap,
    Path(page_id): Path<String>,
) -> Result<Json<DisconnectPageResponse>, AppError> {
    let owner = require_owner(state.identity.as_ref(), &headers)?;

    let page_id = page_id.trim().to_string();
    if page_id.is_empty() {
        return Err(AppError::BadRequest("Missing pageId".to_string()));
    }

    state
        .revocation
        .disconnect_page(&owner, &page_id)
        .await
        .map_err(|e| {
            error!(owner = %owner, page = %page_id, error = %e, "Failed to disconnect page");
            AppError::from_store(&e, "Failed to disconnect page")
        })?;

    Ok(Json(DisconnectPageResponse {
        success: true,
        page_id,
    }))
}
