//! Connected page status.
//!
//! Status comes from the token cache, so a page whose credential is legacy,
//! corrupt or gone is reported as needing re-authentication.

use super::{require_owner, AppError, CredentialAppState};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Page status summary
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PageStatus {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// "connected" | "needs_reauth" | "error"
    pub status: String,
}

/// List pages response
#[derive(Serialize, Debug)]
pub struct ListPagesResponse {
    pub pages: Vec<PageStatus>,
}

pub fn create_pages_router(state: CredentialAppState) -> Router {
    Router::new()
        .route("/meta/pages", get(list_pages))
        .with_state(Arc::new(state))
}

/// GET /meta/pages - List the owner's pages with credential status
async fn list_pages(
    State(state): State<Arc<CredentialAppState>>,
    headers: HeaderMap,
) -> Result<Json<ListPagesResponse>, AppError> {
    let owner = require_owner(state.identity.as_ref(), &headers)?;

    let pages = state
        .cache
        .credential_store()
        .list_pages(&owner)
        .await
        .map_err(|e| {
            error!(owner = %owner, error = %e, "Failed to list pages");
            AppError::from_store(&e, "Failed to list pages")
        })?;

    debug!(owner = %owner, count = pages.len(), "Listing page status");

    let mut statuses = Vec::with_capacity(pages.len());
    for page in pages {
        let status = match state.cache.get_token(&owner, &page.id).await {
            Ok(_) => "connected",
            Err(e) if e.needs_reauth() => "needs_reauth",
            Err(e) => {
                warn!(owner = %owner, page = %page.id, error = %e, "Page status unavailable");
                "error"
            }
        };
        statuses.push(PageStatus {
            id: page.id,
            name: page.name,
            status: status.to_string(),
        });
    }

    Ok(Json(ListPagesResponse { pages: statuses }))
}
