//! OAuth connect flow: the only place credentials are created.
//!
//! 1. Owner hits GET /meta/oauth/start → redirect to the platform dialog
//! 2. Platform redirects to GET /meta/oauth/callback?code&state
//! 3. Code → user token → long-lived user token → managed pages
//! 4. Platform credential and one credential per page are stored encrypted
//! 5. The owner's cache entries are evicted so the next read sees the new tokens

mod state_manager;

pub use state_manager::{run_state_cleanup, StateManager};

use super::{require_owner, AppError};
use crate::auth::IdentityProvider;
use crate::cache::TokenCache;
use crate::platform::{persist_grant, PlatformClient};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Json, Redirect},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared application state for OAuth API
#[derive(Clone)]
pub struct OAuthAppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub client: PlatformClient,
    pub cache: TokenCache,
    pub state_manager: StateManager,
    pub callback_base_url: String,
}

impl OAuthAppState {
    fn redirect_uri(&self) -> String {
        format!(
            "{}/meta/oauth/callback",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

/// Query string the platform appends to the redirect.
#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    /// Returns `(code, state)`, or the 400 to answer with when the owner
    /// declined or the redirect is incomplete.
    fn into_grant(self) -> Result<(String, String), AppError> {
        if let Some(error) = self.error {
            let description = self.error_description.unwrap_or_default();
            warn!(error = %error, description = %description, "Platform returned an authorization error");
            return Err(AppError::BadRequest(format!(
                "Authorization was not granted: {}",
                if description.is_empty() { &error } else { &description }
            )));
        }

        match (self.code, self.state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => Ok((code, state)),
            (code, _) => {
                let missing = if code.map_or(true, |c| c.is_empty()) { "code" } else { "state" };
                Err(AppError::BadRequest(format!("Missing '{}' parameter", missing)))
            }
        }
    }
}

#[derive(Serialize, Debug)]
struct ConnectResponse {
    success: bool,
    /// Number of pages stored
    pages: usize,
}

pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/meta/oauth/start", get(oauth_start))
        .route("/meta/oauth/callback", get(oauth_callback))
        .with_state(Arc::new(state))
}

/// GET /meta/oauth/start
///
/// Redirects the authenticated owner to the platform's authorization dialog
/// with a single-use CSRF state bound to the owner.
async fn oauth_start(
    State(state): State<Arc<OAuthAppState>>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    let owner = require_owner(state.identity.as_ref(), &headers)?;

    let csrf_state = state.state_manager.issue(&owner);
    let auth_url = state
        .client
        .authorization_url(&state.redirect_uri(), &csrf_state)
        .map_err(|e| {
            error!(error = %e, "Failed to build authorization URL");
            AppError::InternalServerError("Failed to start OAuth flow".to_string())
        })?;

    info!(owner = %owner, "Redirecting to platform authorization");
    Ok(Redirect::temporary(&auth_url))
}

/// GET /meta/oauth/callback
///
/// Exchanges the authorization code and stores the resulting credentials.
/// The owner comes from the validated state, not from request headers.
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ConnectResponse>, AppError> {
    let (code, csrf_state) = params.into_grant()?;

    let owner = state.state_manager.redeem(&csrf_state).ok_or_else(|| {
        warn!("Invalid or expired OAuth state");
        AppError::Unauthorized("Invalid or expired OAuth state".to_string())
    })?;

    debug!(owner = %owner, "CSRF state validated");

    let remote_failure = |step: &'static str| {
        let owner = owner.clone();
        move |e: anyhow::Error| {
            error!(owner = %owner, error = %e, "{} failed", step);
            AppError::BadGateway(format!("{} failed", step))
        }
    };

    let short_lived = state
        .client
        .exchange_code(&code, &state.redirect_uri())
        .await
        .map_err(remote_failure("Token exchange"))?;
    let user = state
        .client
        .exchange_long_lived(&short_lived.access_token)
        .await
        .map_err(remote_failure("Long-lived token exchange"))?;
    let pages = state
        .client
        .list_pages(&user.access_token)
        .await
        .map_err(remote_failure("Page listing"))?;

    let dropped = persist_grant(state.cache.credential_store(), &owner, &user, &pages)
        .await
        .map_err(|e| {
            error!(owner = %owner, error = %e, "Failed to store credentials");
            AppError::from_store(&e, "Failed to store credentials")
        })?;

    // Re-auth replaces documents wholesale; drop anything cached from before.
    state.cache.evict_owner(&owner);

    info!(
        owner = %owner,
        pages = pages.len(),
        dropped = dropped.len(),
        "OAuth flow completed successfully"
    );

    Ok(Json(ConnectResponse {
        success: true,
        pages: pages.len(),
    }))
}
