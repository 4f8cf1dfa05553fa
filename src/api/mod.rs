// HTTP surface for the credential subsystem

pub mod bootstrap;
pub mod disconnect;
pub mod oauth;
pub mod pages;

pub use bootstrap::create_bootstrap_router;
pub use disconnect::create_disconnect_router;
pub use oauth::{create_oauth_router, run_state_cleanup, OAuthAppState, StateManager};
pub use pages::create_pages_router;

use crate::auth::IdentityProvider;
use crate::cache::TokenCache;
use crate::quota::{self, QUOTA_EXCEEDED_MESSAGE};
use crate::revocation::Revocation;
use crate::warmer::BulkWarmer;
use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Seconds a client should wait before retrying after quota exhaustion
const RETRY_AFTER_SECONDS: &str = "60";

/// Shared application state for the credential endpoints
#[derive(Clone)]
pub struct CredentialAppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub cache: TokenCache,
    pub warmer: Arc<BulkWarmer>,
    pub revocation: Arc<Revocation>,
}

/// Bootstrap, page listing and disconnect routes on one router
pub fn create_router(state: CredentialAppState) -> Router {
    create_bootstrap_router(state.clone())
        .merge(create_pages_router(state.clone()))
        .merge(create_disconnect_router(state))
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    BadRequest(String),
    /// Store quota exhausted; retryable
    ServiceUnavailable(String),
    InternalServerError(String),
    BadGateway(String),
}

impl AppError {
    /// Maps a store failure: quota exhaustion becomes a retryable 503, anything
    /// else a 500 carrying `message`.
    pub fn from_store(error: &anyhow::Error, message: &str) -> Self {
        if quota::classify(error).quota_exceeded {
            AppError::ServiceUnavailable(QUOTA_EXCEEDED_MESSAGE.to_string())
        } else {
            AppError::InternalServerError(message.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: error_message,
            }),
        )
            .into_response();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
        }
        response
    }
}

/// Resolves the authenticated owner or fails with 401.
pub(crate) fn require_owner(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> Result<String, AppError> {
    identity
        .resolve(headers)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
}
