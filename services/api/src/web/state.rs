//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request identity
//! attached by the session guard.

use crate::config::Config;
use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use planning_core::completion::CompletionService;
use planning_core::domain::User;
use planning_core::ports::DatabaseService;
use planning_core::rate_limit::RateLimiter;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub completion: Arc<dyn CompletionService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    /// The LLM credential, `None` when the provider is not configured.
    pub fn credential(&self) -> Option<&str> {
        self.config.open_router_key.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.config.ai_model
    }
}

//=========================================================================================
// CurrentUser (Specific to One Request)
//=========================================================================================

/// The authenticated caller, inserted into request extensions by the guard.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> uuid::Uuid {
        self.0.id
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}

/// The caller on routes that are reachable without a session.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<CurrentUser>().cloned()))
    }
}
