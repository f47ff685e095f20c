//! services/api/src/web/middleware.rs
//!
//! The session and ownership guard that runs in front of every route.
//!
//! On every request the session is resolved from the `session` cookie (or an
//! `Authorization: Bearer` header). Pages redirect, API routes reject, and any
//! request under `/api/projects/{id}` must come from the project's owner.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::{AppState, CurrentUser};

pub const SESSION_COOKIE: &str = "session";

/// The segment of the project listing path that is not a project id.
const LISTING_SEGMENT: &str = "index";

//=========================================================================================
// Pure Routing Policy
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// `/login` and `/register`.
    AuthPage,
    /// `/api/auth/*`, reachable without a session.
    AuthApi,
    Api,
    Page,
}

pub fn classify(path: &str) -> PathKind {
    if path == "/api/auth" || path.starts_with("/api/auth/") {
        PathKind::AuthApi
    } else if path == "/api" || path.starts_with("/api/") {
        PathKind::Api
    } else if matches!(path.trim_end_matches('/'), "/login" | "/register") {
        PathKind::AuthPage
    } else {
        PathKind::Page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    Continue,
    Redirect(&'static str),
    Unauthorized,
}

pub fn session_decision(kind: PathKind, authenticated: bool) -> SessionDecision {
    match (kind, authenticated) {
        (PathKind::AuthPage, true) => SessionDecision::Redirect("/"),
        (PathKind::Page, false) => SessionDecision::Redirect("/login"),
        (PathKind::Api, false) => SessionDecision::Unauthorized,
        _ => SessionDecision::Continue,
    }
}

/// The raw `{id}` of a project-scoped path, unless it is the listing segment.
pub fn project_id_segment(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/api/projects/")?;
    let id = rest.split('/').next().unwrap_or_default();
    if id.is_empty() || id == LISTING_SEGMENT {
        None
    } else {
        Some(id)
    }
}

/// Reads the session token from the cookie, falling back to a bearer token.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        });

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

//=========================================================================================
// The Middleware
//=========================================================================================

/// Middleware that resolves the session, applies the routing policy and checks
/// project ownership. On success the `CurrentUser` is inserted into request
/// extensions for the rate limiter and handlers to use.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();

    // 1. Resolve the session
    let user = match session_token(req.headers()) {
        Some(token) => state
            .db
            .find_user_by_session(&token, Utc::now())
            .await
            .map_err(|e| {
                error!("Failed to validate auth session: {:?}", e);
                ApiError::AuthenticationFailed
            })?,
        None => None,
    };

    // 2. Apply the routing policy
    match session_decision(classify(&path), user.is_some()) {
        SessionDecision::Continue => {}
        SessionDecision::Redirect(target) => return Ok(Redirect::to(target).into_response()),
        SessionDecision::Unauthorized => {
            return Err(ApiError::Unauthorized("Authentication required".to_string()))
        }
    }

    // 3. Check project ownership
    if let Some(raw_id) = project_id_segment(&path) {
        let project_id =
            Uuid::parse_str(raw_id).map_err(|_| ApiError::validation("Invalid project ID"))?;
        let owner = state.db.get_project_owner(project_id).await.map_err(|e| {
            error!("Failed to look up owner of project {}: {:?}", project_id, e);
            ApiError::server("Server error", "Failed to verify project ownership")
        })?;

        match owner {
            None => return Err(ApiError::NotFound("Project not found".to_string())),
            Some(owner_id) if Some(owner_id) != user.as_ref().map(|u| u.id) => {
                return Err(ApiError::Forbidden(
                    "You do not have access to this project".to_string(),
                ))
            }
            Some(_) => {}
        }
    }

    // 4. Attach the caller and continue to the handler
    if let Some(user) = user {
        req.extensions_mut().insert(CurrentUser(user));
    }
    Ok(next.run(req).await)
}
