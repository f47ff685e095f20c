//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, logout and session lookup.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use planning_core::domain::{AuthSession, User};
use planning_core::ports::PortError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::web::json_payload;
use crate::web::middleware::{session_token, SESSION_COOKIE};
use crate::web::state::{AppState, MaybeUser};

const MIN_PASSWORD_LENGTH: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UserData {
    pub user: UserResponse,
}

/// `{data: {user}}`
#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub data: UserData,
}

impl AuthResponse {
    fn new(user: User) -> Self {
        Self { data: UserData { user: user.into() } }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn session_cookie(state: &AppState, token: &str, max_age_secs: i64) -> String {
    let secure = if state.config.secure_cookies { " Secure;" } else { "" };
    format!(
        "{}={}; HttpOnly;{} SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, secure, max_age_secs
    )
}

/// Issues a new auth session for `user` and returns its cookie.
async fn start_session(state: &AppState, user: &User) -> ApiResult<String> {
    let ttl = Duration::days(state.config.session_ttl_days);
    let session = AuthSession {
        token: Uuid::new_v4().to_string(),
        user_id: user.id,
        expires_at: Utc::now() + ttl,
    };
    let cookie = session_cookie(state, &session.token, ttl.num_seconds());

    state.db.create_auth_session(session).await.map_err(|e| {
        error!("Failed to create auth session: {:?}", e);
        ApiError::server("Server error", "Failed to create session")
    })?;
    Ok(cookie)
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut details = Map::new();
    if !req.email.contains('@') {
        details.insert("email".into(), json!("A valid email address is required"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LENGTH {
        details.insert(
            "password".into(),
            json!(format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH)),
        );
    }
    if req.name.trim().is_empty() {
        details.insert("name".into(), json!("Name is required"));
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation_with("Invalid registration data", Value::Object(details)))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new user account and sign it in
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid data or email already registered", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = json_payload(payload)?;
    validate_registration(&req)?;

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::server("Server error", "Failed to create user")
        })?
        .to_string();

    // 2. Create user in database
    let user = state
        .db
        .create_user(&normalize_email(&req.email), req.name.trim(), &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => ApiError::validation("User with this email already exists"),
            other => {
                error!("Failed to create user: {:?}", other);
                ApiError::server("Server error", "Failed to create user")
            }
        })?;

    // 3. Start a session and return the cookie
    let cookie = start_session(&state, &user).await?;
    info!(user_id = %user.id, "Registered new user.");

    Ok(([(header::SET_COOKIE, cookie)], Json(AuthResponse::new(user))))
}

/// POST /api/auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing email or password", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = json_payload(payload)?;
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    // 1. Get user by email
    let credentials = match state.db.get_user_by_email(&normalize_email(&req.email)).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => return Err(invalid()),
        Err(e) => {
            error!("Failed to get user: {:?}", e);
            return Err(ApiError::server("Server error", "Failed to sign in"));
        }
    };

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&credentials.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::AuthenticationFailed
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    // 3. Start a session and return the cookie
    let cookie = start_session(&state, &credentials.user).await?;
    Ok(([(header::SET_COOKIE, cookie)], Json(AuthResponse::new(credentials.user))))
}

/// POST /api/auth/logout - Invalidate the current session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = LogoutResponse),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    if let Some(token) = session_token(&headers) {
        state.db.delete_auth_session(&token).await.map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            ApiError::server("Server error", "Failed to logout")
        })?;
    }

    let cookie = session_cookie(&state, "", 0);
    Ok(([(header::SET_COOKIE, cookie)], Json(LogoutResponse { success: true })))
}

/// GET /api/auth/session - The user behind the current session
#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Active session", body = AuthResponse),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn session_handler(MaybeUser(user): MaybeUser) -> ApiResult<Json<AuthResponse>> {
    let user = user.ok_or_else(|| ApiError::Unauthorized("No active session".to_string()))?;
    Ok(Json(AuthResponse::new(user.0)))
}
