//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use planning_core::rate_limit::DEFAULT_LIMIT;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// Ten years; keeps `Utc::now() + ttl` well inside chrono's range.
const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub open_router_key: Option<String>,
    pub open_router_base_url: String,
    pub ai_model: String,
    pub ai_timeout: Duration,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub cors_origin: String,
    pub session_ttl_days: i64,
    pub secure_cookies: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- LLM Provider (the key is optional) ---
        let open_router_key = lookup("OPEN_ROUTER_KEY").filter(|key| !key.trim().is_empty());
        let open_router_base_url = lookup("OPEN_ROUTER_BASE_URL")
            .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let ai_model =
            lookup("AI_MODEL").unwrap_or_else(|| "meta-llama/llama-4-scout:free".to_string());
        let ai_timeout = Duration::from_millis(parse_number(&lookup, "AI_TIMEOUT_MS", 30_000)?);

        // --- Rate Limiting ---
        let rate_limit_requests = parse_number(&lookup, "RATE_LIMIT_REQUESTS", DEFAULT_LIMIT)?;
        let rate_limit_window =
            Duration::from_millis(parse_number(&lookup, "RATE_LIMIT_WINDOW_MS", 60_000)?);
        if rate_limit_window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_WINDOW_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // --- Browser-facing Settings ---
        let cors_origin = lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:4321".to_string());
        let session_ttl_days = parse_number(&lookup, "SESSION_TTL_DAYS", 30)?;
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&session_ttl_days) {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                format!("must be between 1 and {}", MAX_SESSION_TTL_DAYS),
            ));
        }
        let secure_cookies = match lookup("SECURE_COOKIES").as_deref() {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "SECURE_COOKIES".to_string(),
                    format!("'{}' is not a boolean", other),
                ))
            }
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            open_router_key,
            open_router_base_url,
            ai_model,
            ai_timeout,
            rate_limit_requests,
            rate_limit_window,
            cors_origin,
            session_ttl_days,
            secure_cookies,
        })
    }
}

fn parse_number<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
