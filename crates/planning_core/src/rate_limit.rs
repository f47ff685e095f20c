//! crates/planning_core/src/rate_limit.rs
//!
//! Fixed-window request counting for the expensive AI-backed endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ports::{PortError, PortResult, RateLimitEntry, RateLimitStore};

pub const DEFAULT_LIMIT: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
    pub endpoint_patterns: Vec<Regex>,
}

impl RateLimitConfig {
    /// Quota for the question and PRD generation endpoints.
    pub fn generation_endpoints(limit: u32, window: Duration) -> Result<Self, regex::Error> {
        Ok(Self {
            limit,
            window,
            endpoint_patterns: vec![
                Regex::new(r"^/api/projects/[^/]+/generate-questions/?$")?,
                Regex::new(r"^/api/projects/[^/]+/generate-prd/?$")?,
            ],
        })
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.endpoint_patterns.iter().any(|pattern| pattern.is_match(path))
    }
}

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitKey {
    User(Uuid),
    Origin(IpAddr),
    Anonymous,
}

impl RateLimitKey {
    pub fn resolve(user_id: Option<Uuid>, origin: Option<IpAddr>) -> Self {
        match (user_id, origin) {
            (Some(id), _) => RateLimitKey::User(id),
            (None, Some(ip)) => RateLimitKey::Origin(ip),
            (None, None) => RateLimitKey::Anonymous,
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::User(id) => write!(f, "user:{}", id),
            RateLimitKey::Origin(ip) => write!(f, "ip:{}", ip),
            RateLimitKey::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// The outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets, at least 1.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn reset_epoch_secs(&self) -> i64 {
        self.reset_at.timestamp()
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check(&self, key: &RateLimitKey, now: DateTime<Utc>) -> PortResult<RateLimitDecision> {
        let entry = self
            .store
            .increment(&key.to_string(), self.config.window, now)
            .await?;
        Ok(decide(self.config.limit, entry, now))
    }
}

fn decide(limit: u32, entry: RateLimitEntry, now: DateTime<Utc>) -> RateLimitDecision {
    let millis_left = (entry.reset_at - now).num_milliseconds().max(0) as u64;
    let retry_after_secs = millis_left.div_ceil(1000).max(1);
    RateLimitDecision {
        allowed: entry.count <= limit,
        limit,
        remaining: limit.saturating_sub(entry.count),
        reset_at: entry.reset_at,
        retry_after_secs,
    }
}

//=========================================================================================
// In-memory store (single instance only)
//=========================================================================================

/// Process-local counters. Lost on restart and not shared between instances.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> PortResult<RateLimitEntry> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| PortError::Unexpected(format!("invalid rate limit window: {}", e)))?;

        let mut entries = self.entries.lock().await;
        // Expired windows are swept lazily on every write.
        entries.retain(|_, entry| entry.reset_at >= now);

        let entry = entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            reset_at: now + window,
        });
        entry.count += 1;
        Ok(*entry)
    }
}
