use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::auth::user_fingerprint;
use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window limiter keyed by endpoint and user.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    register_limit: u32,
    validate_limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Clone, Copy)]
pub enum ProtectedEndpoint {
    /// Registration and evidence uploads
    Register,
    Validate,
}

#[derive(Default)]
struct RateLimitMetrics {
    register_allowed: AtomicU64,
    register_limited: AtomicU64,
    validate_allowed: AtomicU64,
    validate_limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub register_allowed: u64,
    pub register_limited: u64,
    pub validate_allowed: u64,
    pub validate_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.register_rate_limit_per_window,
            config.validate_rate_limit_per_window,
        )
    }

    fn new(window: Duration, register_limit: u32, validate_limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            register_limit,
            validate_limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let limit = match endpoint {
            ProtectedEndpoint::Register => self.register_limit,
            ProtectedEndpoint::Validate => self.validate_limit,
        };

        let key = format!("{}:{user_id}", endpoint.label());
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        guard.retain(|_, window| now.duration_since(window.started_at) < self.window);
        let entry = guard.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs();
            self.mark(endpoint, false);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                format!("Rate limit exceeded for {}", endpoint.label()),
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.mark(endpoint, true);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            register_allowed: self.metrics.register_allowed.load(Ordering::Relaxed),
            register_limited: self.metrics.register_limited.load(Ordering::Relaxed),
            validate_allowed: self.metrics.validate_allowed.load(Ordering::Relaxed),
            validate_limited: self.metrics.validate_limited.load(Ordering::Relaxed),
        }
    }

    fn mark(&self, endpoint: ProtectedEndpoint, allowed: bool) {
        let counter = match (endpoint, allowed) {
            (ProtectedEndpoint::Register, true) => &self.metrics.register_allowed,
            (ProtectedEndpoint::Register, false) => &self.metrics.register_limited,
            (ProtectedEndpoint::Validate, true) => &self.metrics.validate_allowed,
            (ProtectedEndpoint::Validate, false) => &self.metrics.validate_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Validate => "validate",
        }
    }
}
