use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use spotcheck_core::TrustConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub trust: TrustConfig,
    pub rate_limit_window: Duration,
    pub register_rate_limit_per_window: u32,
    pub validate_rate_limit_per_window: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SPOTCHECK_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            PathBuf::from(value_or_default(&lookup, "SPOTCHECK_DATABASE_PATH", "spotcheck.db"));

        let trust = parse_trust_config(&lookup)?;

        let rate_limit_window_secs =
            parse_in_range(&lookup, "RATE_LIMIT_WINDOW_SECS", 60_u64, 10..=3_600)?;
        let register_rate_limit_per_window =
            parse_in_range(&lookup, "REGISTER_RATE_LIMIT_PER_WINDOW", 10_u32, 1..=1_000)?;
        let validate_rate_limit_per_window =
            parse_in_range(&lookup, "VALIDATE_RATE_LIMIT_PER_WINDOW", 30_u32, 1..=5_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            trust,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            register_rate_limit_per_window,
            validate_rate_limit_per_window,
        })
    }
}

/// Start from `SPOTCHECK_TRUST_CONFIG` (inline JSON) if set, then apply the
/// individual overrides.
fn parse_trust_config(lookup: impl Fn(&str) -> Option<String>) -> Result<TrustConfig, ConfigError> {
    let mut trust = match optional_trimmed(&lookup, "SPOTCHECK_TRUST_CONFIG") {
        Some(json) => TrustConfig::from_json(&json).map_err(|error| {
            ConfigError::Invalid(format!("SPOTCHECK_TRUST_CONFIG: {error}"))
        })?,
        None => TrustConfig::default(),
    };

    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_DEDUP_RADIUS_KM")? {
        trust.dedup.radius_km = value;
    }
    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_BLOCK_THRESHOLD")? {
        trust.dedup.block_threshold = value;
    }
    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_ACCEPTANCE_RADIUS_M")? {
        trust.proximity.acceptance_radius_m = value;
    }
    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_REVIEW_THRESHOLD")? {
        trust.stages.review_threshold = value;
    }
    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_VERIFIED_SCORE_FLOOR")? {
        trust.stages.verified_score_floor = value;
    }
    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_LEGENDARY_THRESHOLD")? {
        trust.stages.legendary_threshold = value;
    }
    if let Some(value) = parse_optional(&lookup, "SPOTCHECK_LEGENDARY_SCORE_FLOOR")? {
        trust.stages.legendary_score_floor = value;
    }

    trust
        .validate()
        .map_err(|error| ConfigError::Invalid(error.to_string()))?;
    Ok(trust)
}

fn parse_in_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display,
{
    let value = parse_optional(lookup, name)?.unwrap_or(default);
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn parse_optional<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    optional_trimmed(lookup, name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid(format!("{name} is not a valid number")))
        })
        .transpose()
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
