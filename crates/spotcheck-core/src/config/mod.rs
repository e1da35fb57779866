//! Tunable trust parameters.
//!
//! Every threshold the engine uses lives here so it can be tuned and tested
//! without touching call sites. Defaults are product starting points.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Duplicate Guard parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupPolicy {
    /// Radius checked around a candidate registration.
    pub radius_km: f64,
    /// Matches at or above this count make a registration ambiguous.
    pub warn_threshold: usize,
    /// Matches at or above this count block the registration outright.
    pub block_threshold: usize,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            radius_km: 0.5,
            warn_threshold: 1,
            block_threshold: 5,
        }
    }
}

/// Confidence Scorer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringPolicy {
    pub base_score: u8,
    /// Points awarded by the first validation.
    pub first_validation_points: f64,
    /// Each further validation is worth this fraction of the previous one.
    pub validation_decay: f64,
    pub live_capture_points: f64,
    pub uploaded_file_points: f64,
    /// Per provenance, items beyond this count add nothing.
    pub max_counted_evidence: usize,
    /// One point per full week since creation, up to this cap.
    pub max_age_points: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_score: 10,
            first_validation_points: 20.0,
            validation_decay: 0.8,
            live_capture_points: 6.0,
            uploaded_file_points: 2.0,
            max_counted_evidence: 3,
            max_age_points: 5,
        }
    }
}

/// Stage Machine thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagePolicy {
    /// Validations needed before a location can become verified.
    pub review_threshold: u32,
    pub verified_score_floor: u8,
    pub legendary_threshold: u32,
    pub legendary_score_floor: u8,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            review_threshold: 3,
            verified_score_floor: 50,
            legendary_threshold: 10,
            legendary_score_floor: 85,
        }
    }
}

/// Proximity Validator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProximityPolicy {
    /// Maximum distance between validator and location.
    pub acceptance_radius_m: f64,
    /// Whether creators may corroborate their own locations.
    pub allow_self_validation: bool,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self {
            acceptance_radius_m: 100.0,
            allow_self_validation: false,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustConfig {
    pub dedup: DedupPolicy,
    pub scoring: ScoringPolicy,
    pub stages: StagePolicy,
    pub proximity: ProximityPolicy,
    /// Upper bound on radius for nearby-location reads.
    pub max_query_radius_km: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::default(),
            scoring: ScoringPolicy::default(),
            stages: StagePolicy::default(),
            proximity: ProximityPolicy::default(),
            max_query_radius_km: 50.0,
        }
    }
}

impl TrustConfig {
    /// Parse and validate a JSON config document. Missing fields take defaults.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that thresholds are internally consistent.
    pub fn validate(&self) -> Result<()> {
        let dedup = &self.dedup;
        if !is_positive(dedup.radius_km) {
            return Err(invalid("dedup.radius_km must be a positive number"));
        }
        if dedup.warn_threshold < 1 {
            return Err(invalid("dedup.warn_threshold must be >= 1"));
        }
        if dedup.block_threshold <= dedup.warn_threshold {
            return Err(invalid(
                "dedup.block_threshold must be greater than dedup.warn_threshold",
            ));
        }

        let scoring = &self.scoring;
        if scoring.base_score > 100 {
            return Err(invalid("scoring.base_score must be in [0, 100]"));
        }
        if !(scoring.validation_decay > 0.0 && scoring.validation_decay < 1.0) {
            return Err(invalid("scoring.validation_decay must be in (0, 1)"));
        }
        for (value, field) in [
            (scoring.first_validation_points, "first_validation_points"),
            (scoring.live_capture_points, "live_capture_points"),
            (scoring.uploaded_file_points, "uploaded_file_points"),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "scoring.{field} must be a non-negative number"
                )));
            }
        }
        if scoring.live_capture_points < scoring.uploaded_file_points {
            return Err(invalid(
                "scoring.live_capture_points must be >= scoring.uploaded_file_points",
            ));
        }

        let stages = &self.stages;
        if stages.review_threshold < 1 {
            return Err(invalid("stages.review_threshold must be >= 1"));
        }
        if stages.legendary_threshold < stages.review_threshold {
            return Err(invalid(
                "stages.legendary_threshold must be >= stages.review_threshold",
            ));
        }
        if stages.legendary_score_floor > 100 {
            return Err(invalid("stages.legendary_score_floor must be <= 100"));
        }
        if stages.verified_score_floor > stages.legendary_score_floor {
            return Err(invalid(
                "stages.verified_score_floor must be <= stages.legendary_score_floor",
            ));
        }

        if !is_positive(self.proximity.acceptance_radius_m) {
            return Err(invalid(
                "proximity.acceptance_radius_m must be a positive number",
            ));
        }
        if !is_positive(self.max_query_radius_km) {
            return Err(invalid("max_query_radius_km must be a positive number"));
        }

        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Config(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        TrustConfig::default().validate().unwrap();
    }

    #[test]
    fn from_json_fills_missing_fields_with_defaults() {
        let config =
            TrustConfig::from_json(r#"{ "dedup": { "block_threshold": 8 } }"#).unwrap();

        assert_eq!(config.dedup.block_threshold, 8);
        assert_eq!(config.dedup.radius_km, 0.5);
        assert_eq!(config.stages, StagePolicy::default());
    }

    #[test]
    fn from_json_rejects_unknown_fields() {
        let error = TrustConfig::from_json(r#"{ "dedup": { "radius": 1.0 } }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn validate_rejects_block_threshold_not_above_warn() {
        let mut config = TrustConfig::default();
        config.dedup.block_threshold = 1;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("block_threshold"));
    }

    #[test]
    fn validate_rejects_decay_outside_unit_interval() {
        let mut config = TrustConfig::default();
        config.scoring.validation_decay = 1.0;
        assert!(config.validate().is_err());

        config.scoring.validation_decay = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_stage_floors() {
        let mut config = TrustConfig::default();
        config.stages.verified_score_floor = 90;
        config.stages.legendary_score_floor = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_radii() {
        let mut config = TrustConfig::default();
        config.proximity.acceptance_radius_m = 0.0;
        assert!(config.validate().is_err());

        let mut config = TrustConfig::default();
        config.dedup.radius_km = f64::NAN;
        assert!(config.validate().is_err());
    }
}
