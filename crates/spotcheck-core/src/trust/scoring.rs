//! Confidence Scorer: turn accumulated evidence into a 0-100 score.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]

use crate::config::ScoringPolicy;
use crate::models::{count_by_provenance, Location};

const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1_000;

/// Past this many validations the series has converged to well under a point.
const MAX_SUMMED_VALIDATIONS: u32 = 256;

/// Absorbs float error so that e.g. 45.999999 scores as 46.
const FLOOR_EPSILON: f64 = 1e-9;

/// Everything the score depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreInputs {
    pub validation_count: u32,
    pub live_captures: usize,
    pub uploaded_files: usize,
    /// Milliseconds since the location was created
    pub age_ms: i64,
}

impl ScoreInputs {
    /// Collect inputs from a location's current totals.
    #[must_use]
    pub fn from_location(location: &Location, now_ms: i64) -> Self {
        let (live_captures, uploaded_files) = count_by_provenance(&location.evidence);
        Self {
            validation_count: location.validation_count,
            live_captures,
            uploaded_files,
            age_ms: now_ms - location.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    policy: ScoringPolicy,
}

impl ConfidenceScorer {
    pub const fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Score of a freshly created location with no evidence.
    pub const fn base_score(&self) -> u8 {
        self.policy.base_score
    }

    /// Compute the score from scratch. Monotone in every input.
    pub fn score(&self, inputs: ScoreInputs) -> u8 {
        let policy = &self.policy;
        let total = f64::from(policy.base_score)
            + self.validation_points(inputs.validation_count)
            + self.evidence_points(inputs.live_captures, inputs.uploaded_files)
            + f64::from(self.age_points(inputs.validation_count, inputs.age_ms));

        (total + FLOOR_EPSILON).clamp(0.0, 100.0).floor() as u8
    }

    /// Recompute a location's score, never going below the stored value.
    pub fn rescore(&self, location: &Location, now_ms: i64) -> u8 {
        let fresh = self.score(ScoreInputs::from_location(location, now_ms));
        fresh.max(location.confidence_score)
    }

    /// Geometric series: the i-th validation earns `first * decay^(i-1)`.
    fn validation_points(&self, validation_count: u32) -> f64 {
        let mut earned = 0.0;
        let mut next = self.policy.first_validation_points;
        for _ in 0..validation_count.min(MAX_SUMMED_VALIDATIONS) {
            earned += next;
            next *= self.policy.validation_decay;
        }
        earned
    }

    fn evidence_points(&self, live_captures: usize, uploaded_files: usize) -> f64 {
        let cap = self.policy.max_counted_evidence;
        live_captures.min(cap) as f64 * self.policy.live_capture_points
            + uploaded_files.min(cap) as f64 * self.policy.uploaded_file_points
    }

    /// Unvalidated locations earn nothing for just sitting there.
    fn age_points(&self, validation_count: u32, age_ms: i64) -> u32 {
        if validation_count == 0 || age_ms <= 0 {
            return 0;
        }
        let weeks = u32::try_from(age_ms / WEEK_MS).unwrap_or(u32::MAX);
        weeks.min(self.policy.max_age_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinates;
    use crate::models::{Category, Evidence, EvidenceInput, Provenance};

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(ScoringPolicy::default())
    }

    fn with_validations(validation_count: u32) -> ScoreInputs {
        ScoreInputs {
            validation_count,
            ..ScoreInputs::default()
        }
    }

    #[test]
    fn fresh_location_scores_base() {
        assert_eq!(scorer().score(ScoreInputs::default()), 10);
    }

    #[test]
    fn validations_have_diminishing_returns() {
        let scorer = scorer();
        let scores = (0..=6)
            .map(|n| scorer.score(with_validations(n)))
            .collect::<Vec<_>>();

        assert_eq!(scores[0], 10);
        assert_eq!(scores[1], 30);
        assert_eq!(scores[2], 46);
        assert_eq!(scores[3], 58);

        let gains = scores.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>();
        assert!(gains.windows(2).all(|g| g[1] <= g[0]), "{gains:?}");
    }

    #[test]
    fn score_is_clamped_to_100() {
        let inputs = ScoreInputs {
            validation_count: 10_000,
            live_captures: 50,
            uploaded_files: 50,
            age_ms: WEEK_MS * 500,
        };
        assert_eq!(scorer().score(inputs), 100);
    }

    #[test]
    fn live_capture_outweighs_upload() {
        let scorer = scorer();
        let live = scorer.score(ScoreInputs {
            live_captures: 2,
            ..ScoreInputs::default()
        });
        let uploaded = scorer.score(ScoreInputs {
            uploaded_files: 2,
            ..ScoreInputs::default()
        });
        assert_eq!(live, 22);
        assert_eq!(uploaded, 14);
    }

    #[test]
    fn evidence_beyond_cap_adds_nothing() {
        let scorer = scorer();
        let three = scorer.score(ScoreInputs {
            live_captures: 3,
            ..ScoreInputs::default()
        });
        let ten = scorer.score(ScoreInputs {
            live_captures: 10,
            ..ScoreInputs::default()
        });
        assert_eq!(three, ten);
    }

    #[test]
    fn age_counts_only_after_first_validation() {
        let scorer = scorer();
        let unvalidated = scorer.score(ScoreInputs {
            age_ms: WEEK_MS * 3,
            ..ScoreInputs::default()
        });
        assert_eq!(unvalidated, 10);

        let validated = scorer.score(ScoreInputs {
            validation_count: 1,
            age_ms: WEEK_MS * 3,
            ..ScoreInputs::default()
        });
        assert_eq!(validated, 33);

        let old = scorer.score(ScoreInputs {
            validation_count: 1,
            age_ms: WEEK_MS * 52,
            ..ScoreInputs::default()
        });
        assert_eq!(old, 35);
    }

    #[test]
    fn rescore_never_lowers_stored_score() {
        let mut location = Location::new(
            "Old DIY spot",
            Category::InformalSpot,
            Coordinates::new(0.0, 0.0).unwrap(),
            "creator",
            10,
        )
        .unwrap();
        location.confidence_score = 70;

        assert_eq!(scorer().rescore(&location, location.created_at), 70);
    }

    #[test]
    fn rescore_counts_location_evidence() {
        let mut location = Location::new(
            "Shop with ramp",
            Category::Shop,
            Coordinates::new(0.0, 0.0).unwrap(),
            "creator",
            10,
        )
        .unwrap();
        location.evidence.push(
            Evidence::new(EvidenceInput::new("live.jpg", Provenance::LiveCapture)).unwrap(),
        );
        location.evidence.push(
            Evidence::new(EvidenceInput::new("file.jpg", Provenance::UploadedFile)).unwrap(),
        );

        assert_eq!(scorer().rescore(&location, location.created_at), 18);
    }
}
