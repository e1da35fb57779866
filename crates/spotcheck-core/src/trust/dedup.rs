//! Duplicate Guard: classify a registration against nearby locations.

use serde::{Deserialize, Serialize};

use crate::config::DedupPolicy;
use crate::db::NearbyLocation;
use crate::models::{Category, LocationId};

/// Summary of an existing location near a registration candidate.
///
/// `name` is withheld for ghost locations the requester did not create; they
/// still count toward the thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyMatch {
    pub id: LocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub category: Category,
    #[serde(rename = "distance_meters")]
    pub distance_m: f64,
}

impl NearbyMatch {
    /// Summarize `nearby` as `viewer` may see it.
    pub fn seen_by(nearby: &NearbyLocation, viewer: Option<&str>) -> Self {
        Self {
            id: nearby.location.id,
            name: nearby
                .location
                .is_visible_to(viewer)
                .then(|| nearby.location.name.clone()),
            category: nearby.location.category,
            distance_m: nearby.distance_m,
        }
    }
}

/// Classification of a candidate registration.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateVerdict {
    /// Nothing nearby
    Clear,
    /// Something nearby; the caller may insist with `force_proceed`
    Ambiguous(Vec<NearbyMatch>),
    /// Too crowded; creation is refused whatever the caller says
    Blocked(Vec<NearbyMatch>),
}

impl DuplicateVerdict {
    /// Whether a location may be created under this verdict.
    #[must_use]
    pub fn permits_creation(&self, force_proceed: bool) -> bool {
        match self {
            Self::Clear => true,
            Self::Ambiguous(_) => force_proceed,
            Self::Blocked(_) => false,
        }
    }

    #[must_use]
    pub fn matches(&self) -> &[NearbyMatch] {
        match self {
            Self::Clear => &[],
            Self::Ambiguous(matches) | Self::Blocked(matches) => matches,
        }
    }

    #[must_use]
    pub fn into_matches(self) -> Vec<NearbyMatch> {
        match self {
            Self::Clear => Vec::new(),
            Self::Ambiguous(matches) | Self::Blocked(matches) => matches,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Ambiguous(_) => "ambiguous",
            Self::Blocked(_) => "blocked",
        }
    }
}

/// Applies the dedup thresholds; the radius query itself is the Geo Index's job.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGuard {
    policy: DedupPolicy,
}

impl DuplicateGuard {
    pub const fn new(policy: DedupPolicy) -> Self {
        Self { policy }
    }

    /// Radius the caller should query before calling [`Self::classify`].
    pub const fn radius_km(&self) -> f64 {
        self.policy.radius_km
    }

    /// Classify the locations found within the dedup radius, of any category,
    /// on behalf of `requester`.
    pub fn classify(&self, nearby: &[NearbyLocation], requester: Option<&str>) -> DuplicateVerdict {
        let matches = nearby
            .iter()
            .map(|found| NearbyMatch::seen_by(found, requester))
            .collect::<Vec<_>>();

        let verdict = if matches.len() >= self.policy.block_threshold {
            DuplicateVerdict::Blocked(matches)
        } else if matches.len() >= self.policy.warn_threshold {
            DuplicateVerdict::Ambiguous(matches)
        } else {
            DuplicateVerdict::Clear
        };

        tracing::debug!(
            nearby = nearby.len(),
            radius_km = self.policy.radius_km,
            verdict = verdict.label(),
            "Classified registration"
        );
        verdict
    }
}
