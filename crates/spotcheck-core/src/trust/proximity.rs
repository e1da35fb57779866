//! Proximity Validator: a validation is a claim of physical presence.
//!
//! The only control available is comparing the validator's device-reported
//! position with the stored position of the location at the moment of the
//! claim. Each user may succeed at most once per location; the store's
//! primary key backs that up when two submissions race.

use crate::config::ProximityPolicy;
use crate::db::{InsertOutcome, ValidationStore};
use crate::error::{Error, Result};
use crate::geo::Coordinates;
use crate::models::{Location, ValidationMethod, ValidationRecord};

/// One user's attempt to corroborate a location.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationAttempt {
    pub validator_id: String,
    pub reported: Coordinates,
    /// Unix ms
    pub attempted_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProximityOutcome {
    /// A new record was stored
    Recorded(ValidationRecord),
    /// This user already validated the location; nothing changed
    AlreadyValidated,
    /// Reported position is outside the acceptance radius
    TooFar { distance_m: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ProximityValidator {
    policy: ProximityPolicy,
}

impl ProximityValidator {
    pub const fn new(policy: ProximityPolicy) -> Self {
        Self { policy }
    }

    pub const fn acceptance_radius_m(&self) -> f64 {
        self.policy.acceptance_radius_m
    }

    /// Check an attempt against `location` and record it when accepted.
    ///
    /// Must run inside the same transaction that later updates the location.
    pub fn attempt(
        &self,
        store: &impl ValidationStore,
        location: &Location,
        attempt: &ValidationAttempt,
    ) -> Result<ProximityOutcome> {
        if !self.policy.allow_self_validation && location.is_created_by(&attempt.validator_id) {
            return Err(Error::SelfValidation);
        }

        if store.get(&location.id, &attempt.validator_id)?.is_some() {
            return Ok(ProximityOutcome::AlreadyValidated);
        }

        let distance_m = attempt.reported.distance_m(&location.coordinates);
        if distance_m > self.policy.acceptance_radius_m {
            tracing::debug!(
                location = %location.id,
                distance_m,
                acceptance_radius_m = self.policy.acceptance_radius_m,
                "Rejected validation outside acceptance radius"
            );
            return Ok(ProximityOutcome::TooFar { distance_m });
        }

        let record = ValidationRecord {
            location_id: location.id,
            validator_id: attempt.validator_id.clone(),
            method: ValidationMethod::GpsProximity,
            reported: attempt.reported,
            distance_m,
            validated_at: attempt.attempted_at,
        };

        match store.insert(&record)? {
            InsertOutcome::Inserted => Ok(ProximityOutcome::Recorded(record)),
            InsertOutcome::Duplicate => Ok(ProximityOutcome::AlreadyValidated),
        }
    }
}
