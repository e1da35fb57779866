//! Trust policy components: dedup, scoring, stages and proximity.
//!
//! These are pure decision makers over data handed to them by the database
//! layer; sequencing and transactions live in [`crate::services`].

mod dedup;
mod proximity;
mod scoring;
mod stage;

pub use dedup::{DuplicateGuard, DuplicateVerdict, NearbyMatch};
pub use proximity::{ProximityOutcome, ProximityValidator, ValidationAttempt};
pub use scoring::{ConfidenceScorer, ScoreInputs};
pub use stage::{StageMachine, StageTransition};
