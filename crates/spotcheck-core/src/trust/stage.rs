//! Stage Machine: forward-only trust tiers.

use serde::{Deserialize, Serialize};

use crate::config::StagePolicy;
use crate::models::Stage;

/// A promotion produced by [`StageMachine::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
}

#[derive(Debug, Clone, Copy)]
pub struct StageMachine {
    policy: StagePolicy,
}

impl StageMachine {
    pub const fn new(policy: StagePolicy) -> Self {
        Self { policy }
    }

    /// Stage implied by the current totals alone, ignoring history.
    pub const fn evaluate(&self, confidence_score: u8, validation_count: u32) -> Stage {
        let policy = &self.policy;
        if validation_count >= policy.legendary_threshold
            && confidence_score >= policy.legendary_score_floor
        {
            Stage::Legendary
        } else if validation_count >= policy.review_threshold
            && confidence_score >= policy.verified_score_floor
        {
            Stage::Verified
        } else if validation_count >= 1 {
            Stage::Review
        } else {
            Stage::Ghost
        }
    }

    /// Apply the evaluated stage to `current`, never moving backwards.
    ///
    /// Pure in its inputs: calling it again with the result yields no transition.
    pub fn advance(
        &self,
        current: Stage,
        confidence_score: u8,
        validation_count: u32,
    ) -> (Stage, Option<StageTransition>) {
        let next = current.max(self.evaluate(confidence_score, validation_count));
        let transition = (next != current).then_some(StageTransition {
            from: current,
            to: next,
        });
        (next, transition)
    }
}
