//! Stage change notifications.

use crate::models::Location;
use crate::trust::StageTransition;

/// Receives stage promotions after the transaction that caused them commits.
///
/// Implementations must not block for long: the engine calls them inline on
/// the request path.
pub trait StageNotifier: Send + Sync {
    fn stage_changed(&self, location: &Location, transition: StageTransition);
}

/// Default notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl StageNotifier for TracingNotifier {
    fn stage_changed(&self, location: &Location, transition: StageTransition) {
        tracing::info!(
            location = %location.id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            confidence_score = location.confidence_score,
            validation_count = location.validation_count,
            "Location stage changed"
        );
    }
}
