//! Shared services used by every client of the trust engine.

mod notify;
mod trust_engine;

pub use notify::{StageNotifier, TracingNotifier};
pub use trust_engine::{
    RegisterOutcome, RegisterRequest, TrustEngine, ValidateOutcome, ValidateRequest,
};
