//! spotcheck-core - Location trust and validation engine
//!
//! This crate holds the models, `SQLite` storage and trust policy behind the
//! community map: duplicate detection on registration, proximity-based
//! validation, confidence scoring and forward-only stage progression.

pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod models;
pub mod services;
pub mod trust;
pub mod util;

pub use config::TrustConfig;
pub use error::{Error, Result};
pub use geo::Coordinates;
pub use models::{Category, Location, LocationId, Stage};
pub use services::{
    RegisterOutcome, RegisterRequest, StageNotifier, TrustEngine, ValidateOutcome,
    ValidateRequest,
};
