//! Database layer for Spotcheck

mod connection;
mod location_repository;
mod migrations;
mod validation_repository;

pub use connection::Database;
pub use location_repository::{GeoIndex, NearbyLocation, SqliteLocationRepository};
pub use validation_repository::{InsertOutcome, SqliteValidationRepository, ValidationStore};
