//! Validation record storage

use crate::error::Result;
use crate::geo::Coordinates;
use crate::models::{LocationId, ValidationRecord};
use rusqlite::{ffi, params, Connection, OptionalExtension};

use super::location_repository::parse_column;

/// Result of trying to store a validation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record for this (location, validator) pair already exists
    Duplicate,
}

/// Trait for validation record storage
pub trait ValidationStore {
    /// Get the record a validator left on a location, if any
    fn get(&self, location_id: &LocationId, validator_id: &str) -> Result<Option<ValidationRecord>>;

    /// Store a new record; a uniqueness conflict is reported, not raised
    fn insert(&self, record: &ValidationRecord) -> Result<InsertOutcome>;

    /// All records for a location, oldest first
    fn list_for_location(&self, location_id: &LocationId) -> Result<Vec<ValidationRecord>>;
}

/// `SQLite` implementation of `ValidationStore`
pub struct SqliteValidationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteValidationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ValidationRecord> {
        Ok(ValidationRecord {
            location_id: parse_column(row, 0)?,
            validator_id: row.get(1)?,
            method: parse_column(row, 2)?,
            reported: Coordinates {
                latitude: row.get(3)?,
                longitude: row.get(4)?,
            },
            distance_m: row.get(5)?,
            validated_at: row.get(6)?,
        })
    }
}

impl ValidationStore for SqliteValidationRepository<'_> {
    fn get(&self, location_id: &LocationId, validator_id: &str) -> Result<Option<ValidationRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT location_id, validator_id, method, latitude, longitude, distance_m, validated_at
                 FROM validations
                 WHERE location_id = ? AND validator_id = ?",
                params![location_id.as_str(), validator_id],
                Self::parse_record,
            )
            .optional()?;

        Ok(record)
    }

    fn insert(&self, record: &ValidationRecord) -> Result<InsertOutcome> {
        let result = self.conn.execute(
            "INSERT INTO validations (location_id, validator_id, method, latitude, longitude, distance_m, validated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.location_id.as_str(),
                record.validator_id,
                record.method.as_str(),
                record.reported.latitude,
                record.reported.longitude,
                record.distance_m,
                record.validated_at
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || error.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                tracing::warn!(
                    location = %record.location_id,
                    "Validation insert lost a uniqueness race"
                );
                Ok(InsertOutcome::Duplicate)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn list_for_location(&self, location_id: &LocationId) -> Result<Vec<ValidationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT location_id, validator_id, method, latitude, longitude, distance_m, validated_at
             FROM validations
             WHERE location_id = ?
             ORDER BY validated_at ASC, validator_id ASC",
        )?;

        let records = stmt
            .query_map(params![location_id.as_str()], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}
