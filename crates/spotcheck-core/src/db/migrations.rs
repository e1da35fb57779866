//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        apply(conn, 2, MIGRATION_V2)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

/// Apply one migration's statements atomically and record its version
fn apply(conn: &mut Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (latest {CURRENT_VERSION})");
    Ok(())
}

/// Version 1: locations and their evidence
const MIGRATION_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS locations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL CHECK (category IN ('park', 'shop', 'informal-spot')),
        latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
        longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
        confidence_score INTEGER NOT NULL CHECK (confidence_score BETWEEN 0 AND 100),
        stage TEXT NOT NULL CHECK (stage IN ('ghost', 'review', 'verified', 'legendary')),
        validation_count INTEGER NOT NULL DEFAULT 0 CHECK (validation_count >= 0),
        creator_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_locations_lat_lng ON locations(latitude, longitude)",
    "CREATE INDEX IF NOT EXISTS idx_locations_creator ON locations(creator_id)",
    // Stage and score only ever move forward
    "CREATE TRIGGER IF NOT EXISTS locations_trust_forward_only BEFORE UPDATE ON locations
     FOR EACH ROW
     WHEN NEW.confidence_score < OLD.confidence_score
       OR (CASE NEW.stage WHEN 'ghost' THEN 0 WHEN 'review' THEN 1 WHEN 'verified' THEN 2 ELSE 3 END)
        < (CASE OLD.stage WHEN 'ghost' THEN 0 WHEN 'review' THEN 1 WHEN 'verified' THEN 2 ELSE 3 END)
     BEGIN
         SELECT RAISE(ABORT, 'location trust cannot regress');
     END",
    "CREATE TABLE IF NOT EXISTS location_evidence (
        id TEXT PRIMARY KEY,
        location_id TEXT NOT NULL REFERENCES locations(id),
        position INTEGER NOT NULL,
        media_ref TEXT NOT NULL,
        provenance TEXT NOT NULL CHECK (provenance IN ('live-capture', 'uploaded-file')),
        attached_at INTEGER NOT NULL,
        UNIQUE (location_id, position)
    )",
    "CREATE TRIGGER IF NOT EXISTS location_evidence_provenance_fixed BEFORE UPDATE OF provenance ON location_evidence
     FOR EACH ROW
     WHEN NEW.provenance <> OLD.provenance
     BEGIN
         SELECT RAISE(ABORT, 'evidence provenance is immutable');
     END",
];

/// Version 2: validation records, one per (location, validator)
const MIGRATION_V2: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS validations (
        location_id TEXT NOT NULL REFERENCES locations(id),
        validator_id TEXT NOT NULL,
        method TEXT NOT NULL CHECK (method IN ('gps-proximity')),
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        distance_m REAL NOT NULL,
        validated_at INTEGER NOT NULL,
        PRIMARY KEY (location_id, validator_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_validations_validator ON validations(validator_id)",
    // validation_count is derived here so it can never drift from the record count
    "CREATE TRIGGER IF NOT EXISTS validations_count_ai AFTER INSERT ON validations BEGIN
         UPDATE locations
         SET validation_count = validation_count + 1
         WHERE id = NEW.location_id;
     END",
    "CREATE TRIGGER IF NOT EXISTS validations_no_update BEFORE UPDATE ON validations BEGIN
         SELECT RAISE(ABORT, 'validation records are immutable');
     END",
    "CREATE TRIGGER IF NOT EXISTS validations_no_delete BEFORE DELETE ON validations BEGIN
         SELECT RAISE(ABORT, 'validation records cannot be revoked');
     END",
];
