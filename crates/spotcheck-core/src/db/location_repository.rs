//! Location repository: the Geo Index

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for positions

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::geo::{BoundingBox, Coordinates};
use crate::models::{Evidence, Location, LocationId, Stage};
use crate::util::unix_millis_now;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

/// A location returned by a radius query, with its distance from the center.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyLocation {
    pub location: Location,
    pub distance_m: f64,
}

/// Trait for location storage and radius queries
pub trait GeoIndex {
    /// Locations within `radius_km` of `center`, nearest first
    fn find_within_radius(&self, center: Coordinates, radius_km: f64)
        -> Result<Vec<NearbyLocation>>;

    /// Persist a new location with its initial evidence
    fn insert(&self, location: &Location) -> Result<Location>;

    /// Get a location by ID
    fn get(&self, id: &LocationId) -> Result<Option<Location>>;

    /// Store a recomputed score and stage
    fn update_trust(&self, id: &LocationId, confidence_score: u8, stage: Stage) -> Result<()>;

    /// Append evidence after the existing items
    fn attach_evidence(&self, id: &LocationId, evidence: &Evidence) -> Result<()>;
}

/// `SQLite` implementation of `GeoIndex`
///
/// Works on a plain connection or on a transaction (which derefs to one).
pub struct SqliteLocationRepository<'a> {
    conn: &'a Connection,
}

const LOCATION_COLUMNS: &str = "id, name, category, latitude, longitude, confidence_score, \
                                stage, validation_count, creator_id, created_at, updated_at";

impl<'a> SqliteLocationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a location (without evidence) from a database row
    fn parse_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<Location> {
        Ok(Location {
            id: parse_column(row, 0)?,
            name: row.get(1)?,
            category: parse_column(row, 2)?,
            coordinates: Coordinates {
                latitude: row.get(3)?,
                longitude: row.get(4)?,
            },
            confidence_score: row.get(5)?,
            stage: parse_column(row, 6)?,
            validation_count: row.get(7)?,
            evidence: Vec::new(),
            creator_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn parse_evidence(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evidence> {
        Ok(Evidence {
            id: parse_column(row, 0)?,
            media_ref: row.get(1)?,
            provenance: parse_column(row, 2)?,
            attached_at: row.get(3)?,
        })
    }

    fn load_evidence(&self, id: &LocationId) -> Result<Vec<Evidence>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, media_ref, provenance, attached_at
             FROM location_evidence
             WHERE location_id = ?
             ORDER BY position ASC",
        )?;

        let evidence = stmt
            .query_map(params![id.as_str()], Self::parse_evidence)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(evidence)
    }

    fn insert_evidence(&self, id: &LocationId, position: i64, evidence: &Evidence) -> Result<()> {
        self.conn.execute(
            "INSERT INTO location_evidence (id, location_id, position, media_ref, provenance, attached_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                evidence.id.as_str(),
                id.as_str(),
                position,
                evidence.media_ref,
                evidence.provenance.as_str(),
                evidence.attached_at
            ],
        )?;
        Ok(())
    }
}

impl GeoIndex for SqliteLocationRepository<'_> {
    fn find_within_radius(
        &self,
        center: Coordinates,
        radius_km: f64,
    ) -> Result<Vec<NearbyLocation>> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(Error::InvalidInput(format!(
                "Radius must be a non-negative number, got {radius_km}"
            )));
        }

        let bbox = BoundingBox::around(center, radius_km);
        let [(west_a, east_a), (west_b, east_b)] = bbox.longitude_ranges;
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {LOCATION_COLUMNS}
             FROM locations
             WHERE latitude BETWEEN ?1 AND ?2
               AND (longitude BETWEEN ?3 AND ?4 OR longitude BETWEEN ?5 AND ?6)"
        ))?;

        let candidates = stmt
            .query_map(
                params![
                    bbox.min_latitude,
                    bbox.max_latitude,
                    west_a,
                    east_a,
                    west_b,
                    east_b
                ],
                Self::parse_location,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let radius_m = radius_km * 1_000.0;
        let mut nearby = Vec::with_capacity(candidates.len());
        for mut location in candidates {
            let distance_m = center.distance_m(&location.coordinates);
            if distance_m <= radius_m {
                location.evidence = self.load_evidence(&location.id)?;
                nearby.push(NearbyLocation {
                    location,
                    distance_m,
                });
            }
        }
        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

        Ok(nearby)
    }

    fn insert(&self, location: &Location) -> Result<Location> {
        self.conn.execute(
            &format!(
                "INSERT INTO locations ({LOCATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                location.id.as_str(),
                location.name,
                location.category.as_str(),
                location.coordinates.latitude,
                location.coordinates.longitude,
                location.confidence_score,
                location.stage.as_str(),
                location.validation_count,
                location.creator_id,
                location.created_at,
                location.updated_at
            ],
        )?;

        for (position, evidence) in location.evidence.iter().enumerate() {
            self.insert_evidence(&location.id, position as i64, evidence)?;
        }

        self.get(&location.id)?
            .ok_or_else(|| Error::NotFound(location.id.to_string()))
    }

    fn get(&self, id: &LocationId) -> Result<Option<Location>> {
        let location = self
            .conn
            .query_row(
                &format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?"),
                params![id.as_str()],
                Self::parse_location,
            )
            .optional()?;

        let Some(mut location) = location else {
            return Ok(None);
        };
        location.evidence = self.load_evidence(id)?;
        Ok(Some(location))
    }

    fn update_trust(&self, id: &LocationId, confidence_score: u8, stage: Stage) -> Result<()> {
        let now = unix_millis_now();

        let rows = self.conn.execute(
            "UPDATE locations SET confidence_score = ?, stage = ?, updated_at = ? WHERE id = ?",
            params![confidence_score, stage.as_str(), now, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn attach_evidence(&self, id: &LocationId, evidence: &Evidence) -> Result<()> {
        let next_position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM location_evidence WHERE location_id = ?",
            params![id.as_str()],
            |row| row.get(0),
        )?;

        self.insert_evidence(id, next_position, evidence)
    }
}

/// Read a text column and parse it with `FromStr`.
pub(super) fn parse_column<T>(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}
