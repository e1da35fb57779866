//! Location model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geo::Coordinates;
use crate::util::unix_millis_now;

use super::evidence::Evidence;

/// Minimum number of characters in a location name after trimming.
pub const MIN_NAME_CHARS: usize = 3;

/// A unique identifier for a location, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationId(Uuid);

impl LocationId {
    /// Create a new unique location ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of place being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Park,
    Shop,
    InformalSpot,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Park => "park",
            Self::Shop => "shop",
            Self::InformalSpot => "informal-spot",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "park" => Ok(Self::Park),
            "shop" => Ok(Self::Shop),
            "informal-spot" | "informal_spot" | "spot" => Ok(Self::InformalSpot),
            other => Err(Error::InvalidInput(format!("Unknown category: {other}"))),
        }
    }
}

/// Discrete trust tier of a location.
///
/// Variants are declared in promotion order so `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Visible only to the creator
    Ghost,
    /// Visible to everyone, flagged as unconfirmed
    Review,
    /// Visible, flagged as confirmed
    Verified,
    /// Top trust tier, prioritized on the map
    Legendary,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ghost => "ghost",
            Self::Review => "review",
            Self::Verified => "verified",
            Self::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ghost" => Ok(Self::Ghost),
            "review" => Ok(Self::Review),
            "verified" => Ok(Self::Verified),
            "legendary" => Ok(Self::Legendary),
            other => Err(Error::InvalidInput(format!("Unknown stage: {other}"))),
        }
    }
}

/// A reported physical place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique identifier
    pub id: LocationId,
    /// Display name
    pub name: String,
    pub category: Category,
    /// Fixed at creation
    pub coordinates: Coordinates,
    /// 0-100, never decreases
    pub confidence_score: u8,
    pub stage: Stage,
    /// Always equal to the number of validation records
    pub validation_count: u32,
    /// Attached media in attach order
    pub evidence: Vec<Evidence>,
    /// User who registered the location
    pub creator_id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last trust update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Location {
    /// Create a new ghost-stage location with the given starting score.
    pub fn new(
        name: &str,
        category: Category,
        coordinates: Coordinates,
        creator_id: &str,
        base_score: u8,
    ) -> Result<Self> {
        let name = normalize_name(name)?;
        let creator_id = creator_id.trim();
        if creator_id.is_empty() {
            return Err(Error::InvalidInput(
                "Location creator cannot be empty".to_string(),
            ));
        }

        let now = unix_millis_now();
        Ok(Self {
            id: LocationId::new(),
            name,
            category,
            coordinates: coordinates.validated()?,
            confidence_score: base_score.min(100),
            stage: Stage::Ghost,
            validation_count: 0,
            evidence: Vec::new(),
            creator_id: creator_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether `viewer` may see this location.
    ///
    /// Ghost locations are private to their creator.
    #[must_use]
    pub fn is_visible_to(&self, viewer: Option<&str>) -> bool {
        self.stage != Stage::Ghost || viewer.is_some_and(|viewer| viewer == self.creator_id)
    }

    #[must_use]
    pub fn is_created_by(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }
}

/// Trim a location name and enforce the minimum length.
pub fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.chars().count() < MIN_NAME_CHARS {
        return Err(Error::InvalidInput(format!(
            "Location name must be at least {MIN_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}
