//! Validation record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::geo::Coordinates;

use super::location::LocationId;

/// How a validator proved presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMethod {
    GpsProximity,
}

impl ValidationMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GpsProximity => "gps-proximity",
        }
    }
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gps-proximity" => Ok(Self::GpsProximity),
            other => Err(Error::InvalidInput(format!(
                "Unknown validation method: {other}"
            ))),
        }
    }
}

/// One user's corroboration of one location.
///
/// `(location_id, validator_id)` is unique and records are never revoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub location_id: LocationId,
    pub validator_id: String,
    pub method: ValidationMethod,
    /// Device-reported position at validation time
    pub reported: Coordinates,
    /// Great-circle distance from `reported` to the location
    pub distance_m: f64,
    /// Unix ms
    pub validated_at: i64,
}
