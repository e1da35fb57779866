//! Great-circle geometry on WGS-84 coordinates.
//!
//! Distances use the haversine formula on a spherical earth. At city and
//! country scale this stays well within a percent of the ellipsoidal distance,
//! where a flat projection would not.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6_371.008_8;

/// Kilometres per degree of latitude on the sphere above.
const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build validated coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "Latitude must be within [-90, 90], got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "Longitude must be within [-180, 180], got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Re-check coordinates that arrived through deserialization.
    pub fn validated(self) -> Result<Self> {
        Self::new(self.latitude, self.longitude)
    }

    /// Great-circle distance to `other` in kilometres.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }

    /// Great-circle distance to `other` in metres.
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        self.distance_km(other) * 1_000.0
    }
}

/// Haversine distance in kilometres between two lat/lng pairs.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Lat/lng rectangle that contains every point within a radius of a center.
///
/// Used as an index-friendly SQL prefilter; callers still apply the exact
/// haversine check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    /// Longitude ranges crossing the antimeridian are split in two.
    pub longitude_ranges: [(f64, f64); 2],
}

impl BoundingBox {
    /// Rectangle enclosing the circle of `radius_km` around `center`.
    #[must_use]
    pub fn around(center: Coordinates, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let min_latitude = (center.latitude - lat_delta).max(-90.0);
        let max_latitude = (center.latitude + lat_delta).min(90.0);

        // Near the poles every longitude can be inside the circle.
        let widest_cos = min_latitude
            .to_radians()
            .cos()
            .min(max_latitude.to_radians().cos());
        let full_circle = (-180.0, 180.0);
        if min_latitude <= -90.0 || max_latitude >= 90.0 || widest_cos <= f64::EPSILON {
            return Self {
                min_latitude,
                max_latitude,
                longitude_ranges: [full_circle, full_circle],
            };
        }

        let lon_delta = radius_km / (KM_PER_DEGREE * widest_cos);
        if lon_delta >= 180.0 {
            return Self {
                min_latitude,
                max_latitude,
                longitude_ranges: [full_circle, full_circle],
            };
        }

        let west = center.longitude - lon_delta;
        let east = center.longitude + lon_delta;
        let longitude_ranges = if west < -180.0 {
            [(west + 360.0, 180.0), (-180.0, east)]
        } else if east > 180.0 {
            [(west, 180.0), (-180.0, east - 360.0)]
        } else {
            [(west, east), (west, east)]
        };

        Self {
            min_latitude,
            max_latitude,
            longitude_ranges,
        }
    }

    /// Whether a point falls inside the rectangle.
    #[must_use]
    pub fn contains(&self, point: &Coordinates) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude)
            && self
                .longitude_ranges
                .iter()
                .any(|(west, east)| (*west..=*east).contains(&point.longitude))
    }
}
