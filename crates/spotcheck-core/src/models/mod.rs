//! Data models for Spotcheck

mod evidence;
mod location;
mod validation;

pub use evidence::{count_by_provenance, Evidence, EvidenceId, EvidenceInput, Provenance};
pub use location::{normalize_name, Category, Location, LocationId, Stage, MIN_NAME_CHARS};
pub use validation::{ValidationMethod, ValidationRecord};
