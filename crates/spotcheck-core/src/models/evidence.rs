//! Evidence model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::unix_millis_now;

/// A unique identifier for an evidence item, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceId(Uuid);

impl EvidenceId {
    /// Create a new unique evidence ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EvidenceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How a piece of media reached the server.
///
/// Live captures are harder to spoof than files picked from a gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    LiveCapture,
    UploadedFile,
}

impl Provenance {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LiveCapture => "live-capture",
            Self::UploadedFile => "uploaded-file",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "live-capture" => Ok(Self::LiveCapture),
            "uploaded-file" => Ok(Self::UploadedFile),
            other => Err(Error::InvalidInput(format!("Unknown provenance: {other}"))),
        }
    }
}

/// Media reference as supplied by the media-storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceInput {
    pub media_ref: String,
    pub provenance: Provenance,
}

impl EvidenceInput {
    pub fn new(media_ref: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            media_ref: media_ref.into(),
            provenance,
        }
    }
}

/// Media attached to a location. Provenance never changes after attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Unique evidence identifier.
    pub id: EvidenceId,
    /// Opaque media-storage reference.
    pub media_ref: String,
    pub provenance: Provenance,
    /// Attach timestamp (Unix ms).
    pub attached_at: i64,
}

impl Evidence {
    /// Create a new evidence record from caller input.
    pub fn new(input: EvidenceInput) -> Result<Self> {
        let media_ref = input.media_ref.trim().to_string();
        if media_ref.is_empty() {
            return Err(Error::InvalidInput(
                "Evidence media_ref cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: EvidenceId::new(),
            media_ref,
            provenance: input.provenance,
            attached_at: unix_millis_now(),
        })
    }
}

/// Count evidence items per provenance as `(live, uploaded)`.
#[must_use]
pub fn count_by_provenance(evidence: &[Evidence]) -> (usize, usize) {
    evidence
        .iter()
        .fold((0, 0), |(live, uploaded), item| match item.provenance {
            Provenance::LiveCapture => (live + 1, uploaded),
            Provenance::UploadedFile => (live, uploaded + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_id_unique() {
        let id1 = EvidenceId::new();
        let id2 = EvidenceId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_evidence_new_trims_reference() {
        let evidence = Evidence::new(EvidenceInput::new(
            "  media/abc.jpg ",
            Provenance::LiveCapture,
        ))
        .unwrap();

        assert_eq!(evidence.media_ref, "media/abc.jpg");
        assert_eq!(evidence.provenance, Provenance::LiveCapture);
        assert!(evidence.attached_at > 0);
    }

    #[test]
    fn test_evidence_validation() {
        assert!(Evidence::new(EvidenceInput::new("   ", Provenance::UploadedFile)).is_err());
    }

    #[test]
    fn test_provenance_round_trips_through_str() {
        for provenance in [Provenance::LiveCapture, Provenance::UploadedFile] {
            assert_eq!(provenance.as_str().parse::<Provenance>().unwrap(), provenance);
        }
        assert!("screenshot".parse::<Provenance>().is_err());
    }

    #[test]
    fn test_count_by_provenance() {
        let items = [
            Provenance::LiveCapture,
            Provenance::UploadedFile,
            Provenance::LiveCapture,
        ]
        .into_iter()
        .map(|provenance| Evidence::new(EvidenceInput::new("ref", provenance)).unwrap())
        .collect::<Vec<_>>();

        assert_eq!(count_by_provenance(&items), (2, 1));
    }
}
