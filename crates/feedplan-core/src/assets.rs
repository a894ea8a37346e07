//! Uploaded assets and their analyzer output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Description stored on a placeholder record when the analyzer could not
/// describe an asset.
pub const PLACEHOLDER_DESCRIPTION: &str = "Requires manual description";

/// Descriptions shorter than this are treated as analyzer failures.
const MIN_DESCRIPTION_CHARS: usize = 20;

/// Lower-cased fragments that mark a description as a failure placeholder.
const FAILURE_MARKERS: &[&str] = &[
    "requires manual description",
    "analysis failed",
    "could not analyze",
    "unable to analyze",
    "[error",
];

/// Returns the hex SHA-256 fingerprint of an asset's bytes.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// An uploaded image. The bytes live behind `blob_key` and are opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub blob_key: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Creates a new asset, fingerprinting `bytes`.
    #[must_use]
    pub fn new(campaign_id: Uuid, blob_key: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            blob_key: blob_key.into(),
            fingerprint: fingerprint(bytes),
            created_at: Utc::now(),
        }
    }
}

/// Analyzer output for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub asset_id: Uuid,
    pub campaign_id: Uuid,
    /// Fingerprint of the asset bytes this record describes.
    pub fingerprint: String,
    pub description: String,
    pub mood: Option<String>,
    pub strategic_fit: Option<String>,
    pub is_placeholder: bool,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Placeholder used when the analyzer fails for `asset`, so planning never blocks.
    #[must_use]
    pub fn placeholder(asset: &Asset) -> Self {
        Self {
            asset_id: asset.id,
            campaign_id: asset.campaign_id,
            fingerprint: asset.fingerprint.clone(),
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            mood: None,
            strategic_fit: None,
            is_placeholder: true,
            created_at: Utc::now(),
        }
    }

    /// Whether the description looks like real analyzer output.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.is_placeholder {
            return false;
        }
        let description = self.description.trim();
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return false;
        }
        let lowered = description.to_lowercase();
        !FAILURE_MARKERS.iter().any(|m| lowered.contains(m))
    }

    /// Valid and computed for the asset's current bytes.
    #[must_use]
    pub fn is_reusable_for(&self, asset: &Asset) -> bool {
        self.asset_id == asset.id && self.fingerprint == asset.fingerprint && self.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(asset: &Asset, description: &str) -> AnalysisRecord {
        AnalysisRecord {
            asset_id: asset.id,
            campaign_id: asset.campaign_id,
            fingerprint: asset.fingerprint.clone(),
            description: description.to_string(),
            mood: Some("warm".to_string()),
            strategic_fit: Some("product".to_string()),
            is_placeholder: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint(b"image-bytes");
        let b = fingerprint(b"image-bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint(b"other-bytes"));
    }

    #[test]
    fn real_description_is_valid() {
        let asset = Asset::new(Uuid::new_v4(), "blob/1", b"x");
        let rec = record(&asset, "A barista pouring latte art in morning light");
        assert!(rec.is_valid());
        assert!(rec.is_reusable_for(&asset));
    }

    #[test]
    fn short_description_is_invalid() {
        let asset = Asset::new(Uuid::new_v4(), "blob/1", b"x");
        assert!(!record(&asset, "coffee").is_valid());
        assert!(!record(&asset, "   ").is_valid());
    }

    #[test]
    fn failure_markers_are_invalid() {
        let asset = Asset::new(Uuid::new_v4(), "blob/1", b"x");
        assert!(!record(&asset, "Analysis failed: upstream returned nothing useful").is_valid());
        assert!(!record(&asset, "[ERROR] model refused to describe this picture").is_valid());
    }

    #[test]
    fn placeholder_is_never_valid() {
        let asset = Asset::new(Uuid::new_v4(), "blob/1", b"x");
        let rec = AnalysisRecord::placeholder(&asset);
        assert!(rec.is_placeholder);
        assert_eq!(rec.description, PLACEHOLDER_DESCRIPTION);
        assert!(!rec.is_valid());
    }

    #[test]
    fn modified_asset_invalidates_reuse() {
        let asset = Asset::new(Uuid::new_v4(), "blob/1", b"original");
        let rec = record(&asset, "A barista pouring latte art in morning light");
        let mut edited = asset.clone();
        edited.fingerprint = fingerprint(b"edited");
        assert!(!rec.is_reusable_for(&edited));
    }
}
