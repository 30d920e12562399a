//! Photo library entities as the search index sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog identifier of a photo. Also the final tie-break of every ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(pub i64);

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detected face. `person_id` stays `None` until the face is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    pub person_id: Option<i64>,
}

/// A named person faces can be linked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

/// A photo with everything the engine filters, groups or ranks on.
#[derive(Debug, Clone, Default)]
pub struct Photo {
    pub id: PhotoId,
    pub path: String,
    pub shot_ts: Option<DateTime<Utc>>,
    pub filesize: u64,
    /// Lower-cased, without the leading dot.
    pub extension: String,
    pub camera_make: Option<String>,
    pub orientation: Option<String>,
    /// SHA-256 of the file contents, hex.
    pub content_hash: Option<String>,
    /// Perceptual hash, base64.
    pub perceptual_hash: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub tags: Vec<String>,
    pub faces: Vec<Face>,
}

impl Default for PhotoId {
    fn default() -> Self {
        PhotoId(0)
    }
}

impl Photo {
    pub fn new(id: i64, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: PhotoId(id),
            extension: extension_of(&path),
            path,
            ..Default::default()
        }
    }

    pub fn has_faces(&self) -> bool {
        !self.faces.is_empty()
    }
}

/// Extension of a path, lower-cased and without the dot.
pub fn extension_of(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Orientation label derived from pixel dimensions.
pub fn orientation_of(width: Option<i64>, height: Option<i64>) -> Option<String> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(
            if w > h {
                "landscape"
            } else if h > w {
                "portrait"
            } else {
                "square"
            }
            .to_string(),
        ),
        _ => None,
    }
}

/// File size buckets exposed as the `filesize_range` facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesizeRange {
    Small,
    Medium,
    Large,
}

impl FilesizeRange {
    pub const ALL: [FilesizeRange; 3] = [
        FilesizeRange::Small,
        FilesizeRange::Medium,
        FilesizeRange::Large,
    ];

    /// Half-open byte range `[lo, hi)`.
    pub fn bounds(&self) -> (u64, u64) {
        match self {
            FilesizeRange::Small => (0, 1_000_000),
            FilesizeRange::Medium => (1_000_000, 5_000_000),
            FilesizeRange::Large => (5_000_000, u64::MAX),
        }
    }

    pub fn for_size(bytes: u64) -> Self {
        if bytes < 1_000_000 {
            FilesizeRange::Small
        } else if bytes < 5_000_000 {
            FilesizeRange::Medium
        } else {
            FilesizeRange::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilesizeRange::Small => "small",
            FilesizeRange::Medium => "medium",
            FilesizeRange::Large => "large",
        }
    }
}

impl FromStr for FilesizeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(FilesizeRange::Small),
            "medium" => Ok(FilesizeRange::Medium),
            "large" => Ok(FilesizeRange::Large),
            other => Err(format!(
                "unknown filesize range '{}', expected small, medium or large",
                other
            )),
        }
    }
}
