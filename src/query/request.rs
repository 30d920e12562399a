//! Raw search request as clients send it.
//!
//! Every field is optional and unknown fields are ignored. Nothing here is
//! checked beyond JSON shape; see [`super::validate`].

use serde::Deserialize;

use crate::error::{SearchError, SearchResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub q: Option<String>,
    pub filters: Option<RawFilters>,
    pub vector: Option<Vec<f64>>,
    pub similarity_k: Option<i64>,
    pub sort: Option<RawSort>,
    pub page: Option<RawPage>,
    /// Alias for `page.cursor`.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFilters {
    pub date: Option<RawDateRange>,
    pub camera_make: Option<Vec<String>>,
    pub extension: Option<Vec<String>>,
    pub orientation: Option<Vec<String>>,
    pub filesize_range: Option<OneOrMany>,
    pub has_faces: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub people: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSort {
    pub by: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPage {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// A single value or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl SearchRequest {
    pub fn from_json(body: &str) -> SearchResult<Self> {
        serde_json::from_str(body).map_err(|e| SearchError::MalformedInput(e.to_string()))
    }

    /// The cursor token, from `page.cursor` or the top-level alias.
    pub fn cursor_token(&self) -> Option<&str> {
        self.page
            .as_ref()
            .and_then(|p| p.cursor.as_deref())
            .or(self.cursor.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
