//! Deterministic ordering of candidate photos.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::filter::FilterSet;
use crate::cancel::CancellationToken;
use crate::error::{SearchError, SearchResult};
use crate::index::{DocId, DocSet, Index};
use crate::model::PhotoId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    ShotTs,
    Filesize,
    Path,
    Relevance,
    Similarity,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::ShotTs => "shot_ts",
            SortField::Filesize => "filesize",
            SortField::Path => "path",
            SortField::Relevance => "relevance",
            SortField::Similarity => "similarity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shot_ts" => Some(SortField::ShotTs),
            "filesize" => Some(SortField::Filesize),
            "path" => Some(SortField::Path),
            "relevance" => Some(SortField::Relevance),
            "similarity" => Some(SortField::Similarity),
            _ => None,
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Relevance only runs best-first and similarity only nearest-first, so
    /// the direction of those two is fixed.
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        let direction = match field {
            SortField::Relevance => SortDirection::Desc,
            SortField::Similarity => SortDirection::Asc,
            _ => direction,
        };
        Self { field, direction }
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new(SortField::ShotTs, SortDirection::Desc)
    }
}

/// Primary sort value of one hit.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// Milliseconds since the epoch.
    Timestamp(i64),
    Integer(i64),
    Text(String),
    Score(f32),
    Distance(f32),
    /// No value for the sort field. Sorts after every present key.
    Missing,
}

impl SortKey {
    /// Whether this key kind can come out of ranking by `field`.
    pub fn fits(&self, field: SortField) -> bool {
        matches!(
            (self, field),
            (SortKey::Missing, SortField::ShotTs | SortField::Similarity)
                | (SortKey::Timestamp(_), SortField::ShotTs)
                | (SortKey::Integer(_), SortField::Filesize)
                | (SortKey::Text(_), SortField::Path)
                | (SortKey::Score(_), SortField::Relevance)
                | (SortKey::Distance(_), SortField::Similarity)
        )
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Timestamp(_) => 0,
            SortKey::Integer(_) => 1,
            SortKey::Text(_) => 2,
            SortKey::Score(_) => 3,
            SortKey::Distance(_) => 4,
            SortKey::Missing => 5,
        }
    }

    fn cmp_present(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Timestamp(a), SortKey::Timestamp(b)) => a.cmp(b),
            (SortKey::Integer(a), SortKey::Integer(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Score(a), SortKey::Score(b)) => a.total_cmp(b),
            (SortKey::Distance(a), SortKey::Distance(b)) => a.total_cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Total order over `(key, photo_id)` positions for one sort.
pub fn compare(
    sort: &SortSpec,
    a: (&SortKey, PhotoId),
    b: (&SortKey, PhotoId),
) -> Ordering {
    let primary = match (a.0, b.0) {
        (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
        (SortKey::Missing, _) => Ordering::Greater,
        (_, SortKey::Missing) => Ordering::Less,
        (x, y) => match sort.direction {
            SortDirection::Asc => x.cmp_present(y),
            SortDirection::Desc => x.cmp_present(y).reverse(),
        },
    };
    primary.then(a.1.cmp(&b.1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    pub doc: DocId,
    pub photo_id: PhotoId,
    pub key: SortKey,
}

/// Index of the first hit strictly after the `(key, photo_id)` position.
///
/// The position does not have to belong to a hit in `hits`: when the photo
/// it came from is gone from the current snapshot, the page resumes at the
/// next photo that would have followed it.
pub fn resume_index(hits: &[RankedHit], sort: &SortSpec, key: &SortKey, photo_id: PhotoId) -> usize {
    hits.partition_point(|hit| compare(sort, (&hit.key, hit.photo_id), (key, photo_id)) != Ordering::Greater)
}

pub struct Ranker<'a> {
    index: &'a Index,
    cancel: &'a CancellationToken,
    batch_size: usize,
}

impl<'a> Ranker<'a> {
    pub fn new(index: &'a Index, cancel: &'a CancellationToken, batch_size: usize) -> Self {
        Self {
            index,
            cancel,
            batch_size: batch_size.max(1),
        }
    }

    /// Every candidate in its final order.
    pub fn rank(
        &self,
        candidates: &DocSet,
        filters: &FilterSet,
        sort: &SortSpec,
    ) -> SearchResult<Vec<RankedHit>> {
        let docs: Vec<DocId> = candidates.iter().collect();

        let keys: Vec<SortKey> = match sort.field {
            SortField::Relevance => {
                let query = filters.text().ok_or_else(|| {
                    SearchError::Internal("relevance sort without a text query".to_string())
                })?;
                let scores = self
                    .index
                    .trigrams()
                    .score(query, candidates, self.cancel, self.batch_size)?;
                docs.iter()
                    .map(|doc| SortKey::Score(scores.get(doc.0 as usize).copied().unwrap_or(0.0)))
                    .collect()
            }
            SortField::Similarity => {
                let query = filters.vector().ok_or_else(|| {
                    SearchError::Internal("similarity sort without a query vector".to_string())
                })?;
                let distances = self.index.vectors().distances(
                    &query.values,
                    Some(candidates),
                    self.cancel,
                    self.batch_size,
                )?;
                // both lists ascend by document, so merge them
                let mut distances = distances.into_iter().peekable();
                docs.iter()
                    .map(|doc| match distances.peek() {
                        Some((d, dist)) if d == doc => {
                            let key = SortKey::Distance(*dist);
                            distances.next();
                            key
                        }
                        _ => SortKey::Missing,
                    })
                    .collect()
            }
            field => {
                let mut keys = Vec::with_capacity(docs.len());
                for chunk in docs.chunks(self.batch_size) {
                    self.cancel.check()?;
                    for doc in chunk {
                        keys.push(self.field_key(*doc, field)?);
                    }
                }
                keys
            }
        };

        let mut hits = Vec::with_capacity(docs.len());
        for (doc, key) in docs.into_iter().zip(keys) {
            let photo_id = self.index.photo(doc)?.id;
            hits.push(RankedHit { doc, photo_id, key });
        }

        self.cancel.check()?;
        hits.par_sort_unstable_by(|a, b| compare(sort, (&a.key, a.photo_id), (&b.key, b.photo_id)));
        Ok(hits)
    }

    fn field_key(&self, doc: DocId, field: SortField) -> SearchResult<SortKey> {
        let photo = self.index.photo(doc)?;
        Ok(match field {
            SortField::ShotTs => photo
                .shot_ts
                .map(|ts| SortKey::Timestamp(ts.timestamp_millis()))
                .unwrap_or(SortKey::Missing),
            SortField::Filesize => SortKey::Integer(photo.filesize.min(i64::MAX as u64) as i64),
            SortField::Path => SortKey::Text(photo.path.clone()),
            SortField::Relevance | SortField::Similarity => {
                return Err(SearchError::Internal(format!("{} is not a photo field", field)))
            }
        })
    }
}
