//! Filter sets and their evaluation against an index.
//!
//! A [`FilterSet`] maps each facet to at most one predicate. Facets are
//! ANDed together; the values inside a set predicate are ORed. Removing one
//! facet's predicate ([`FilterSet::without`]) is how drill-sideways facet
//! counts are computed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cancel::CancellationToken;
use crate::error::{SearchError, SearchResult};
use crate::index::{DocSet, Index};
use crate::model::FilesizeRange;

/// A filterable and groupable dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetName {
    Date,
    CameraMake,
    Extension,
    Orientation,
    FilesizeRange,
    HasFaces,
    Tags,
    People,
    Duplicates,
}

impl FacetName {
    pub const ALL: [FacetName; 9] = [
        FacetName::Date,
        FacetName::CameraMake,
        FacetName::Extension,
        FacetName::Orientation,
        FacetName::FilesizeRange,
        FacetName::HasFaces,
        FacetName::Tags,
        FacetName::People,
        FacetName::Duplicates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetName::Date => "date",
            FacetName::CameraMake => "camera_make",
            FacetName::Extension => "extension",
            FacetName::Orientation => "orientation",
            FacetName::FilesizeRange => "filesize_range",
            FacetName::HasFaces => "has_faces",
            FacetName::Tags => "tags",
            FacetName::People => "people",
            FacetName::Duplicates => "duplicates",
        }
    }
}

impl fmt::Display for FacetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraint on a single facet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// Inclusive on both ends; an open end is unbounded.
    DateRange {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    AnyOf(BTreeSet<String>),
    FilesizeBuckets(BTreeSet<FilesizeRange>),
    Flag(bool),
}

impl Predicate {
    /// An empty predicate places no constraint.
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::DateRange { from, to } => from.is_none() && to.is_none(),
            Predicate::AnyOf(values) => values.is_empty(),
            Predicate::FilesizeBuckets(buckets) => buckets.is_empty(),
            Predicate::Flag(_) => false,
        }
    }
}

/// Vector similarity query. `k` restricts candidates to the k nearest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorQuery {
    pub values: Vec<f32>,
    pub k: Option<usize>,
}

/// Normalized, immutable filter state of one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterSet {
    predicates: BTreeMap<FacetName, Predicate>,
    text: Option<String>,
    vector: Option<VectorQuery>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a facet predicate. Empty predicates are dropped.
    pub fn with(mut self, facet: FacetName, predicate: Predicate) -> Self {
        if predicate.is_empty() {
            self.predicates.remove(&facet);
        } else {
            self.predicates.insert(facet, predicate);
        }
        self
    }

    pub fn with_values<I, S>(self, facet: FacetName, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(facet, Predicate::AnyOf(values.into_iter().map(Into::into).collect()))
    }

    pub fn with_date_range(self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.with(FacetName::Date, Predicate::DateRange { from, to })
    }

    pub fn with_filesize(self, buckets: impl IntoIterator<Item = FilesizeRange>) -> Self {
        self.with(
            FacetName::FilesizeRange,
            Predicate::FilesizeBuckets(buckets.into_iter().collect()),
        )
    }

    pub fn with_has_faces(self, has_faces: bool) -> Self {
        self.with(FacetName::HasFaces, Predicate::Flag(has_faces))
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    pub fn with_vector(mut self, values: Vec<f32>, k: Option<usize>) -> Self {
        self.vector = Some(VectorQuery { values, k });
        self
    }

    pub fn predicate(&self, facet: FacetName) -> Option<&Predicate> {
        self.predicates.get(&facet)
    }

    pub fn predicates(&self) -> impl Iterator<Item = (FacetName, &Predicate)> {
        self.predicates.iter().map(|(f, p)| (*f, p))
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn vector(&self) -> Option<&VectorQuery> {
        self.vector.as_ref()
    }

    /// Copy of this filter set with one facet's predicate removed.
    pub fn without(&self, facet: FacetName) -> FilterSet {
        let mut copy = self.clone();
        copy.predicates.remove(&facet);
        copy
    }
}

/// Compiles filter sets into candidate document sets.
pub struct FilterEvaluator<'a> {
    index: &'a Index,
    cancel: &'a CancellationToken,
    batch_size: usize,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(index: &'a Index, cancel: &'a CancellationToken, batch_size: usize) -> Self {
        Self {
            index,
            cancel,
            batch_size,
        }
    }

    pub fn index(&self) -> &'a Index {
        self.index
    }

    /// The k-nearest-neighbour restriction, when the filter set asks for one.
    ///
    /// The neighbours are taken over the whole library, so the restriction is
    /// independent of the facet predicates and can be shared by every
    /// drill-sideways evaluation of a request.
    pub fn restriction(&self, filters: &FilterSet) -> SearchResult<Option<DocSet>> {
        let Some(VectorQuery { values, k: Some(k) }) = filters.vector() else {
            return Ok(None);
        };
        let nearest = self
            .index
            .vectors()
            .nearest(values, *k, self.cancel, self.batch_size)?;
        Ok(Some(DocSet::from_docs(nearest.into_iter().map(|(doc, _)| doc))))
    }

    /// Candidates matching every predicate and the vector restriction.
    pub fn evaluate(&self, filters: &FilterSet) -> SearchResult<DocSet> {
        let restriction = self.restriction(filters)?;
        self.evaluate_with(filters, restriction.as_ref())
    }

    /// Like [`evaluate`](Self::evaluate) with a precomputed restriction.
    pub fn evaluate_with(
        &self,
        filters: &FilterSet,
        restriction: Option<&DocSet>,
    ) -> SearchResult<DocSet> {
        let mut candidates = match restriction {
            Some(set) => set.clone(),
            None => self.index.all_docs(),
        };
        for (facet, predicate) in filters.predicates() {
            if candidates.is_empty() {
                break;
            }
            let matching = self.matching(facet, predicate)?;
            candidates.intersect_with(&matching);
        }
        Ok(candidates)
    }

    /// Documents satisfying one facet predicate.
    pub fn matching(&self, facet: FacetName, predicate: &Predicate) -> SearchResult<DocSet> {
        let index = self.index;
        match (facet, predicate) {
            (FacetName::Date, Predicate::DateRange { from, to }) => Ok(index
                .shot_ts()
                .range(from.map(|t| t.timestamp()), to.map(|t| t.timestamp()))),
            (FacetName::CameraMake, Predicate::AnyOf(values)) => {
                Ok(index.camera_make().any_of(values))
            }
            (FacetName::Extension, Predicate::AnyOf(values)) => {
                Ok(index.extension().any_of(values))
            }
            (FacetName::Orientation, Predicate::AnyOf(values)) => {
                Ok(index.orientation().any_of(values))
            }
            (FacetName::Tags, Predicate::AnyOf(values)) => Ok(index.tags().any_of(values)),
            (FacetName::People, Predicate::AnyOf(values)) => Ok(index.people().any_of(values)),
            (FacetName::FilesizeRange, Predicate::FilesizeBuckets(buckets)) => {
                let mut out = DocSet::new();
                for bucket in buckets {
                    out.union_with(&index.filesize_bucket(*bucket));
                }
                Ok(out)
            }
            (FacetName::HasFaces, Predicate::Flag(wanted)) => {
                if *wanted {
                    Ok(index.with_faces().clone())
                } else {
                    let mut out = index.all_docs();
                    out.difference_with(index.with_faces());
                    Ok(out)
                }
            }
            (facet, predicate) => Err(SearchError::Internal(format!(
                "predicate {:?} cannot filter facet {}",
                predicate, facet
            ))),
        }
    }
}
