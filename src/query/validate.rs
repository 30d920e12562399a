//! Request normalization and bounds checking.
//!
//! Validation is all-or-nothing: every violated field is reported together
//! and nothing of a rejected request reaches the evaluator.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use super::cursor::{Cursor, Fingerprint};
use super::filter::{FacetName, FilterSet};
use super::rank::{SortDirection, SortField, SortSpec};
use super::request::{RawDateRange, RawFilters, SearchRequest};
use crate::config::SearchConfig;
use crate::error::{FieldError, SearchError, SearchResult};
use crate::model::FilesizeRange;

/// A request that passed validation, ready to execute.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub filters: FilterSet,
    pub sort: SortSpec,
    pub limit_applied: usize,
    /// Verified against `sort` and `fingerprint`.
    pub cursor: Option<Cursor>,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone)]
pub struct QueryValidator {
    config: SearchConfig,
    embedding_dim: usize,
}

impl QueryValidator {
    pub fn new(config: SearchConfig, embedding_dim: usize) -> Self {
        Self {
            config,
            embedding_dim,
        }
    }

    pub fn validate_json(&self, body: &str) -> SearchResult<ValidatedQuery> {
        self.validate(&SearchRequest::from_json(body)?)
    }

    pub fn validate(&self, request: &SearchRequest) -> SearchResult<ValidatedQuery> {
        let mut errors = Vec::new();
        let raw = request.filters.clone().unwrap_or_default();

        let mut filters = FilterSet::new();
        for (facet, values) in [
            (FacetName::CameraMake, &raw.camera_make),
            (FacetName::Extension, &raw.extension),
            (FacetName::Orientation, &raw.orientation),
            (FacetName::Tags, &raw.tags),
            (FacetName::People, &raw.people),
        ] {
            let normalized = self.value_set(facet, values.as_deref().unwrap_or_default())?;
            filters = filters.with_values(facet, normalized);
        }

        let buckets = self.filesize_buckets(&raw, &mut errors)?;
        filters = filters.with_filesize(buckets);

        if let Some(has_faces) = raw.has_faces {
            filters = filters.with_has_faces(has_faces);
        }

        if let Some(date) = &raw.date {
            if let Some((from, to)) = parse_date_range(date, &mut errors) {
                filters = filters.with_date_range(from, to);
            }
        }

        let text = request
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        if let Some(text) = text {
            filters = filters.with_text(text);
        }

        let vector = self.vector(request, &mut errors);
        let k = match request.similarity_k {
            None => None,
            Some(k) if k < 1 => {
                errors.push(FieldError::new("similarity_k", "must be at least 1"));
                None
            }
            Some(_) if request.vector.is_none() => {
                errors.push(FieldError::new("similarity_k", "requires a query vector"));
                None
            }
            Some(k) => Some(k as usize),
        };
        let has_vector = request.vector.is_some();
        if let Some(values) = vector {
            filters = filters.with_vector(values, k);
        }

        let sort = parse_sort(request, text.is_some(), has_vector, &mut errors);
        let limit_applied = self.limit(request, &mut errors);

        if !errors.is_empty() {
            debug!("Rejected search request: {:?}", errors);
            return Err(SearchError::Validation(errors));
        }

        let fingerprint = Fingerprint::of(&filters, &sort)?;
        let cursor = match request.cursor_token() {
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                cursor.verify(&sort, &fingerprint)?;
                Some(cursor)
            }
            None => None,
        };

        Ok(ValidatedQuery {
            filters,
            sort,
            limit_applied,
            cursor,
            fingerprint,
        })
    }

    /// Trimmed, deduplicated values of one set filter.
    fn value_set(&self, facet: FacetName, values: &[String]) -> SearchResult<BTreeSet<String>> {
        let normalized: BTreeSet<String> = values
            .iter()
            .map(|v| {
                let v = v.trim();
                match facet {
                    FacetName::Extension => v.trim_start_matches('.').to_lowercase(),
                    _ => v.to_string(),
                }
            })
            .filter(|v| !v.is_empty())
            .collect();

        if normalized.len() > self.config.max_filter_values {
            return Err(SearchError::CapacityExceeded {
                field: format!("filters.{}", facet),
                count: normalized.len(),
                max: self.config.max_filter_values,
            });
        }
        Ok(normalized)
    }

    fn filesize_buckets(
        &self,
        raw: &RawFilters,
        errors: &mut Vec<FieldError>,
    ) -> SearchResult<BTreeSet<FilesizeRange>> {
        let values = raw
            .filesize_range
            .clone()
            .map(|v| v.into_vec())
            .unwrap_or_default();
        let names = self.value_set(FacetName::FilesizeRange, &values)?;

        let mut buckets = BTreeSet::new();
        for name in names {
            match name.parse::<FilesizeRange>() {
                Ok(bucket) => {
                    buckets.insert(bucket);
                }
                Err(reason) => errors.push(FieldError::new("filters.filesize_range", reason)),
            }
        }
        Ok(buckets)
    }

    fn vector(&self, request: &SearchRequest, errors: &mut Vec<FieldError>) -> Option<Vec<f32>> {
        let raw = request.vector.as_ref()?;
        if raw.len() != self.embedding_dim {
            errors.push(FieldError::new(
                "vector",
                format!("expected {} dimensions, got {}", self.embedding_dim, raw.len()),
            ));
            return None;
        }
        let values: Vec<f32> = raw.iter().map(|v| *v as f32).collect();
        if values.iter().any(|v| !v.is_finite()) {
            errors.push(FieldError::new("vector", "components must be finite"));
            return None;
        }
        Some(values)
    }

    fn limit(&self, request: &SearchRequest, errors: &mut Vec<FieldError>) -> usize {
        match request.page.as_ref().and_then(|p| p.limit) {
            None | Some(0) => self.config.default_limit.min(self.config.max_limit),
            Some(n) if n < 0 => {
                errors.push(FieldError::new("page.limit", "must not be negative"));
                0
            }
            Some(n) => (n as u64).min(self.config.max_limit as u64) as usize,
        }
    }
}

fn parse_sort(
    request: &SearchRequest,
    has_text: bool,
    has_vector: bool,
    errors: &mut Vec<FieldError>,
) -> SortSpec {
    let raw = request.sort.clone().unwrap_or_default();

    let field = match raw.by.as_deref().map(str::trim) {
        None | Some("") if has_vector => SortField::Similarity,
        None | Some("") if has_text => SortField::Relevance,
        None | Some("") => SortField::ShotTs,
        Some(by) => match SortField::parse(by) {
            Some(field) => field,
            None => {
                errors.push(FieldError::new(
                    "sort.by",
                    format!(
                        "unknown sort '{}', expected shot_ts, filesize, path, relevance or similarity",
                        by
                    ),
                ));
                SortField::ShotTs
            }
        },
    };

    let direction = match raw.dir.as_deref().map(str::trim) {
        None | Some("") => SortDirection::Desc,
        Some(dir) => SortDirection::parse(dir).unwrap_or_else(|| {
            errors.push(FieldError::new(
                "sort.dir",
                format!("unknown direction '{}', expected asc or desc", dir),
            ));
            SortDirection::Desc
        }),
    };

    if field == SortField::Relevance && !has_text {
        errors.push(FieldError::new("sort.by", "relevance sort requires a non-blank q"));
    }
    if field == SortField::Similarity && !has_vector {
        errors.push(FieldError::new("sort.by", "similarity sort requires a query vector"));
    }

    SortSpec::new(field, direction)
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// `YYYY-MM-DD` or RFC 3339. A plain date bounds the whole day: the start
/// of it for `from`, the end of it for `to`. The year range applies to the
/// date as written, before any offset is applied.
fn parse_date(field: &str, value: &str, end: bool, errors: &mut Vec<FieldError>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let parsed = if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if end { end_of_day() } else { NaiveTime::MIN };
        Some((date, Utc.from_utc_datetime(&date.and_time(time))))
    } else {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| (dt.date_naive(), dt.with_timezone(&Utc)))
    };

    match parsed {
        None => {
            errors.push(FieldError::new(
                field,
                format!("'{}' is not a YYYY-MM-DD or RFC 3339 date", value),
            ));
            None
        }
        Some((written, _)) if !(1900..=2100).contains(&written.year()) => {
            errors.push(FieldError::new(
                field,
                format!("'{}' is outside 1900-01-01 to 2100-12-31", value),
            ));
            None
        }
        Some((_, dt)) => Some(dt),
    }
}

/// Returns `None` when either end was rejected.
fn parse_date_range(
    raw: &RawDateRange,
    errors: &mut Vec<FieldError>,
) -> Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let before = errors.len();
    let from = raw
        .from
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| parse_date("filters.date.from", v, false, errors));
    let to = raw
        .to
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| parse_date("filters.date.to", v, true, errors));
    if errors.len() > before {
        return None;
    }

    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            errors.push(FieldError::new("filters.date", "from is after to"));
            return None;
        }
    }
    Some((from, to))
}
