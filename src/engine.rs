//! Runs validated queries against the current index snapshot.

use chrono::SecondsFormat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::config::{Config, SearchConfig};
use crate::error::{SearchError, SearchResult};
use crate::index::Index;
use crate::model::PhotoId;
use crate::query::rank::{resume_index, RankedHit};
use crate::query::{
    Cursor, FacetCounts, FacetName, FacetRegistry, FilterEvaluator, QueryValidator, Ranker,
    SearchRequest, SortField, SortKey, ValidatedQuery,
};

#[derive(Debug, Clone, Serialize)]
pub struct FaceHit {
    pub person_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoHit {
    pub photo_id: PhotoId,
    pub path: String,
    pub ext: String,
    pub camera_make: Option<String>,
    pub orientation: Option<String>,
    pub shot_ts: Option<String>,
    pub filesize: u64,
    pub tags: Vec<String>,
    pub people: Vec<String>,
    pub faces: Vec<FaceHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hits {
    pub items: Vec<PhotoHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Hits,
    /// Number of photos matching every filter, across all pages.
    pub total: usize,
    pub facets: BTreeMap<FacetName, FacetCounts>,
    pub limit_applied: usize,
}

pub struct SearchEngine {
    snapshot: RwLock<Arc<Index>>,
    registry: FacetRegistry,
    validator: QueryValidator,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(index: Index, config: &Config) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(index)),
            registry: FacetRegistry::default(),
            validator: QueryValidator::new(config.search.clone(), config.index.embedding_dim),
            config: config.search.clone(),
        }
    }

    /// The snapshot new queries run against.
    pub fn snapshot(&self) -> SearchResult<Arc<Index>> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| SearchError::Internal("index snapshot lock poisoned".to_string()))
    }

    /// Swap in a refreshed index. Queries already running keep the snapshot
    /// they started with.
    pub fn replace_snapshot(&self, index: Index) -> SearchResult<()> {
        let generation = index.generation();
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| SearchError::Internal("index snapshot lock poisoned".to_string()))?;
        *guard = Arc::new(index);
        info!("Switched to index generation {}", generation);
        Ok(())
    }

    pub fn search_json(&self, body: &str, cancel: &CancellationToken) -> SearchResult<SearchResponse> {
        let query = self.validator.validate_json(body)?;
        let index = self.snapshot()?;
        self.execute(&index, &query, cancel)
    }

    pub fn search(&self, request: &SearchRequest, cancel: &CancellationToken) -> SearchResult<SearchResponse> {
        let query = self.validator.validate(request)?;
        let index = self.snapshot()?;
        self.execute(&index, &query, cancel)
    }

    /// Run one query end to end against `index`.
    pub fn execute(
        &self,
        index: &Index,
        query: &ValidatedQuery,
        cancel: &CancellationToken,
    ) -> SearchResult<SearchResponse> {
        let started = Instant::now();
        let batch_size = self.config.scan_batch_size;
        let evaluator = FilterEvaluator::new(index, cancel, batch_size);

        let restriction = evaluator.restriction(&query.filters)?;
        let candidates = evaluator.evaluate_with(&query.filters, restriction.as_ref())?;

        let (facets, ranked) = rayon::join(
            || {
                self.registry.compute_all(
                    &evaluator,
                    &query.filters,
                    restriction.as_ref(),
                    &candidates,
                )
            },
            || Ranker::new(index, cancel, batch_size).rank(&candidates, &query.filters, &query.sort),
        );
        let facets = facets?;
        let ranked = ranked?;

        let start = match &query.cursor {
            Some(cursor) => resume_index(&ranked, &query.sort, &cursor.key, cursor.photo_id),
            None => 0,
        };
        let end = start.saturating_add(query.limit_applied).min(ranked.len());
        let page = &ranked[start..end];

        let next_cursor = match page.last() {
            Some(last) if end < ranked.len() => Some(
                Cursor {
                    sort: query.sort,
                    key: last.key.clone(),
                    photo_id: last.photo_id,
                    fingerprint: query.fingerprint.clone(),
                }
                .encode()?,
            ),
            _ => None,
        };

        let items = page
            .iter()
            .map(|hit| photo_hit(index, hit, query.sort.field))
            .collect::<SearchResult<Vec<_>>>()?;

        debug!(
            "Search on generation {}: {} matches, returned {} from offset {} (limit {}) in {:?}",
            index.generation(),
            ranked.len(),
            items.len(),
            start,
            query.limit_applied,
            started.elapsed()
        );

        Ok(SearchResponse {
            hits: Hits { items, next_cursor },
            total: candidates.len(),
            facets,
            limit_applied: query.limit_applied,
        })
    }
}

fn photo_hit(index: &Index, hit: &RankedHit, sort: SortField) -> SearchResult<PhotoHit> {
    let photo = index.photo(hit.doc)?;
    if photo.id != hit.photo_id {
        return Err(SearchError::IndexInconsistent(format!(
            "document {} is photo {}, ranked as {}",
            hit.doc.0, photo.id, hit.photo_id
        )));
    }

    let (score, distance) = match (sort, &hit.key) {
        (SortField::Relevance, SortKey::Score(s)) => (Some(*s), None),
        (SortField::Similarity, SortKey::Distance(d)) => (None, Some(*d)),
        _ => (None, None),
    };

    Ok(PhotoHit {
        photo_id: photo.id,
        path: photo.path.clone(),
        ext: photo.extension.clone(),
        camera_make: photo.camera_make.clone(),
        orientation: photo.orientation.clone(),
        shot_ts: photo
            .shot_ts
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        filesize: photo.filesize,
        tags: photo.tags.clone(),
        people: index.people_in(photo),
        faces: photo
            .faces
            .iter()
            .map(|f| FaceHit {
                person_id: f.person_id,
            })
            .collect(),
        score,
        distance,
    })
}
