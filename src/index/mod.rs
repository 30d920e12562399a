//! Read-optimized snapshot of the photo library.
//!
//! An [`Index`] is built once from a set of photos and never mutated; a
//! refreshed library produces a new `Index`. Photos are addressed by dense
//! [`DocId`] ordinals assigned in ascending [`PhotoId`] order, so comparing
//! ordinals is the same as comparing photo ids.

mod docset;
pub mod duplicates;
pub mod postings;
pub mod trigram;
pub mod vector;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{info, warn};

pub use docset::DocSet;
pub use duplicates::{DuplicateCounts, DuplicateGroups};
pub use postings::{FieldPostings, RangeColumn};
pub use trigram::TrigramIndex;
pub use vector::VectorIndex;

use crate::config::IndexConfig;
use crate::error::{SearchError, SearchResult};
use crate::model::{FilesizeRange, Person, Photo, PhotoId};

/// Dense document ordinal within one index snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(pub u32);

/// Summary counts of an index snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub photos: usize,
    pub dated_photos: usize,
    pub photos_with_faces: usize,
    pub people: usize,
    pub tags: usize,
    pub embeddings: usize,
    pub embedding_dim: usize,
    pub trigrams: usize,
    pub exact_groups: usize,
    pub near_groups: usize,
}

pub struct Index {
    generation: u64,
    photos: Vec<Photo>,
    by_photo_id: HashMap<PhotoId, DocId>,
    people: HashMap<i64, String>,

    extension: FieldPostings,
    camera_make: FieldPostings,
    orientation: FieldPostings,
    tags: FieldPostings,
    people_postings: FieldPostings,
    filesize_buckets: BTreeMap<FilesizeRange, DocSet>,
    with_faces: DocSet,

    shot_ts: RangeColumn,

    trigrams: TrigramIndex,
    vectors: VectorIndex,
    duplicates: DuplicateGroups,
}

impl Index {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn universe(&self) -> u32 {
        self.photos.len() as u32
    }

    pub fn all_docs(&self) -> DocSet {
        DocSet::full(self.universe())
    }

    /// Photo for a document ordinal. An ordinal outside the snapshot means
    /// the caller mixed snapshots, which is reported rather than ignored.
    pub fn photo(&self, doc: DocId) -> SearchResult<&Photo> {
        self.photos.get(doc.0 as usize).ok_or_else(|| {
            SearchError::IndexInconsistent(format!(
                "document {} outside snapshot of {} photos",
                doc.0,
                self.photos.len()
            ))
        })
    }

    pub fn doc_of(&self, id: PhotoId) -> Option<DocId> {
        self.by_photo_id.get(&id).copied()
    }

    pub fn person_name(&self, person_id: i64) -> Option<&str> {
        self.people.get(&person_id).map(String::as_str)
    }

    /// Distinct names of the people appearing in a photo, sorted.
    pub fn people_in(&self, photo: &Photo) -> Vec<String> {
        let mut names: Vec<String> = photo
            .faces
            .iter()
            .filter_map(|f| f.person_id)
            .filter_map(|id| self.person_name(id))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn extension(&self) -> &FieldPostings {
        &self.extension
    }

    pub fn camera_make(&self) -> &FieldPostings {
        &self.camera_make
    }

    pub fn orientation(&self) -> &FieldPostings {
        &self.orientation
    }

    pub fn tags(&self) -> &FieldPostings {
        &self.tags
    }

    /// Person name -> photos with at least one face of that person.
    pub fn people(&self) -> &FieldPostings {
        &self.people_postings
    }

    pub fn filesize_bucket(&self, range: FilesizeRange) -> DocSet {
        self.filesize_buckets
            .get(&range)
            .cloned()
            .unwrap_or_default()
    }

    pub fn with_faces(&self) -> &DocSet {
        &self.with_faces
    }

    pub fn shot_ts(&self) -> &RangeColumn {
        &self.shot_ts
    }

    pub fn trigrams(&self) -> &TrigramIndex {
        &self.trigrams
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn duplicates(&self) -> &DuplicateGroups {
        &self.duplicates
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            generation: self.generation,
            photos: self.photos.len(),
            dated_photos: self.shot_ts.len(),
            photos_with_faces: self.with_faces.len(),
            people: self.people_postings.len(),
            tags: self.tags.len(),
            embeddings: self.vectors.len(),
            embedding_dim: self.vectors.dim(),
            trigrams: self.trigrams.distinct_trigrams(),
            exact_groups: self.duplicates.exact_group_count(),
            near_groups: self.duplicates.near_group_count(),
        }
    }
}

/// Text the trigram index covers for a photo: its path and tags.
pub fn searchable_text(photo: &Photo) -> String {
    let mut text = photo.path.clone();
    for tag in &photo.tags {
        text.push(' ');
        text.push_str(tag);
    }
    text
}

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Collects photos and people, then builds an immutable [`Index`].
#[derive(Debug, Default)]
pub struct IndexBuilder {
    config: IndexConfig,
    photos: Vec<Photo>,
    people: HashMap<i64, String>,
}

impl IndexBuilder {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            photos: Vec::new(),
            people: HashMap::new(),
        }
    }

    pub fn add_person(&mut self, person: Person) -> &mut Self {
        self.people.insert(person.id, person.name);
        self
    }

    pub fn add_photo(&mut self, photo: Photo) -> &mut Self {
        self.photos.push(photo);
        self
    }

    pub fn build(self) -> SearchResult<Index> {
        let IndexBuilder {
            config,
            mut photos,
            people,
        } = self;

        photos.sort_by_key(|p| p.id);
        if let Some(pair) = photos.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(SearchError::IndexInconsistent(format!(
                "photo {} appears more than once",
                pair[0].id
            )));
        }
        if photos.len() > u32::MAX as usize {
            return Err(SearchError::IndexInconsistent(format!(
                "{} photos exceeds the index capacity",
                photos.len()
            )));
        }

        let mut by_photo_id = HashMap::with_capacity(photos.len());
        let mut extension = FieldPostings::new();
        let mut camera_make = FieldPostings::new();
        let mut orientation = FieldPostings::new();
        let mut tags = FieldPostings::new();
        let mut people_postings = FieldPostings::new();
        let mut with_faces = DocSet::new();
        let mut shot_ts = Vec::new();
        let mut filesize = Vec::with_capacity(photos.len());
        let mut vectors = VectorIndex::new(config.embedding_dim);

        for (ordinal, photo) in photos.iter_mut().enumerate() {
            let doc = DocId(ordinal as u32);
            by_photo_id.insert(photo.id, doc);

            photo.tags.sort();
            photo.tags.dedup();

            if !photo.extension.is_empty() {
                extension.add(&photo.extension, doc);
            }
            if let Some(make) = photo.camera_make.as_deref().filter(|m| !m.is_empty()) {
                camera_make.add(make, doc);
            }
            if let Some(o) = photo.orientation.as_deref().filter(|o| !o.is_empty()) {
                orientation.add(o, doc);
            }
            for tag in &photo.tags {
                tags.add(tag, doc);
            }
            for face in &photo.faces {
                if let Some(person_id) = face.person_id {
                    let name = people.get(&person_id).ok_or_else(|| {
                        SearchError::IndexInconsistent(format!(
                            "photo {} has a face linked to unknown person {}",
                            photo.id, person_id
                        ))
                    })?;
                    people_postings.add(name, doc);
                }
            }
            if photo.has_faces() {
                with_faces.insert(doc);
            }
            if let Some(ts) = photo.shot_ts {
                shot_ts.push((ts.timestamp(), doc));
            }
            filesize.push((clamp_i64(photo.filesize), doc));

            if let Some(embedding) = &photo.embedding {
                if !vectors.add(doc, embedding) {
                    warn!(
                        "Skipping embedding of photo {}: dimension {} != {}",
                        photo.id,
                        embedding.len(),
                        config.embedding_dim
                    );
                }
            }
        }

        let filesize = RangeColumn::build(filesize);
        let filesize_buckets = FilesizeRange::ALL
            .iter()
            .map(|range| {
                let (lo, hi) = range.bounds();
                let hi = if hi == u64::MAX { None } else { Some(clamp_i64(hi) - 1) };
                (*range, filesize.range(Some(clamp_i64(lo)), hi))
            })
            .collect();

        let texts: Vec<String> = photos.iter().map(searchable_text).collect();
        let trigrams = TrigramIndex::build(texts.iter().map(String::as_str));
        let duplicates = DuplicateGroups::build(&photos, config.near_duplicate_threshold);

        let index = Index {
            generation: GENERATION.fetch_add(1, Ordering::SeqCst),
            photos,
            by_photo_id,
            people,
            extension,
            camera_make,
            orientation,
            tags,
            people_postings,
            filesize_buckets,
            with_faces,
            shot_ts: RangeColumn::build(shot_ts),
            trigrams,
            vectors,
            duplicates,
        };

        let stats = index.stats();
        info!(
            "Built index generation {}: {} photos, {} tags, {} people, {} embeddings",
            stats.generation, stats.photos, stats.tags, stats.people, stats.embeddings
        );
        Ok(index)
    }
}

fn clamp_i64(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}
