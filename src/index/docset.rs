//! Compressed bitmap of document ordinals.

use roaring::RoaringBitmap;

use super::DocId;

/// A set of documents, backed by a roaring bitmap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocSet(RoaringBitmap);

impl DocSet {
    pub fn new() -> Self {
        Self(RoaringBitmap::new())
    }

    /// Every ordinal in `0..universe`.
    pub fn full(universe: u32) -> Self {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert_range(0..universe);
        Self(bitmap)
    }

    pub fn from_docs(docs: impl IntoIterator<Item = DocId>) -> Self {
        Self(docs.into_iter().map(|doc| doc.0).collect())
    }

    pub fn insert(&mut self, doc: DocId) {
        self.0.insert(doc.0);
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.0.contains(doc.0)
    }

    pub fn len(&self) -> usize {
        self.0.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn intersect_with(&mut self, other: &DocSet) {
        self.0 &= &other.0;
    }

    pub fn union_with(&mut self, other: &DocSet) {
        self.0 |= &other.0;
    }

    /// Remove every document that is in `other`.
    pub fn difference_with(&mut self, other: &DocSet) {
        self.0 -= &other.0;
    }

    /// Size of the intersection without materializing it.
    pub fn intersection_len(&self, other: &DocSet) -> usize {
        self.0.intersection_len(&other.0) as usize
    }

    /// Documents in ascending ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.0.iter().map(DocId)
    }
}
