//! Flat vector index with exact k-nearest-neighbour search.

use rayon::prelude::*;

use super::{DocId, DocSet};
use crate::cancel::CancellationToken;
use crate::error::SearchResult;

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dim: usize,
    /// Row-major embeddings, `dim` floats per row.
    data: Vec<f32>,
    /// Document of each row, ascending.
    docs: Vec<DocId>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
            docs: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Add an embedding. Returns false when the length does not match or
    /// `doc` does not come after every document already added.
    pub fn add(&mut self, doc: DocId, embedding: &[f32]) -> bool {
        if embedding.len() != self.dim || self.docs.last().is_some_and(|last| *last >= doc) {
            return false;
        }
        self.docs.push(doc);
        self.data.extend_from_slice(embedding);
        true
    }

    fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// Distances for every embedded document in `candidates` (all documents
    /// when `None`), in ascending document order.
    pub fn distances(
        &self,
        query: &[f32],
        candidates: Option<&DocSet>,
        cancel: &CancellationToken,
        batch_size: usize,
    ) -> SearchResult<Vec<(DocId, f32)>> {
        let batch_size = batch_size.max(1);
        let mut out = Vec::new();
        let all_rows: Vec<usize> = (0..self.docs.len())
            .filter(|&row| candidates.map_or(true, |c| c.contains(self.docs[row])))
            .collect();

        for chunk in all_rows.chunks(batch_size) {
            cancel.check()?;
            let batch: Vec<(DocId, f32)> = chunk
                .par_iter()
                .map(|&row| (self.docs[row], euclidean_distance(self.row(row), query)))
                .collect();
            out.extend(batch);
        }
        Ok(out)
    }

    /// The `k` nearest documents over the whole index, closest first,
    /// ties broken by ascending document ordinal.
    pub fn nearest(
        &self,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
        batch_size: usize,
    ) -> SearchResult<Vec<(DocId, f32)>> {
        let mut scored = self.distances(query, None, cancel, batch_size)?;
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Euclidean (L2) distance. Mismatched lengths compare the common prefix.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_2d(points: &[[f32; 2]]) -> VectorIndex {
        let mut index = VectorIndex::new(2);
        for (i, p) in points.iter().enumerate() {
            assert!(index.add(DocId(i as u32), p));
        }
        index
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(3);
        assert!(!index.add(DocId(0), &[1.0, 2.0]));
        assert!(index.is_empty());
        assert!(index.add(DocId(1), &[1.0, 2.0, 3.0]));
        assert!(!index.add(DocId(1), &[1.0, 2.0, 3.0]));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_nearest_orders_by_distance_then_doc() {
        let index = index_2d(&[[5.0, 0.0], [1.0, 0.0], [0.0, 1.0], [2.0, 0.0]]);
        let hits = index
            .nearest(&[0.0, 0.0], 3, &CancellationToken::new(), 2)
            .unwrap();
        let docs: Vec<u32> = hits.iter().map(|(d, _)| d.0).collect();
        // docs 1 and 2 tie at distance 1.0
        assert_eq!(docs, vec![1, 2, 3]);
    }

    #[test]
    fn test_distances_respect_candidates() {
        let index = index_2d(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        let candidates = DocSet::from_docs([DocId(0), DocId(2)]);
        let hits = index
            .distances(&[0.0, 0.0], Some(&candidates), &CancellationToken::new(), 1)
            .unwrap();
        assert_eq!(hits, vec![(DocId(0), 0.0), (DocId(2), 2.0)]);
    }

    #[test]
    fn test_cancellation_between_batches() {
        let index = index_2d(&[[0.0, 0.0], [1.0, 0.0]]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(index.nearest(&[0.0, 0.0], 1, &cancel, 1).is_err());
    }
}
