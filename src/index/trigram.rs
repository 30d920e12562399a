//! Trigram index over photo text (path and tags) for relevance scoring.
//!
//! Text is lower-cased and split into alphanumeric words; each word is padded
//! with two leading blanks and one trailing blank before taking 3-character
//! windows, so short words and word starts still produce trigrams.
//! Similarity is the Jaccard overlap of the two trigram sets.

use std::collections::{BTreeSet, HashMap};

use super::{DocId, DocSet};
use crate::cancel::CancellationToken;
use crate::error::SearchResult;

pub type Trigram = [char; 3];

/// Trigram set of a piece of text.
pub fn trigrams(text: &str) -> BTreeSet<Trigram> {
    let mut out = BTreeSet::new();
    let lowered = text.to_lowercase();
    for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            out.insert([window[0], window[1], window[2]]);
        }
    }
    out
}

/// Symmetric trigram similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f32 {
    jaccard(&trigrams(a), &trigrams(b))
}

fn jaccard(a: &BTreeSet<Trigram>, b: &BTreeSet<Trigram>) -> f32 {
    let shared = a.intersection(b).count();
    overlap_score(shared, a.len(), b.len())
}

fn overlap_score(shared: usize, a_len: usize, b_len: usize) -> f32 {
    let union = a_len + b_len - shared;
    if union == 0 {
        0.0
    } else {
        shared as f32 / union as f32
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrigramIndex {
    postings: HashMap<Trigram, Vec<DocId>>,
    /// Number of distinct trigrams per document.
    doc_sizes: Vec<u32>,
}

impl TrigramIndex {
    /// Build from each document's searchable text, indexed by ordinal.
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut postings: HashMap<Trigram, Vec<DocId>> = HashMap::new();
        let mut doc_sizes = Vec::new();
        for (ordinal, text) in texts.into_iter().enumerate() {
            let doc = DocId(ordinal as u32);
            let grams = trigrams(text);
            doc_sizes.push(grams.len() as u32);
            for gram in grams {
                postings.entry(gram).or_default().push(doc);
            }
        }
        Self { postings, doc_sizes }
    }

    pub fn distinct_trigrams(&self) -> usize {
        self.postings.len()
    }

    /// Similarity of `query` to every candidate, indexed by document ordinal.
    /// Non-candidates score 0.
    ///
    /// Overlap is accumulated by walking the posting list of each query
    /// trigram, checking `cancel` every `batch_size` postings.
    pub fn score(
        &self,
        query: &str,
        candidates: &DocSet,
        cancel: &CancellationToken,
        batch_size: usize,
    ) -> SearchResult<Vec<f32>> {
        let mut scores = vec![0.0f32; self.doc_sizes.len()];
        let query_grams = trigrams(query);
        if query_grams.is_empty() {
            return Ok(scores);
        }

        let batch_size = batch_size.max(1);
        let mut shared = vec![0u32; self.doc_sizes.len()];
        for gram in &query_grams {
            let Some(docs) = self.postings.get(gram) else {
                continue;
            };
            for chunk in docs.chunks(batch_size) {
                cancel.check()?;
                for doc in chunk {
                    if candidates.contains(*doc) {
                        shared[doc.0 as usize] += 1;
                    }
                }
            }
        }

        for doc in candidates.iter() {
            let i = doc.0 as usize;
            if i < shared.len() && shared[i] > 0 {
                scores[i] = overlap_score(
                    shared[i] as usize,
                    query_grams.len(),
                    self.doc_sizes[i] as usize,
                );
            }
        }
        Ok(scores)
    }
}
