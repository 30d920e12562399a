//! Exact-match and range structures over single photo fields.

use std::collections::BTreeMap;

use super::{DocId, DocSet};

/// Value -> documents map for an exact-match field.
#[derive(Debug, Clone, Default)]
pub struct FieldPostings {
    postings: BTreeMap<String, DocSet>,
}

impl FieldPostings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: &str, doc: DocId) {
        self.postings.entry(value.to_string()).or_default().insert(doc);
    }

    pub fn get(&self, value: &str) -> Option<&DocSet> {
        self.postings.get(value)
    }

    /// Union of the postings of every value (OR within the field).
    /// Unknown values contribute nothing.
    pub fn any_of<'a>(&self, values: impl IntoIterator<Item = &'a String>) -> DocSet {
        let mut out = DocSet::new();
        for value in values {
            if let Some(set) = self.postings.get(value) {
                out.union_with(set);
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocSet)> {
        self.postings.iter()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

/// Documents sorted by a numeric field, for range scans.
#[derive(Debug, Clone)]
pub struct RangeColumn {
    entries: Vec<(i64, DocId)>,
}

impl RangeColumn {
    pub fn build(mut entries: Vec<(i64, DocId)>) -> Self {
        entries.sort_unstable();
        Self { entries }
    }

    /// Documents with `lo <= value <= hi`. Open bounds are unbounded.
    pub fn range(&self, lo: Option<i64>, hi: Option<i64>) -> DocSet {
        let start = match lo {
            Some(lo) => self.entries.partition_point(|(v, _)| *v < lo),
            None => 0,
        };
        let end = match hi {
            Some(hi) => self.entries.partition_point(|(v, _)| *v <= hi),
            None => self.entries.len(),
        };
        let slice = if start < end { &self.entries[start..end] } else { &[][..] };
        DocSet::from_docs(slice.iter().map(|(_, doc)| *doc))
    }

    /// Number of documents carrying a value.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
