//! Exact and near duplicate group tables.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

use super::DocSet;
use crate::model::Photo;

/// Number of duplicate groups (size > 1) inside a candidate set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateCounts {
    pub exact: u64,
    pub near: u64,
}

/// Group membership per document. Every photo with a hash belongs to exactly
/// one group of each kind (possibly a singleton).
#[derive(Debug, Clone, Default)]
pub struct DuplicateGroups {
    exact: Vec<Option<u32>>,
    near: Vec<Option<u32>>,
    exact_group_count: usize,
    near_group_count: usize,
}

impl DuplicateGroups {
    /// Build groups for photos laid out by document ordinal.
    ///
    /// Exact groups key on the content hash. Near groups use a greedy single
    /// pass: each ungrouped photo starts a group and pulls in every later
    /// ungrouped photo within `threshold` Hamming bits of it.
    pub fn build(photos: &[Photo], threshold: u32) -> Self {
        let mut exact = vec![None; photos.len()];
        let mut by_hash: HashMap<&str, u32> = HashMap::new();
        for (i, photo) in photos.iter().enumerate() {
            if let Some(hash) = photo.content_hash.as_deref().filter(|h| !h.is_empty()) {
                let next = by_hash.len() as u32;
                exact[i] = Some(*by_hash.entry(hash).or_insert(next));
            }
        }

        let decoded: Vec<Option<Vec<u8>>> = photos
            .iter()
            .map(|photo| {
                let hash = photo.perceptual_hash.as_deref()?;
                match BASE64.decode(hash) {
                    Ok(bytes) if !bytes.is_empty() => Some(bytes),
                    _ => {
                        warn!("Skipping undecodable perceptual hash for photo {}", photo.id);
                        None
                    }
                }
            })
            .collect();

        let mut near = vec![None; photos.len()];
        let mut near_group_count = 0u32;
        for i in 0..decoded.len() {
            if near[i].is_some() {
                continue;
            }
            let Some(hash1) = &decoded[i] else {
                continue;
            };
            let group = near_group_count;
            near_group_count += 1;
            near[i] = Some(group);

            for j in (i + 1)..decoded.len() {
                if near[j].is_some() {
                    continue;
                }
                let Some(hash2) = &decoded[j] else {
                    continue;
                };
                if let Some(distance) = hamming_distance(hash1, hash2) {
                    if distance <= threshold {
                        near[j] = Some(group);
                    }
                }
            }
        }

        Self {
            exact,
            near,
            exact_group_count: by_hash.len(),
            near_group_count: near_group_count as usize,
        }
    }

    /// Exact and near groups having at least two members in `candidates`.
    pub fn count_in(&self, candidates: &DocSet) -> DuplicateCounts {
        DuplicateCounts {
            exact: groups_with_pairs(&self.exact, candidates),
            near: groups_with_pairs(&self.near, candidates),
        }
    }

    pub fn exact_group_count(&self) -> usize {
        self.exact_group_count
    }

    pub fn near_group_count(&self) -> usize {
        self.near_group_count
    }
}

fn groups_with_pairs(membership: &[Option<u32>], candidates: &DocSet) -> u64 {
    let mut sizes: HashMap<u32, u32> = HashMap::new();
    for doc in candidates.iter() {
        if let Some(Some(group)) = membership.get(doc.0 as usize) {
            *sizes.entry(*group).or_insert(0) += 1;
        }
    }
    sizes.values().filter(|&&n| n > 1).count() as u64
}

/// Hamming distance between two decoded hashes; `None` when lengths differ.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DocId;

    fn photo(id: i64, sha: Option<&str>, phash: Option<&[u8]>) -> Photo {
        let mut p = Photo::new(id, format!("/p/{}.jpg", id));
        p.content_hash = sha.map(str::to_string);
        p.perceptual_hash = phash.map(|bytes| BASE64.encode(bytes));
        p
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(&[0b1010], &[0b0101]), Some(4));
        assert_eq!(hamming_distance(&[0xff, 0x00], &[0xff, 0x00]), Some(0));
        assert_eq!(hamming_distance(&[0x00], &[0x00, 0x00]), None);
    }

    #[test]
    fn test_exact_groups_restricted_to_candidates() {
        let photos = vec![
            photo(1, Some("aaa"), None),
            photo(2, Some("aaa"), None),
            photo(3, Some("bbb"), None),
            photo(4, Some("bbb"), None),
            photo(5, Some("ccc"), None),
            photo(6, None, None),
        ];
        let groups = DuplicateGroups::build(&photos, 4);
        assert_eq!(groups.exact_group_count(), 3);

        let all = DocSet::full(6);
        assert_eq!(groups.count_in(&all).exact, 2);

        // only one member of the "bbb" group remains
        let some = DocSet::from_docs([0, 1, 2, 4, 5].map(DocId));
        assert_eq!(groups.count_in(&some).exact, 1);
    }

    #[test]
    fn test_near_groups_within_threshold() {
        let photos = vec![
            photo(1, None, Some(&[0b0000_0000, 0])),
            photo(2, None, Some(&[0b0000_0011, 0])),
            photo(3, None, Some(&[0b1111_1111, 0xff])),
            photo(4, None, Some(&[0b0000_0001, 0])),
            photo(5, None, None),
        ];
        let groups = DuplicateGroups::build(&photos, 2);
        // {1, 2, 4} and {3}
        assert_eq!(groups.near_group_count(), 2);
        assert_eq!(groups.count_in(&DocSet::full(5)), DuplicateCounts { exact: 0, near: 1 });

        let without_group = DocSet::from_docs([0, 2, 4].map(DocId));
        assert_eq!(groups.count_in(&without_group).near, 0);
    }

    #[test]
    fn test_undecodable_hash_is_skipped() {
        let mut bad = photo(1, None, None);
        bad.perceptual_hash = Some("not base64 !!".to_string());
        let groups = DuplicateGroups::build(&[bad, photo(2, None, Some(&[1]))], 8);
        assert_eq!(groups.near_group_count(), 1);
    }

    #[test]
    fn test_empty_candidates() {
        let groups = DuplicateGroups::build(&[photo(1, Some("a"), None), photo(2, Some("a"), None)], 0);
        assert_eq!(groups.count_in(&DocSet::new()), DuplicateCounts::default());
    }
}
