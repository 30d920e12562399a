//! Drill-sideways facet counts.
//!
//! Each facet counts the candidates of the request with its own predicate
//! removed, so selecting a value never hides the alternatives in the same
//! facet. Counts are of distinct photos.

use chrono::Datelike;
use rayon::prelude::*;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

use super::filter::{FacetName, FilterEvaluator, FilterSet, Predicate};
use crate::error::SearchResult;
use crate::index::{DocSet, DuplicateCounts, FieldPostings, Index};
use crate::model::FilesizeRange;

/// Counts of one facet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FacetCounts {
    /// Facet value to number of photos.
    Values(BTreeMap<String, u64>),
    Dates(DateHierarchy),
    Duplicates(DuplicateCounts),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateHierarchy {
    pub years: Vec<YearBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearBucket {
    pub value: i32,
    pub count: u64,
    pub months: Vec<MonthBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBucket {
    pub value: u32,
    pub count: u64,
    pub days: Vec<DayBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub value: u32,
    pub count: u64,
}

impl DateHierarchy {
    /// Bucket candidates by shot date in one pass. Undated photos are not
    /// counted anywhere.
    pub fn build(index: &Index, candidates: &DocSet) -> SearchResult<Self> {
        let mut days: BTreeMap<(i32, u32, u32), u64> = BTreeMap::new();
        for doc in candidates.iter() {
            if let Some(ts) = index.photo(doc)?.shot_ts {
                *days.entry((ts.year(), ts.month(), ts.day())).or_insert(0) += 1;
            }
        }

        let mut years: Vec<YearBucket> = Vec::new();
        for ((year, month, day), count) in days {
            if years.last().map(|y| y.value) != Some(year) {
                years.push(YearBucket {
                    value: year,
                    count: 0,
                    months: Vec::new(),
                });
            }
            let Some(y) = years.last_mut() else { continue };
            y.count += count;

            if y.months.last().map(|m| m.value) != Some(month) {
                y.months.push(MonthBucket {
                    value: month,
                    count: 0,
                    days: Vec::new(),
                });
            }
            let Some(m) = y.months.last_mut() else { continue };
            m.count += count;
            m.days.push(DayBucket { value: day, count });
        }
        Ok(Self { years })
    }

    pub fn total(&self) -> u64 {
        self.years.iter().map(|y| y.count).sum()
    }
}

/// A groupable dimension of the library.
pub trait Facet: Send + Sync {
    fn name(&self) -> FacetName;

    /// Whether this facet's own predicate is lifted when counting it.
    fn drill_sideways(&self) -> bool {
        true
    }

    fn compute(&self, index: &Index, filters: &FilterSet, candidates: &DocSet) -> SearchResult<FacetCounts>;
}

/// Facet over a string posting list.
pub struct ValueFacet {
    name: FacetName,
    postings: fn(&Index) -> &FieldPostings,
}

impl ValueFacet {
    pub fn new(name: FacetName, postings: fn(&Index) -> &FieldPostings) -> Self {
        Self { name, postings }
    }
}

impl Facet for ValueFacet {
    fn name(&self) -> FacetName {
        self.name
    }

    /// Every value in the index, plus any selected value the index does not
    /// know, so a selection is always echoed back.
    fn compute(&self, index: &Index, filters: &FilterSet, candidates: &DocSet) -> SearchResult<FacetCounts> {
        let mut counts: BTreeMap<String, u64> = (self.postings)(index)
            .iter()
            .map(|(value, docs)| (value.clone(), docs.intersection_len(candidates) as u64))
            .collect();
        if let Some(Predicate::AnyOf(selected)) = filters.predicate(self.name) {
            for value in selected {
                counts.entry(value.clone()).or_insert(0);
            }
        }
        Ok(FacetCounts::Values(counts))
    }
}

pub struct FilesizeFacet;

impl Facet for FilesizeFacet {
    fn name(&self) -> FacetName {
        FacetName::FilesizeRange
    }

    fn compute(&self, index: &Index, _filters: &FilterSet, candidates: &DocSet) -> SearchResult<FacetCounts> {
        let counts = FilesizeRange::ALL
            .iter()
            .map(|range| {
                let count = index.filesize_bucket(*range).intersection_len(candidates) as u64;
                (range.as_str().to_string(), count)
            })
            .collect();
        Ok(FacetCounts::Values(counts))
    }
}

pub struct HasFacesFacet;

impl Facet for HasFacesFacet {
    fn name(&self) -> FacetName {
        FacetName::HasFaces
    }

    fn compute(&self, index: &Index, _filters: &FilterSet, candidates: &DocSet) -> SearchResult<FacetCounts> {
        let with = index.with_faces().intersection_len(candidates) as u64;
        let total = candidates.len() as u64;
        let counts = BTreeMap::from([
            ("true".to_string(), with),
            ("false".to_string(), total - with),
        ]);
        Ok(FacetCounts::Values(counts))
    }
}

pub struct DateFacet;

impl Facet for DateFacet {
    fn name(&self) -> FacetName {
        FacetName::Date
    }

    fn compute(&self, index: &Index, _filters: &FilterSet, candidates: &DocSet) -> SearchResult<FacetCounts> {
        Ok(FacetCounts::Dates(DateHierarchy::build(index, candidates)?))
    }
}

/// Duplicate groups with at least two members among the candidates. There
/// is no duplicates predicate, so nothing to drill sideways from.
pub struct DuplicatesFacet;

impl Facet for DuplicatesFacet {
    fn name(&self) -> FacetName {
        FacetName::Duplicates
    }

    fn drill_sideways(&self) -> bool {
        false
    }

    fn compute(&self, index: &Index, _filters: &FilterSet, candidates: &DocSet) -> SearchResult<FacetCounts> {
        Ok(FacetCounts::Duplicates(index.duplicates().count_in(candidates)))
    }
}

pub struct FacetRegistry {
    facets: Vec<Box<dyn Facet>>,
}

impl Default for FacetRegistry {
    fn default() -> Self {
        Self {
            facets: vec![
                Box::new(DateFacet),
                Box::new(ValueFacet::new(FacetName::CameraMake, Index::camera_make)),
                Box::new(ValueFacet::new(FacetName::Extension, Index::extension)),
                Box::new(ValueFacet::new(FacetName::Orientation, Index::orientation)),
                Box::new(FilesizeFacet),
                Box::new(HasFacesFacet),
                Box::new(ValueFacet::new(FacetName::Tags, Index::tags)),
                Box::new(ValueFacet::new(FacetName::People, Index::people)),
                Box::new(DuplicatesFacet),
            ],
        }
    }
}

impl FacetRegistry {
    pub fn names(&self) -> Vec<FacetName> {
        self.facets.iter().map(|f| f.name()).collect()
    }

    /// Counts for every registered facet, computed in parallel.
    ///
    /// `candidates` is the result of the full filter set; a facet whose own
    /// predicate is active re-evaluates without it, keeping `restriction`.
    /// When nothing matches, every facet counts over the empty set so the
    /// response reports all zeros. Any failing facet fails the whole
    /// computation.
    pub fn compute_all(
        &self,
        evaluator: &FilterEvaluator<'_>,
        filters: &FilterSet,
        restriction: Option<&DocSet>,
        candidates: &DocSet,
    ) -> SearchResult<BTreeMap<FacetName, FacetCounts>> {
        let index = evaluator.index();
        self.facets
            .par_iter()
            .map(|facet| -> SearchResult<(FacetName, FacetCounts)> {
                let name = facet.name();
                let sideways = if !candidates.is_empty()
                    && facet.drill_sideways()
                    && filters.predicate(name).is_some()
                {
                    Cow::Owned(evaluator.evaluate_with(&filters.without(name), restriction)?)
                } else {
                    Cow::Borrowed(candidates)
                };
                Ok((name, facet.compute(index, filters, &sideways)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::index::fixtures::{self, ts};

    fn facets(index: &Index, filters: &FilterSet) -> BTreeMap<FacetName, FacetCounts> {
        let cancel = CancellationToken::new();
        let evaluator = FilterEvaluator::new(index, &cancel, 64);
        let restriction = evaluator.restriction(filters).unwrap();
        let candidates = evaluator.evaluate_with(filters, restriction.as_ref()).unwrap();
        FacetRegistry::default()
            .compute_all(&evaluator, filters, restriction.as_ref(), &candidates)
            .unwrap()
    }

    fn values(counts: &BTreeMap<FacetName, FacetCounts>, facet: FacetName) -> BTreeMap<String, u64> {
        match &counts[&facet] {
            FacetCounts::Values(v) => v.clone(),
            other => panic!("{} is not a value facet: {:?}", facet, other),
        }
    }

    fn dates(counts: &BTreeMap<FacetName, FacetCounts>) -> DateHierarchy {
        match &counts[&FacetName::Date] {
            FacetCounts::Dates(d) => d.clone(),
            other => panic!("not a date facet: {:?}", other),
        }
    }

    #[test]
    fn test_every_facet_present() {
        let index = fixtures::library();
        let counts = facets(&index, &FilterSet::new());
        assert_eq!(counts.keys().copied().collect::<Vec<_>>(), FacetName::ALL.to_vec());
        assert_eq!(FacetRegistry::default().names().len(), FacetName::ALL.len());
    }

    #[test]
    fn test_drill_sideways_keeps_alternatives() {
        let index = fixtures::library();
        let filters = FilterSet::new()
            .with_values(FacetName::CameraMake, ["Canon"])
            .with_values(FacetName::Tags, ["beach"]);
        let counts = facets(&index, &filters);

        // camera_make ignores its own selection but keeps the tag filter
        let makes = values(&counts, FacetName::CameraMake);
        assert_eq!(makes["Canon"], 3);
        assert_eq!(makes["Sony"], 1);
        assert_eq!(makes["Apple"], 0);

        // tags ignore the tag selection but keep the camera filter
        let tags = values(&counts, FacetName::Tags);
        assert_eq!(tags["beach"], 3);
        assert_eq!(tags["mountain"], 1);
        assert_eq!(tags["city"], 0);

        // other facets see the full filter set
        let ext = values(&counts, FacetName::Extension);
        assert_eq!(ext["jpg"], 3);
        assert_eq!(ext["png"], 0);
    }

    #[test]
    fn test_selected_unknown_value_is_echoed() {
        let index = fixtures::library();
        let filters = FilterSet::new().with_values(FacetName::CameraMake, ["Nikon"]);
        let counts = facets(&index, &filters);
        assert_eq!(values(&counts, FacetName::CameraMake)["Nikon"], 0);
    }

    #[test]
    fn test_people_count_photos_not_faces() {
        let index = fixtures::library();
        let people = values(&facets(&index, &FilterSet::new()), FacetName::People);
        // photo 1 holds two faces of Alice
        assert_eq!(people["Alice"], 3);
        assert_eq!(people["Bob"], 3);
        assert_eq!(people["Carol"], 3);
    }

    #[test]
    fn test_has_faces_and_filesize() {
        let index = fixtures::library();
        let counts = facets(&index, &FilterSet::new().with_has_faces(true));
        let has_faces = values(&counts, FacetName::HasFaces);
        assert_eq!(has_faces["true"], 6);
        assert_eq!(has_faces["false"], 4);

        let sizes = values(&counts, FacetName::FilesizeRange);
        assert_eq!(sizes["small"], 1);
        assert_eq!(sizes["medium"], 4);
        assert_eq!(sizes["large"], 1);
    }

    #[test]
    fn test_date_hierarchy_sums() {
        let index = fixtures::library();
        let hierarchy = dates(&facets(&index, &FilterSet::new()));
        // photo 7 has no shot_ts
        assert_eq!(hierarchy.total(), 9);
        assert_eq!(
            hierarchy.years.iter().map(|y| y.value).collect::<Vec<_>>(),
            vec![1999, 2022, 2023, 2024]
        );

        let y2023 = &hierarchy.years[2];
        assert_eq!(y2023.count, 5);
        let july = &y2023.months[0];
        assert_eq!((july.value, july.count), (7, 4));
        assert_eq!(
            july.days.iter().map(|d| (d.value, d.count)).collect::<Vec<_>>(),
            vec![(14, 2), (15, 1), (20, 1)]
        );

        for year in &hierarchy.years {
            assert_eq!(year.count, year.months.iter().map(|m| m.count).sum::<u64>());
            for month in &year.months {
                assert_eq!(month.count, month.days.iter().map(|d| d.count).sum::<u64>());
            }
        }
    }

    #[test]
    fn test_date_hierarchy_sums_under_other_filters() {
        let index = fixtures::generated(400);
        let cancel = CancellationToken::new();
        let evaluator = FilterEvaluator::new(&index, &cancel, 64);

        for filters in [
            FilterSet::new().with_values(FacetName::Tags, ["beach", "night"]),
            FilterSet::new()
                .with_values(FacetName::CameraMake, ["Sony"])
                .with_has_faces(true),
            FilterSet::new()
                .with_values(FacetName::People, ["Bob"])
                .with_values(FacetName::Extension, ["jpg", "heic"]),
        ] {
            let candidates = evaluator.evaluate(&filters).unwrap();
            let dated = candidates
                .iter()
                .filter(|&doc| index.photo(doc).unwrap().shot_ts.is_some())
                .count() as u64;
            assert!(dated > 0, "{:?} matches no dated photo", filters);

            let hierarchy = dates(&facets(&index, &filters));
            assert_eq!(hierarchy.total(), dated);
            for year in &hierarchy.years {
                assert_eq!(year.count, year.months.iter().map(|m| m.count).sum::<u64>());
                for month in &year.months {
                    assert_eq!(month.count, month.days.iter().map(|d| d.count).sum::<u64>());
                }
            }
        }
    }

    #[test]
    fn test_date_facet_is_drill_sideways() {
        let index = fixtures::library();
        let filters = FilterSet::new().with_date_range(Some(ts(2024, 1, 1, 0, 0)), None);
        let hierarchy = dates(&facets(&index, &filters));
        assert_eq!(hierarchy.total(), 9);
    }

    #[test]
    fn test_duplicates_respect_filters() {
        let index = fixtures::library();
        let all = facets(&index, &FilterSet::new());
        assert_eq!(all[&FacetName::Duplicates], FacetCounts::Duplicates(DuplicateCounts { exact: 1, near: 1 }));

        // photo 1 filtered away: no exact pair left, near pair {2, 9} remains
        let filters = FilterSet::new().with_date_range(Some(ts(2023, 7, 14, 18, 31)), None);
        let counts = facets(&index, &filters);
        assert_eq!(counts[&FacetName::Duplicates], FacetCounts::Duplicates(DuplicateCounts { exact: 0, near: 1 }));

        let filters = FilterSet::new().with_values(FacetName::Extension, ["jpg"]).with_has_faces(false);
        let counts = facets(&index, &filters);
        assert_eq!(counts[&FacetName::Duplicates], FacetCounts::Duplicates(DuplicateCounts::default()));

        let filters = FilterSet::new().with_values(FacetName::Tags, ["sunset"]);
        let counts = facets(&index, &filters);
        assert_eq!(counts[&FacetName::Duplicates], FacetCounts::Duplicates(DuplicateCounts { exact: 1, near: 1 }));
    }

    #[test]
    fn test_empty_result_still_has_every_facet() {
        let index = fixtures::library();
        let filters = FilterSet::new()
            .with_values(FacetName::Tags, ["city"])
            .with_values(FacetName::CameraMake, ["Canon"]);
        let counts = facets(&index, &filters);
        assert_eq!(counts.len(), FacetName::ALL.len());
        for facet in [
            FacetName::CameraMake,
            FacetName::Extension,
            FacetName::Orientation,
            FacetName::FilesizeRange,
            FacetName::HasFaces,
            FacetName::Tags,
            FacetName::People,
        ] {
            let counts = values(&counts, facet);
            assert!(!counts.is_empty(), "{} lists no values", facet);
            assert!(counts.values().all(|&n| n == 0), "{}: {:?}", facet, counts);
        }
        // the selections are still echoed, at zero
        assert_eq!(values(&counts, FacetName::Tags)["city"], 0);
        assert_eq!(values(&counts, FacetName::CameraMake)["Canon"], 0);
        assert!(dates(&counts).years.is_empty());
        assert_eq!(counts[&FacetName::Duplicates], FacetCounts::Duplicates(DuplicateCounts::default()));
    }

    /// For every facet value, the sideways count equals the number of
    /// results of the request with that facet's selection replaced by the
    /// value.
    #[test]
    fn test_drill_sideways_invariant_on_generated_library() {
        let index = fixtures::generated(300);
        let cancel = CancellationToken::new();
        let evaluator = FilterEvaluator::new(&index, &cancel, 32);
        let filters = FilterSet::new()
            .with_values(FacetName::Tags, ["beach", "city"])
            .with_values(FacetName::CameraMake, ["Sony"])
            .with_values(FacetName::People, ["Alice"]);
        let counts = facets(&index, &filters);

        for facet in [FacetName::Tags, FacetName::CameraMake, FacetName::People, FacetName::Extension] {
            for (value, count) in values(&counts, facet) {
                let replaced = filters.without(facet).with_values(facet, [value.clone()]);
                let expected = evaluator.evaluate(&replaced).unwrap().len() as u64;
                assert_eq!(count, expected, "{} = {}", facet, value);
            }
        }
    }
}
