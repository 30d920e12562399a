//! Query pipeline: request validation, filter evaluation, facet counting,
//! ranking and cursor handling.

pub mod cursor;
pub mod facets;
pub mod filter;
pub mod rank;
pub mod request;
pub mod validate;

pub use cursor::{Cursor, Fingerprint};
pub use facets::{DateHierarchy, Facet, FacetCounts, FacetRegistry};
pub use filter::{FacetName, FilterEvaluator, FilterSet, Predicate, VectorQuery};
pub use rank::{RankedHit, Ranker, SortDirection, SortField, SortKey, SortSpec};
pub use request::SearchRequest;
pub use validate::{QueryValidator, ValidatedQuery};
