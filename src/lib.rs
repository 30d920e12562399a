//! Faceted search over a clepho photo catalog.
//!
//! The [`catalog`] module loads photos from the clepho SQLite database into an
//! immutable [`index::Index`]. A [`SearchEngine`] holds the current snapshot
//! and answers JSON search requests with ranked, cursor-paginated hits and
//! drill-sideways facet counts.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod model;
pub mod query;

pub use cancel::CancellationToken;
pub use config::Config;
pub use engine::{SearchEngine, SearchResponse};
pub use error::{ErrorBody, SearchError, SearchResult};
pub use query::SearchRequest;
