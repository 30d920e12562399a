//! Opaque pagination cursors.
//!
//! A cursor is `base64url(json)` of the last returned position plus enough of
//! the query shape to reject it against a different query. Float keys travel
//! as their raw bits so the position survives the round trip exactly.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::filter::FilterSet;
use super::rank::{SortDirection, SortField, SortKey, SortSpec};
use crate::error::{SearchError, SearchResult};
use crate::model::PhotoId;

const CURSOR_VERSION: u32 = 1;

/// Hash of the normalized filters and sort of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Page size is deliberately left out: a client may change it between
    /// pages of the same result list.
    pub fn of(filters: &FilterSet, sort: &SortSpec) -> SearchResult<Fingerprint> {
        let canonical = serde_json::to_vec(&(filters, sort))
            .map_err(|e| SearchError::Internal(format!("Failed to serialize filters: {}", e)))?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        // first 16 bytes of the digest
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(32);
        Ok(Fingerprint(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub sort: SortSpec,
    pub key: SortKey,
    pub photo_id: PhotoId,
    pub fingerprint: Fingerprint,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
enum WireKey {
    Ts(i64),
    Int(i64),
    Text(String),
    Score(u32),
    Dist(u32),
    Missing,
}

impl From<&SortKey> for WireKey {
    fn from(key: &SortKey) -> Self {
        match key {
            SortKey::Timestamp(ms) => WireKey::Ts(*ms),
            SortKey::Integer(n) => WireKey::Int(*n),
            SortKey::Text(s) => WireKey::Text(s.clone()),
            SortKey::Score(f) => WireKey::Score(f.to_bits()),
            SortKey::Distance(f) => WireKey::Dist(f.to_bits()),
            SortKey::Missing => WireKey::Missing,
        }
    }
}

impl From<WireKey> for SortKey {
    fn from(key: WireKey) -> Self {
        match key {
            WireKey::Ts(ms) => SortKey::Timestamp(ms),
            WireKey::Int(n) => SortKey::Integer(n),
            WireKey::Text(s) => SortKey::Text(s),
            WireKey::Score(bits) => SortKey::Score(f32::from_bits(bits)),
            WireKey::Dist(bits) => SortKey::Distance(f32::from_bits(bits)),
            WireKey::Missing => SortKey::Missing,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireCursor {
    v: u32,
    by: SortField,
    dir: SortDirection,
    key: WireKey,
    id: i64,
    fp: String,
}

impl Cursor {
    pub fn encode(&self) -> SearchResult<String> {
        let wire = WireCursor {
            v: CURSOR_VERSION,
            by: self.sort.field,
            dir: self.sort.direction,
            key: WireKey::from(&self.key),
            id: self.photo_id.0,
            fp: self.fingerprint.0.clone(),
        };
        let json = serde_json::to_vec(&wire)
            .map_err(|e| SearchError::Internal(format!("Failed to encode cursor: {}", e)))?;
        Ok(BASE64_URL.encode(json))
    }

    /// Parse a token. Anything this server could not have produced is an
    /// `InvalidCursor`; whether it fits the current query is
    /// [`verify`](Self::verify)'s concern.
    pub fn decode(token: &str) -> SearchResult<Cursor> {
        let bytes = BASE64_URL
            .decode(token.trim())
            .map_err(|_| SearchError::InvalidCursor("not a cursor token".to_string()))?;
        let wire: WireCursor = serde_json::from_slice(&bytes)
            .map_err(|_| SearchError::InvalidCursor("unreadable cursor payload".to_string()))?;
        if wire.v != CURSOR_VERSION {
            return Err(SearchError::InvalidCursor(format!(
                "unsupported cursor version {}",
                wire.v
            )));
        }

        let sort = SortSpec {
            field: wire.by,
            direction: wire.dir,
        };
        let key = SortKey::from(wire.key);
        if !key.fits(sort.field) {
            return Err(SearchError::InvalidCursor(format!(
                "cursor key does not match sort field {}",
                sort.field
            )));
        }

        Ok(Cursor {
            sort,
            key,
            photo_id: PhotoId(wire.id),
            fingerprint: Fingerprint(wire.fp),
        })
    }

    /// Reject a cursor issued for a different sort or filter set.
    pub fn verify(&self, sort: &SortSpec, fingerprint: &Fingerprint) -> SearchResult<()> {
        if self.sort != *sort {
            return Err(SearchError::StaleCursor(format!(
                "cursor was issued for sort {} {:?}, request sorts by {} {:?}",
                self.sort.field, self.sort.direction, sort.field, sort.direction
            )));
        }
        if self.fingerprint != *fingerprint {
            return Err(SearchError::StaleCursor(
                "cursor was issued for different filters".to_string(),
            ));
        }
        Ok(())
    }
}
