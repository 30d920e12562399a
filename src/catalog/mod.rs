//! Reads the clepho SQLite catalog into an index snapshot.

mod schema;

pub use schema::SCHEMA;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::index::{Index, IndexBuilder};
use crate::model::{orientation_of, Face, Person, Photo};

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of photos not in the trash.
    pub fn photo_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos WHERE trashed_at IS NULL", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Load every photo outside the trash, with its faces, tags and
    /// embedding, and build an index from them.
    pub fn load_index(&self, config: &IndexConfig) -> Result<Index> {
        let mut builder = IndexBuilder::new(config.clone());
        for person in self.people()? {
            builder.add_person(person);
        }

        let mut photos = self.photos()?;
        self.attach_faces(&mut photos)?;
        self.attach_user_tags(&mut photos)?;
        self.attach_embeddings(&mut photos, config.embedding_model.as_deref())?;

        info!("Loaded {} photos from catalog", photos.len());
        for photo in photos.into_values() {
            builder.add_photo(photo);
        }
        builder.build().context("Failed to build search index")
    }

    fn people(&self) -> Result<Vec<Person>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM people ORDER BY id")?;
        let people = stmt
            .query_map([], |row| {
                Ok(Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(people)
    }

    fn photos(&self) -> Result<BTreeMap<i64, Photo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, path, size_bytes, width, height, camera_make, taken_at,
                   sha256_hash, perceptual_hash, tags
            FROM photos
            WHERE trashed_at IS NULL
            "#,
        )?;

        let mut rows = stmt.query([])?;
        let mut photos = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let path: String = row.get(1)?;
            let size: i64 = row.get(2)?;
            let taken_at: Option<String> = row.get(6)?;
            let llm_tags: Option<String> = row.get(9)?;

            let mut photo = Photo::new(id, path);
            photo.filesize = size.max(0) as u64;
            photo.orientation = orientation_of(row.get(3)?, row.get(4)?);
            photo.camera_make = non_empty(row.get(5)?);
            photo.shot_ts = taken_at.as_deref().and_then(|raw| {
                let parsed = parse_taken_at(raw);
                if parsed.is_none() {
                    warn!("Photo {} has unparsable taken_at {:?}, treating as undated", id, raw);
                }
                parsed
            });
            photo.content_hash = non_empty(row.get(7)?);
            photo.perceptual_hash = non_empty(row.get(8)?);
            photo.tags = llm_tags.as_deref().map(parse_tag_list).unwrap_or_default();

            photos.insert(id, photo);
        }
        Ok(photos)
    }

    fn attach_faces(&self, photos: &mut BTreeMap<i64, Photo>) -> Result<()> {
        let mut stmt = self.conn.prepare("SELECT photo_id, person_id FROM faces ORDER BY id")?;
        let faces = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (photo_id, person_id) in faces {
            if let Some(photo) = photos.get_mut(&photo_id) {
                photo.faces.push(Face { person_id });
            }
        }
        Ok(())
    }

    fn attach_user_tags(&self, photos: &mut BTreeMap<i64, Photo>) -> Result<()> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT put.photo_id, ut.name
            FROM photo_user_tags put
            JOIN user_tags ut ON ut.id = put.tag_id
            "#,
        )?;
        let tags = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (photo_id, name) in tags {
            if let Some(photo) = photos.get_mut(&photo_id) {
                let name = name.trim();
                if !name.is_empty() {
                    photo.tags.push(name.to_string());
                }
            }
        }
        Ok(())
    }

    fn attach_embeddings(&self, photos: &mut BTreeMap<i64, Photo>, model: Option<&str>) -> Result<()> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT photo_id, embedding, model_name
            FROM embeddings
            WHERE ?1 IS NULL OR model_name = ?1
            "#,
        )?;
        let mut rows = stmt.query(params![model])?;
        let mut loaded = 0usize;
        while let Some(row) = rows.next()? {
            let photo_id: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            let Some(photo) = photos.get_mut(&photo_id) else {
                continue;
            };
            if bytes.len() % 4 != 0 {
                warn!("Embedding of photo {} is {} bytes, not a float32 array", photo_id, bytes.len());
                continue;
            }
            photo.embedding = Some(bytes_to_embedding(&bytes));
            loaded += 1;
        }
        debug!("Attached {} embeddings", loaded);
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// LLM tags are stored as a JSON array of strings.
fn parse_tag_list(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// `taken_at` comes from EXIF and from older scanners, so several layouts
/// occur. Times without a zone are taken as UTC.
pub fn parse_taken_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().trim_matches('"');
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Convert little-endian bytes to an f32 vector. Trailing bytes that do not
/// form a whole float are dropped.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}
