//! Deterministic photo libraries for tests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};

use super::{Index, IndexBuilder};
use crate::config::{Config, IndexConfig};
use crate::model::{Face, Person, Photo};

pub const DIM: usize = 4;

pub fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
}

pub fn index_config() -> IndexConfig {
    IndexConfig {
        embedding_dim: DIM,
        embedding_model: None,
        near_duplicate_threshold: 3,
    }
}

pub fn config() -> Config {
    Config {
        index: index_config(),
        ..Config::default()
    }
}

pub fn people() -> Vec<Person> {
    vec![
        Person { id: 1, name: "Alice".into() },
        Person { id: 2, name: "Bob".into() },
        Person { id: 3, name: "Carol".into() },
    ]
}

fn phash(byte: u8) -> Option<String> {
    Some(BASE64.encode([byte, 0, 0, 0, 0, 0, 0, 0]))
}

struct Spec {
    id: i64,
    path: &'static str,
    shot: Option<DateTime<Utc>>,
    size: u64,
    make: Option<&'static str>,
    orientation: Option<&'static str>,
    tags: &'static [&'static str],
    faces: &'static [i64],
    sha: Option<&'static str>,
    phash: Option<String>,
    embedding: Option<[f32; DIM]>,
}

impl Spec {
    fn into_photo(self) -> Photo {
        let mut photo = Photo::new(self.id, self.path);
        photo.shot_ts = self.shot;
        photo.filesize = self.size;
        photo.camera_make = self.make.map(str::to_string);
        photo.orientation = self.orientation.map(str::to_string);
        photo.tags = self.tags.iter().map(|t| t.to_string()).collect();
        photo.faces = self.faces.iter().map(|&id| Face { person_id: Some(id) }).collect();
        photo.content_hash = self.sha.map(str::to_string);
        photo.perceptual_hash = self.phash;
        photo.embedding = self.embedding.map(|e| e.to_vec());
        photo
    }
}

/// The hand-written library most tests run against.
///
/// Photos 1 and 2 are exact and near duplicates of each other; photo 9 is a
/// near duplicate of both. Photo 1 has two faces of Alice. Photos 7 and 10
/// have no embedding, photo 7 has no shot_ts.
pub fn library_photos() -> Vec<Photo> {
    vec![
        Spec {
            id: 1,
            path: "/trips/beach/sunset_001.jpg",
            shot: Some(ts(2023, 7, 14, 18, 30)),
            size: 2_400_000,
            make: Some("Canon"),
            orientation: Some("landscape"),
            tags: &["beach", "sunset"],
            faces: &[1, 1],
            sha: Some("h1"),
            phash: phash(0b0000_0000),
            embedding: Some([1.0, 0.0, 0.0, 0.0]),
        },
        Spec {
            id: 2,
            path: "/trips/beach/sunset_002.jpg",
            shot: Some(ts(2023, 7, 14, 18, 31)),
            size: 2_500_000,
            make: Some("Canon"),
            orientation: Some("landscape"),
            tags: &["beach", "sunset"],
            faces: &[1],
            sha: Some("h1"),
            phash: phash(0b0000_0001),
            embedding: Some([0.9, 0.1, 0.0, 0.0]),
        },
        Spec {
            id: 3,
            path: "/trips/beach/swim.png",
            shot: Some(ts(2023, 7, 15, 10, 0)),
            size: 800_000,
            make: Some("Sony"),
            orientation: Some("portrait"),
            tags: &["beach"],
            faces: &[2],
            sha: Some("h3"),
            phash: phash(0b1111_0000),
            embedding: Some([0.5, 0.5, 0.0, 0.0]),
        },
        Spec {
            id: 4,
            path: "/city/night.jpg",
            shot: Some(ts(2023, 8, 1, 22, 0)),
            size: 6_000_000,
            make: Some("Sony"),
            orientation: Some("landscape"),
            tags: &["city", "night"],
            faces: &[],
            sha: Some("h4"),
            phash: phash(0b0011_1100),
            embedding: Some([0.0, 1.0, 0.0, 0.0]),
        },
        Spec {
            id: 5,
            path: "/city/market.heic",
            shot: Some(ts(2022, 12, 24, 12, 0)),
            size: 3_000_000,
            make: Some("Apple"),
            orientation: Some("portrait"),
            tags: &["city"],
            faces: &[2, 3],
            sha: Some("h5"),
            phash: phash(0b1100_0011),
            embedding: Some([0.0, 0.0, 1.0, 0.0]),
        },
        Spec {
            id: 6,
            path: "/family/dinner.jpg",
            shot: Some(ts(2022, 12, 25, 19, 0)),
            size: 1_200_000,
            make: Some("Apple"),
            orientation: Some("landscape"),
            tags: &["family"],
            faces: &[1, 2, 3],
            sha: Some("h6"),
            phash: phash(0b1010_1010),
            embedding: Some([0.0, 0.0, 0.0, 1.0]),
        },
        Spec {
            id: 7,
            path: "/family/undated.jpg",
            shot: None,
            size: 400_000,
            make: None,
            orientation: None,
            tags: &["family"],
            faces: &[],
            sha: Some("h7"),
            phash: None,
            embedding: None,
        },
        Spec {
            id: 8,
            path: "/trips/mountain/peak.jpg",
            shot: Some(ts(2023, 7, 20, 7, 0)),
            size: 7_500_000,
            make: Some("Canon"),
            orientation: Some("portrait"),
            tags: &["mountain"],
            faces: &[3],
            sha: Some("h8"),
            phash: phash(0b0101_0101),
            embedding: Some([0.7, 0.0, 0.7, 0.0]),
        },
        Spec {
            id: 9,
            path: "/trips/beach/sunset_003.jpg",
            shot: Some(ts(2024, 1, 5, 17, 0)),
            size: 2_400_000,
            make: Some("Canon"),
            orientation: Some("landscape"),
            tags: &["beach", "sunset"],
            faces: &[],
            sha: Some("h9"),
            phash: phash(0b0000_0011),
            embedding: Some([0.95, 0.0, 0.05, 0.0]),
        },
        Spec {
            id: 10,
            path: "/scans/old.tif",
            shot: Some(ts(1999, 5, 1, 0, 0)),
            size: 900_000,
            make: None,
            orientation: Some("square"),
            tags: &[],
            faces: &[],
            sha: None,
            phash: None,
            embedding: None,
        },
    ]
    .into_iter()
    .map(Spec::into_photo)
    .collect()
}

pub fn library() -> Index {
    build(library_photos())
}

pub fn build(photos: Vec<Photo>) -> Index {
    let mut builder = IndexBuilder::new(index_config());
    for person in people() {
        builder.add_person(person);
    }
    for photo in photos {
        builder.add_photo(photo);
    }
    builder.build().unwrap()
}

/// A larger pseudo-random library with many colliding shot_ts values,
/// undated photos and repeated tags, for pagination and invariant tests.
pub fn generated_photos(n: usize) -> Vec<Photo> {
    const TAGS: [&str; 6] = ["beach", "sunset", "city", "family", "night", "mountain"];
    const MAKES: [&str; 3] = ["Canon", "Sony", "Apple"];
    const EXTS: [&str; 3] = ["jpg", "png", "heic"];

    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    (0..n)
        .map(|i| {
            let id = (i as i64 + 1) * 3;
            let ext = EXTS[(next() % 3) as usize];
            let mut photo = Photo::new(id, format!("/library/{:04}/img_{}.{}", i / 50, id, ext));
            photo.shot_ts = match next() % 10 {
                0 => None,
                r => Some(ts(
                    2019 + (r % 4) as i32,
                    1 + (next() % 12) as u32,
                    1 + (next() % 28) as u32,
                    (next() % 2) as u32 * 12,
                    0,
                )),
            };
            photo.filesize = next() % 8_000_000;
            photo.camera_make = Some(MAKES[(next() % 3) as usize].to_string());
            photo.orientation = Some(if next() % 2 == 0 { "landscape" } else { "portrait" }.to_string());
            let tag_count = (next() % 3) as usize;
            photo.tags = (0..tag_count)
                .map(|_| TAGS[(next() % TAGS.len() as u64) as usize].to_string())
                .collect();
            photo.faces = (0..(next() % 3))
                .map(|_| Face { person_id: Some(1 + (next() % 3) as i64) })
                .collect();
            photo.content_hash = Some(format!("sha{}", next() % (n as u64 / 2 + 1)));
            photo.perceptual_hash = phash((next() % 256) as u8);
            if next() % 5 != 0 {
                photo.embedding = Some((0..DIM).map(|_| (next() % 1000) as f32 / 1000.0).collect());
            }
            photo
        })
        .collect()
}

pub fn generated(n: usize) -> Index {
    build(generated_photos(n))
}
