//! In-memory face store backed by a directory of `<name>.jpg` images.

use crate::types::{FaceRecord, Template};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File pattern enumerated inside the backing directory.
const FACE_FILE_PATTERN: &str = "*.jpg";
const FACE_FILE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid face name {0:?}: must be non-empty and free of path separators")]
    InvalidName(String),
    #[error("invalid face directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to create face directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to save face image {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Ordered face records; insertion order is load order, then enrollment order.
///
/// Lookups are linear scans. Names are not required to be unique: enrolling
/// an existing name adds a second record with a new id.
#[derive(Debug, Clone)]
pub struct FaceStore {
    dir: PathBuf,
    records: Vec<FaceRecord>,
    next_id: u32,
}

impl FaceStore {
    /// Empty store for `dir`. Touches nothing on disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            records: Vec::new(),
            next_id: 1,
        }
    }

    /// Load every `*.jpg` in `dir` as a grayscale template.
    ///
    /// Files that fail to decode are skipped with a warning. A missing or
    /// empty directory yields an empty store.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self::new(dir);
        let pattern = glob::Pattern::escape(&store.dir.to_string_lossy())
            + std::path::MAIN_SEPARATOR_STR
            + FACE_FILE_PATTERN;
        tracing::info!(dir = %store.dir.display(), "loading face database");

        for entry in glob::glob(&pattern)? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable face entry");
                    continue;
                }
            };

            let image = match image::open(&path) {
                Ok(image) => image.to_luma8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not load face image");
                    continue;
                }
            };

            let Some(name) = name_from_path(&path) else {
                tracing::warn!(path = %path.display(), "face file has no usable name");
                continue;
            };

            store.push(name, Template::from_image(&image));
        }

        tracing::info!(count = store.len(), "loaded registered faces");
        Ok(store)
    }

    /// Append a record in memory only, assigning the next id.
    pub fn push(&mut self, name: impl Into<String>, template: Template) -> &FaceRecord {
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(FaceRecord {
            id,
            name: name.into(),
            template,
        });
        &self.records[self.records.len() - 1]
    }

    /// Save `backing_image` as `<dir>/<name>.jpg`, then append the record.
    ///
    /// The store is left unchanged if the image cannot be written. An existing
    /// file of the same name is overwritten.
    pub fn add(
        &mut self,
        name: &str,
        template: Template,
        backing_image: &GrayImage,
    ) -> Result<(&FaceRecord, PathBuf), StoreError> {
        validate_name(name)?;

        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.image_path(name);
        backing_image.save(&path).map_err(|source| StoreError::Save {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "face image saved");

        let record = self.push(name, template);
        tracing::info!(id = record.id, name = %record.name, "face added to database");
        Ok((record, path))
    }

    /// Where the backing image for `name` lives.
    pub fn image_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{FACE_FILE_EXTENSION}"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> &[FaceRecord] {
        &self.records
    }

    pub fn get(&self, id: u32) -> Option<&FaceRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Identity name of a face file: its file name without directory or extension.
fn name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    (!stem.is_empty()).then(|| stem.into_owned())
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name == "."
        || name.contains("..");
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
