// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Portable image catalog: one JSON document, cloud-sync friendly.
//!
//! The catalog maps relative image paths to user-editable metadata and
//! is shared between the scan flow and interactive edits, so every
//! accessor goes through one mutex. On-disk writes are temp-then-rename
//! only; a crash mid-save cannot corrupt the previous good file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::{ImagoError, Result};

/// Fixed palette for color labels. Anything else degrades to "".
pub const COLOR_PALETTE: [&str; 6] = ["Red", "Orange", "Yellow", "Green", "Blue", "Purple"];

/// Highest allowed star rating
pub const MAX_RATING: u8 = 5;

/// Metadata stored per image, keyed by path relative to the base dir
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRecord {
    pub filename: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub color_label: String,
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
}

/// Metadata returned by lookups, with defaults applied when absent
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMeta {
    pub filename: String,
    pub tags: BTreeSet<String>,
    pub rating: u8,
    pub color_label: String,
}

/// On-disk document shape. Unknown keys are tolerated on load.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogDoc {
    #[serde(default)]
    images: BTreeMap<String, ImageRecord>,
    #[serde(default)]
    base_dir: String,
    #[serde(default = "current_version")]
    version: String,
    #[serde(default = "Utc::now")]
    updated: DateTime<Utc>,
}

fn current_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Default)]
struct CatalogState {
    path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    images: BTreeMap<String, ImageRecord>,
    dirty: bool,
}

/// Thread-safe catalog store. The images map is never exposed raw.
#[derive(Debug, Default)]
pub struct Catalog {
    state: Mutex<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        // A poisoned lock means a panic mid-update; propagating the
        // last-written state is still safe for this map.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Initialize an empty catalog at `path` and write it immediately
    pub fn create(&self, path: &Path) -> Result<()> {
        {
            let mut state = self.lock();
            state.path = Some(path.to_path_buf());
            state.base_dir = None;
            state.images.clear();
            state.dirty = true;
        }
        self.save()
    }

    /// Load the catalog from a JSON document.
    ///
    /// A parse or read failure leaves prior in-memory state untouched.
    pub fn load(&self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ImagoError::Catalog(format!("Cannot read {}: {}", path.display(), e)))?;
        let doc: CatalogDoc = serde_json::from_str(&content)
            .map_err(|e| ImagoError::Catalog(format!("Corrupt catalog {}: {}", path.display(), e)))?;

        let mut state = self.lock();
        state.path = Some(path.to_path_buf());
        state.base_dir = if doc.base_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(doc.base_dir))
        };
        state.images = doc.images;
        state.dirty = false;
        info!("Loaded catalog {} ({} images)", path.display(), state.images.len());
        Ok(())
    }

    /// Atomically write the catalog to disk (temp file + rename).
    ///
    /// On failure the existing file is left unchanged and in-memory
    /// state stays valid for retry.
    pub fn save(&self) -> Result<()> {
        let mut state = self.lock();
        let path = state
            .path
            .clone()
            .ok_or_else(|| ImagoError::Catalog("No catalog path set".to_string()))?;

        let doc = CatalogDoc {
            images: state.images.clone(),
            base_dir: state
                .base_dir
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            version: current_version(),
            updated: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&doc)?;

        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = parent {
            std::fs::create_dir_all(dir)?;
        }

        // The temp file lives next to the target so the rename stays
        // on one filesystem and is atomic.
        let dir = parent.unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), content)?;
        tmp.persist(&path)
            .map_err(|e| ImagoError::Catalog(format!("Cannot replace {}: {}", path.display(), e)))?;

        state.dirty = false;
        Ok(())
    }

    /// Set the root folder relative keys are computed against.
    ///
    /// Re-keying existing entries silently would orphan them, so the
    /// change is rejected once the catalog holds any image.
    pub fn set_base_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if !state.images.is_empty() && state.base_dir.as_deref() != Some(path) {
            return Err(ImagoError::Catalog(format!(
                "Cannot change base directory on a catalog with {} entries",
                state.images.len()
            )));
        }
        state.base_dir = Some(path.to_path_buf());
        state.dirty = true;
        Ok(())
    }

    /// Add or overwrite an image entry, keyed by its path relative to
    /// the base dir. Marks the catalog dirty.
    pub fn upsert(
        &self,
        absolute_path: &Path,
        filename: &str,
        tags: BTreeSet<String>,
        rating: u8,
        color_label: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        let base = state
            .base_dir
            .clone()
            .ok_or_else(|| ImagoError::Catalog("Base directory not set".to_string()))?;
        let key = relative_key(&base, absolute_path);
        state.images.insert(
            key,
            ImageRecord {
                filename: filename.to_string(),
                tags,
                rating: rating.min(MAX_RATING),
                color_label: normalize_color_label(color_label),
                last_modified: Utc::now(),
            },
        );
        state.dirty = true;
        Ok(())
    }

    /// Metadata for an image, or defaults (path stem, no tags) when
    /// it is unknown to the catalog
    pub fn get(&self, absolute_path: &Path) -> ImageMeta {
        let stem = absolute_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let state = self.lock();
        let base = match &state.base_dir {
            Some(b) => b.clone(),
            None => {
                return ImageMeta {
                    filename: stem,
                    tags: BTreeSet::new(),
                    rating: 0,
                    color_label: String::new(),
                }
            }
        };
        let key = relative_key(&base, absolute_path);
        match state.images.get(&key) {
            Some(record) => ImageMeta {
                filename: record.filename.clone(),
                tags: record.tags.clone(),
                rating: record.rating,
                color_label: record.color_label.clone(),
            },
            None => ImageMeta {
                filename: stem,
                tags: BTreeSet::new(),
                rating: 0,
                color_label: String::new(),
            },
        }
    }

    /// Stored metadata for an image, or None when the catalog has no
    /// entry for it (unlike [`get`](Self::get), no defaults applied)
    pub fn lookup(&self, absolute_path: &Path) -> Option<ImageMeta> {
        let state = self.lock();
        let base = state.base_dir.clone()?;
        let key = relative_key(&base, absolute_path);
        state.images.get(&key).map(|record| ImageMeta {
            filename: record.filename.clone(),
            tags: record.tags.clone(),
            rating: record.rating,
            color_label: record.color_label.clone(),
        })
    }

    /// Case-insensitive substring search over relative path, filename
    /// and tags. Results are sorted by key, so output is reproducible.
    pub fn search(&self, query: &str) -> Vec<String> {
        if query.is_empty() {
            return Vec::new();
        }
        let query = query.to_lowercase();
        let state = self.lock();
        let mut results = Vec::new();
        for (rel_path, record) in &state.images {
            let hit = rel_path.to_lowercase().contains(&query)
                || record.filename.to_lowercase().contains(&query)
                || record.tags.iter().any(|t| t.to_lowercase().contains(&query));
            if hit {
                results.push(rel_path.clone());
            }
        }
        results
    }

    /// Union of every tag across all entries
    pub fn all_tags(&self) -> BTreeSet<String> {
        let state = self.lock();
        state
            .images
            .values()
            .flat_map(|r| r.tags.iter().cloned())
            .collect()
    }

    pub fn base_dir(&self) -> Option<PathBuf> {
        self.lock().base_dir.clone()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().images.is_empty()
    }
}

/// Key for an image: path relative to the base dir, falling back to
/// the literal absolute path when the image lives outside it
fn relative_key(base_dir: &Path, absolute_path: &Path) -> String {
    match absolute_path.strip_prefix(base_dir) {
        Ok(rel) => rel.to_string_lossy().to_string(),
        Err(_) => {
            warn!(
                "{} is not under base dir {}, using absolute path as key",
                absolute_path.display(),
                base_dir.display()
            );
            absolute_path.to_string_lossy().to_string()
        }
    }
}

/// Empty or a palette member; anything else degrades to empty
fn normalize_color_label(label: &str) -> String {
    if label.is_empty() {
        return String::new();
    }
    match COLOR_PALETTE.iter().find(|c| c.eq_ignore_ascii_case(label)) {
        Some(canonical) => canonical.to_string(),
        None => {
            warn!("Unknown color label '{}', dropping", label);
            String::new()
        }
    }
}
