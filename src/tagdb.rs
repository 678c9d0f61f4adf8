// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SQLite index of committed images for fast CLI queries
//!
//! This is a local mirror of what has been organized, separate from
//! the portable JSON catalog: the catalog travels between machines,
//! the index stays with the destination tree.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::plan::PlanEntry;
use crate::{ImagoError, Result};

/// Thread-safe index handle (clone-able)
#[derive(Clone)]
pub struct TagIndex {
    conn: Arc<Mutex<Connection>>,
}

/// A tag with its usage count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

/// An indexed image row
#[derive(Debug, Clone)]
pub struct IndexedImage {
    pub id: String,
    pub original_path: String,
    pub organized_path: String,
    pub folder: String,
    pub file_hash: String,
}

/// Index statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub image_count: i64,
    pub tag_count: i64,
    pub folder_count: i64,
}

impl TagIndex {
    /// Open or create the index database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        index.initialize()?;
        Ok(index)
    }

    /// In-memory index (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        index.initialize()?;
        Ok(index)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ImagoError::Catalog("Tag index lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                original_path TEXT NOT NULL,
                organized_path TEXT NOT NULL,
                folder TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                committed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS image_tags (
                image_id TEXT NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (image_id, tag_id)
            );

            CREATE INDEX IF NOT EXISTS idx_images_hash ON images(file_hash);
            CREATE INDEX IF NOT EXISTS idx_images_folder ON images(folder);
        "#,
        )?;
        Ok(())
    }

    /// Record one committed entry. Duplicate content (same hash) is
    /// logged but still recorded; the commit already happened.
    pub fn record(&self, entry: &PlanEntry, organized_path: &Path) -> Result<String> {
        let hash = hash_file(organized_path)?;
        if let Some(existing) = self.find_duplicate(&hash)? {
            debug!(
                "Content of {:?} already indexed as {}",
                entry.original_path, existing
            );
        }

        let id = Uuid::new_v4().to_string();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"INSERT INTO images (id, original_path, organized_path, folder, file_hash, committed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))"#,
            params![
                id,
                entry.original_path.to_string_lossy(),
                organized_path.to_string_lossy(),
                entry.proposed_folder,
                hash
            ],
        )?;

        for tag in &entry.tags {
            conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![tag])?;
            let tag_id: i64 = conn.query_row(
                "SELECT id FROM tags WHERE name = ?1",
                params![tag],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?1, ?2)",
                params![id, tag_id],
            )?;
        }

        Ok(id)
    }

    /// Id of an already-indexed image with identical content, if any
    pub fn find_duplicate(&self, hash: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let result: rusqlite::Result<String> = conn.query_row(
            "SELECT id FROM images WHERE file_hash = ?1 LIMIT 1",
            params![hash],
            |row| row.get(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Images whose path, folder or tags match a substring query
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<IndexedImage>> {
        let conn = self.lock_conn()?;
        let pattern = format!("%{}%", query);
        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT i.id, i.original_path, i.organized_path, i.folder, i.file_hash
               FROM images i
               LEFT JOIN image_tags it ON it.image_id = i.id
               LEFT JOIN tags t ON t.id = it.tag_id
               WHERE i.organized_path LIKE ?1 OR i.folder LIKE ?1 OR t.name LIKE ?1
               ORDER BY i.organized_path LIMIT ?2"#,
        )?;

        let images = stmt
            .query_map(params![pattern, limit as i64], |row| {
                Ok(IndexedImage {
                    id: row.get(0)?,
                    original_path: row.get(1)?,
                    organized_path: row.get(2)?,
                    folder: row.get(3)?,
                    file_hash: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    /// Every tag with its usage count, most used first
    pub fn all_tags(&self) -> Result<Vec<TagCount>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT t.name, COUNT(it.image_id) as cnt
               FROM tags t LEFT JOIN image_tags it ON it.tag_id = t.id
               GROUP BY t.id ORDER BY cnt DESC, t.name"#,
        )?;
        let tags = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.lock_conn()?;
        let image_count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))?;
        let tag_count: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))?;
        let folder_count: i64 =
            conn.query_row("SELECT COUNT(DISTINCT folder) FROM images", [], |r| r.get(0))?;
        Ok(IndexStats {
            image_count,
            tag_count,
            folder_count,
        })
    }
}

/// Content hash used for duplicate detection
pub fn hash_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn committed_entry(dir: &Path, name: &str, folder: &str, tags: &[&str]) -> (PlanEntry, std::path::PathBuf) {
        let src = dir.join(name);
        std::fs::write(&src, name.as_bytes()).unwrap();
        let mut entry = PlanEntry::new(&src, BTreeSet::new(), folder.to_string());
        entry.tags = tags.iter().map(|t| t.to_string()).collect();
        (entry, src)
    }

    #[test]
    fn record_and_search_round_trip() {
        let dir = TempDir::new().unwrap();
        let index = TagIndex::in_memory().unwrap();
        let (entry, path) = committed_entry(dir.path(), "a.jpg", "Military", &["tank", "desert"]);

        index.record(&entry, &path).unwrap();

        let by_tag = index.search("tank", 10).unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].folder, "Military");

        let by_folder = index.search("Milit", 10).unwrap();
        assert_eq!(by_folder.len(), 1);
    }

    #[test]
    fn duplicate_content_is_detected() {
        let dir = TempDir::new().unwrap();
        let index = TagIndex::in_memory().unwrap();
        let (entry, path) = committed_entry(dir.path(), "a.jpg", "Nature", &[]);

        let copy = dir.path().join("copy.jpg");
        std::fs::copy(&path, &copy).unwrap();

        index.record(&entry, &path).unwrap();
        let hash = hash_file(&copy).unwrap();
        assert!(index.find_duplicate(&hash).unwrap().is_some());
    }

    #[test]
    fn tag_counts_aggregate_across_images() {
        let dir = TempDir::new().unwrap();
        let index = TagIndex::in_memory().unwrap();
        let (a, pa) = committed_entry(dir.path(), "a.jpg", "Nature", &["sunset", "beach"]);
        let (b, pb) = committed_entry(dir.path(), "b.jpg", "Nature", &["sunset"]);

        index.record(&a, &pa).unwrap();
        index.record(&b, &pb).unwrap();

        let tags = index.all_tags().unwrap();
        assert_eq!(tags[0], TagCount { name: "sunset".to_string(), count: 2 });

        let stats = index.stats().unwrap();
        assert_eq!(stats.image_count, 2);
        assert_eq!(stats.tag_count, 2);
        assert_eq!(stats.folder_count, 1);
    }
}
