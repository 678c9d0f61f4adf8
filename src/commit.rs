// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Commit executor: materializes a plan onto disk
//!
//! One file's failure is recorded and the batch continues; the
//! executor never aborts midway through a plan.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::plan::{Plan, PlanEntry};
use crate::tagdb::TagIndex;
use crate::Result;

/// Whether committed files are copied or moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    Copy,
    Move,
}

/// Outcome of a commit run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Files placed at their destination
    pub processed: usize,
    /// Collision-renamed files (numeric suffix appended)
    pub merged: usize,
    /// Files that could not be copied or moved
    pub failed: usize,
}

/// Copies or moves plan entries into per-folder destinations
pub struct CommitExecutor {
    dest_base: PathBuf,
    mode: CommitMode,
    index: Option<TagIndex>,
}

impl CommitExecutor {
    pub fn new(dest_base: PathBuf, mode: CommitMode) -> Self {
        Self {
            dest_base,
            mode,
            index: None,
        }
    }

    /// Record committed files in the tag index for later queries
    pub fn with_index(mut self, index: TagIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Materialize the plan. Destination subdirectories are created
    /// as needed; name collisions get an incrementing numeric suffix.
    pub fn execute(&self, plan: &Plan) -> Result<CommitStats> {
        std::fs::create_dir_all(&self.dest_base)?;
        let mut stats = CommitStats::default();

        for (folder, entries) in plan.folders() {
            let target_dir = self.dest_base.join(folder);
            if let Err(e) = std::fs::create_dir_all(&target_dir) {
                warn!("Cannot create {}: {}", target_dir.display(), e);
                stats.failed += entries.len();
                continue;
            }

            for entry in entries {
                match self.commit_entry(entry, &target_dir) {
                    Ok((dest, renamed)) => {
                        stats.processed += 1;
                        if renamed {
                            stats.merged += 1;
                        }
                        debug!("{:?} -> {}", entry.original_path, dest.display());
                    }
                    Err(e) => {
                        warn!("Failed to commit {:?}: {}", entry.original_path, e);
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            "Commit finished: {} processed, {} renamed on collision, {} failed",
            stats.processed, stats.merged, stats.failed
        );
        Ok(stats)
    }

    /// Place one entry, reporting its destination and whether a
    /// collision suffix was needed. A collision only counts as merged
    /// once the transfer itself has succeeded.
    fn commit_entry(&self, entry: &PlanEntry, target_dir: &Path) -> Result<(PathBuf, bool)> {
        let (stem, ext) = effective_name(entry);
        let (dest, renamed) = unique_destination(target_dir, &stem, &ext);

        match self.mode {
            CommitMode::Copy => {
                std::fs::copy(&entry.original_path, &dest)?;
                preserve_mtime(&entry.original_path, &dest);
            }
            CommitMode::Move => {
                // Rename first; fall back to copy+remove across
                // filesystems.
                if std::fs::rename(&entry.original_path, &dest).is_err() {
                    std::fs::copy(&entry.original_path, &dest)?;
                    preserve_mtime(&entry.original_path, &dest);
                    std::fs::remove_file(&entry.original_path)?;
                }
            }
        }

        if let Some(index) = &self.index {
            if let Err(e) = index.record(entry, &dest) {
                debug!("Tag index update failed for {:?}: {}", entry.original_path, e);
            }
        }

        Ok((dest, renamed))
    }
}

/// Destination stem and extension for an entry: the user-facing name,
/// sanitized, keeping the source extension when the name has none
fn effective_name(entry: &PlanEntry) -> (String, String) {
    let name = Path::new(&entry.new_filename);
    let source_ext = entry
        .original_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let (stem, ext) = match name.extension() {
        Some(ext) => (
            name.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            ext.to_string_lossy().to_string(),
        ),
        None => (entry.new_filename.clone(), source_ext),
    };

    (sanitize_filename(&stem), ext)
}

/// Keep alphanumerics, spaces, dots, hyphens and underscores
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// First free path in `dir` for `stem.ext`, appending `_1`, `_2`, ...
/// before the extension until the name is unused. The bool reports
/// whether a suffix was needed.
fn unique_destination(dir: &Path, stem: &str, ext: &str) -> (PathBuf, bool) {
    let mut counter = 0usize;
    loop {
        let filename = match (counter, ext.is_empty()) {
            (0, true) => stem.to_string(),
            (0, false) => format!("{}.{}", stem, ext),
            (n, true) => format!("{}_{}", stem, n),
            (n, false) => format!("{}_{}.{}", stem, n, ext),
        };
        let candidate = dir.join(filename);
        if !candidate.exists() {
            return (candidate, counter > 0);
        }
        counter += 1;
    }
}

/// Best effort: carry the source modification time over to the copy
fn preserve_mtime(src: &Path, dest: &Path) {
    let copied = std::fs::metadata(src).and_then(|m| m.modified()).and_then(|mtime| {
        std::fs::File::options()
            .write(true)
            .open(dest)?
            .set_modified(mtime)
    });
    if let Err(e) = copied {
        debug!("Could not preserve mtime on {}: {}", dest.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn entry(path: &Path, folder: &str) -> PlanEntry {
        PlanEntry::new(path, BTreeSet::new(), folder.to_string())
    }

    fn make_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    #[test]
    fn copies_entries_into_folder_structure() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = make_file(src.path(), "a.jpg");

        let mut plan = Plan::new();
        plan.insert(entry(&a, "Military"));

        let stats = CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
            .execute(&plan)
            .unwrap();

        assert_eq!(stats, CommitStats { processed: 1, merged: 0, failed: 0 });
        assert!(dest.path().join("Military/a.jpg").exists());
        assert!(a.exists(), "copy mode keeps the source");
    }

    #[test]
    fn collision_appends_numeric_suffix() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sub = src.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let first = make_file(src.path(), "same.jpg");
        let second = make_file(&sub, "same.jpg");

        let mut plan = Plan::new();
        plan.insert(entry(&first, "Nature"));
        plan.insert(entry(&second, "Nature"));

        let stats = CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
            .execute(&plan)
            .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.merged, 1);
        assert_eq!(stats.failed, 0);
        assert!(dest.path().join("Nature/same.jpg").exists());
        assert!(dest.path().join("Nature/same_1.jpg").exists());
    }

    #[test]
    fn move_mode_removes_source() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = make_file(src.path(), "a.jpg");

        let mut plan = Plan::new();
        plan.insert(entry(&a, "Vehicles"));

        let stats = CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Move)
            .execute(&plan)
            .unwrap();

        assert_eq!(stats.processed, 1);
        assert!(!a.exists());
        assert!(dest.path().join("Vehicles/a.jpg").exists());
    }

    #[test]
    fn failed_transfer_on_collision_does_not_count_as_merged() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::create_dir(dest.path().join("Nature")).unwrap();
        std::fs::write(dest.path().join("Nature/same.jpg"), b"existing").unwrap();

        // Collides with the existing file but the source is gone, so
        // the copy fails after the suffix was chosen.
        let mut plan = Plan::new();
        plan.insert(entry(&src.path().join("same.jpg"), "Nature"));

        let stats = CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
            .execute(&plan)
            .unwrap();

        assert_eq!(stats, CommitStats { processed: 0, merged: 0, failed: 1 });
        assert!(!dest.path().join("Nature/same_1.jpg").exists());
    }

    #[test]
    fn missing_source_is_counted_not_fatal() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let good = make_file(src.path(), "good.jpg");

        let mut plan = Plan::new();
        plan.insert(entry(Path::new("/no/such/file.jpg"), "Nature"));
        plan.insert(entry(&good, "Nature"));

        let stats = CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
            .execute(&plan)
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed, 1);
        assert!(dest.path().join("Nature/good.jpg").exists());
    }

    #[test]
    fn user_rename_without_extension_keeps_source_extension() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = make_file(src.path(), "a.jpg");

        let mut plan = Plan::new();
        let mut e = entry(&a, "Nature");
        e.new_filename = "Sunset at the beach".to_string();
        plan.insert(e);

        CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
            .execute(&plan)
            .unwrap();
        assert!(dest.path().join("Nature/Sunset at the beach.jpg").exists());
    }

    #[test]
    fn committed_files_land_in_the_tag_index() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = make_file(src.path(), "a.jpg");

        let mut plan = Plan::new();
        let mut e = entry(&a, "Military");
        e.tags.insert("tank".to_string());
        plan.insert(e);

        let index = TagIndex::in_memory().unwrap();
        CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
            .with_index(index.clone())
            .execute(&plan)
            .unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.image_count, 1);
        assert_eq!(index.search("tank", 10).unwrap().len(), 1);
    }

    #[test]
    fn unique_destination_counts_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.jpg"), b"1").unwrap();
        std::fs::write(dir.path().join("x_1.jpg"), b"2").unwrap();

        let (dest, renamed) = unique_destination(dir.path(), "x", "jpg");
        assert_eq!(dest, dir.path().join("x_2.jpg"));
        assert!(renamed);
    }
}
