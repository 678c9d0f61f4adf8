// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Organization plans: proposed folder groupings for scanned images
//!
//! A plan is built from classifier output merged with persisted
//! catalog metadata, edited interactively (through the history log),
//! and finally consumed by the commit executor.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::classify::{CategoryMap, TaggingService};

/// One file's mutable record within a plan. The original path is the
/// entry's key and never changes while the plan is alive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanEntry {
    pub original_path: PathBuf,
    pub filename: String,
    pub new_filename: String,
    pub tags: BTreeSet<String>,
    pub proposed_folder: String,
    pub rating: u8,
    pub color_label: String,
    /// Set when the user renamed the entry in this session; a catalog
    /// merge must not clobber an explicit rename
    #[serde(default)]
    pub renamed_by_user: bool,
}

impl PlanEntry {
    pub fn new(path: &Path, tags: BTreeSet<String>, proposed_folder: String) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            original_path: path.to_path_buf(),
            new_filename: filename.clone(),
            filename,
            tags,
            proposed_folder,
            rating: 0,
            color_label: String::new(),
            renamed_by_user: false,
        }
    }
}

/// Proposed grouping of images into destination folders. Each entry
/// lives in exactly one folder's list at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    folders: BTreeMap<String, Vec<PlanEntry>>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry under its proposed folder
    pub fn insert(&mut self, entry: PlanEntry) {
        self.folders
            .entry(entry.proposed_folder.clone())
            .or_default()
            .push(entry);
    }

    /// Folder names with their entry lists, sorted by folder name
    pub fn folders(&self) -> &BTreeMap<String, Vec<PlanEntry>> {
        &self.folders
    }

    pub fn entry_count(&self) -> usize {
        self.folders.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.values().all(Vec::is_empty)
    }

    /// All entries in deterministic (folder, insertion) order
    pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.folders.values().flatten()
    }

    /// Look up an entry by its original path
    pub fn find(&self, key: &Path) -> Option<&PlanEntry> {
        self.entries().find(|e| e.original_path == key)
    }

    pub fn find_mut(&mut self, key: &Path) -> Option<&mut PlanEntry> {
        self.folders
            .values_mut()
            .flatten()
            .find(|e| e.original_path == key)
    }

    /// Move an entry to a different folder list, keeping it in exactly
    /// one list. Returns false when the key is unknown.
    pub fn move_entry(&mut self, key: &Path, new_folder: &str) -> bool {
        let mut taken = None;
        for entries in self.folders.values_mut() {
            if let Some(pos) = entries.iter().position(|e| e.original_path == key) {
                taken = Some(entries.remove(pos));
                break;
            }
        }
        let Some(mut entry) = taken else {
            return false;
        };
        entry.proposed_folder = new_folder.to_string();
        self.insert(entry);
        self.folders.retain(|_, v| !v.is_empty());
        true
    }
}

/// Builds a plan from a file list, classifier output and the catalog
pub struct PlanBuilder {
    tagger: Arc<dyn TaggingService>,
    categories: CategoryMap,
    threshold: f64,
    catalog: Option<Arc<Catalog>>,
    write_through: bool,
}

impl PlanBuilder {
    pub fn new(tagger: Arc<dyn TaggingService>, threshold: f64) -> Self {
        Self {
            tagger,
            categories: CategoryMap::default(),
            threshold,
            catalog: None,
            write_through: false,
        }
    }

    /// Merge persisted metadata into built entries; optionally write
    /// freshly merged tags back so searches see them immediately
    pub fn with_catalog(mut self, catalog: Arc<Catalog>, write_through: bool) -> Self {
        self.catalog = Some(catalog);
        self.write_through = write_through;
        self
    }

    pub fn with_categories(mut self, categories: CategoryMap) -> Self {
        self.categories = categories;
        self
    }

    /// Build the entry for one file. Classification failures degrade
    /// to an uncategorized entry with no tags; they never abort a
    /// batch.
    pub async fn build_entry(&self, path: &Path) -> PlanEntry {
        let labels = match self.tagger.classify(path, self.threshold).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!("Classification failed for {:?}: {}", path, e);
                Vec::new()
            }
        };

        let folder = self.categories.assign_folder(&labels);
        let tags = self.categories.labels_to_tags(&labels);
        let mut entry = PlanEntry::new(path, tags, folder);

        if let Some(catalog) = &self.catalog {
            self.merge_catalog(catalog, &mut entry);
        }

        entry
    }

    /// Merge persisted metadata: the catalog's display name wins
    /// unless the user renamed the entry this session, and tags are
    /// the union of both sides.
    fn merge_catalog(&self, catalog: &Catalog, entry: &mut PlanEntry) {
        if let Some(meta) = catalog.lookup(&entry.original_path) {
            if !entry.renamed_by_user {
                entry.new_filename = meta.filename;
            }
            entry.tags.extend(meta.tags);
            entry.rating = meta.rating;
            entry.color_label = meta.color_label;
        }

        if self.write_through {
            // Deliberately outside the undo log: reverting a manual
            // edit does not revert this automatic catalog write.
            if let Err(e) = catalog.upsert(
                &entry.original_path,
                &entry.new_filename,
                entry.tags.clone(),
                entry.rating,
                &entry.color_label,
            ) {
                debug!("Write-through skipped for {:?}: {}", entry.original_path, e);
            }
        }
    }

    /// Build a folder-grouped plan for a flat file list
    pub async fn build(&self, files: &[PathBuf]) -> Plan {
        let mut plan = Plan::new();
        for path in files {
            plan.insert(self.build_entry(path).await);
        }
        plan
    }
}
