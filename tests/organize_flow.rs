// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! End-to-end flow: scan a directory, edit the plan through the
//! history log, commit it, and check the persisted catalog.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use imago::catalog::Catalog;
use imago::classify::{ScoredLabel, TaggingService};
use imago::commit::{CommitExecutor, CommitMode, CommitStats};
use imago::history::{apply_edit, HistoryManager};
use imago::plan::PlanBuilder;
use imago::scan::{ScanEvent, ScanPipeline};
use imago::tagdb::TagIndex;
use imago::{ImagoError, Result};

/// Classifier stub keyed by file stem; unknown stems fail, like an
/// undecodable image would
struct ScriptedTagger {
    responses: HashMap<String, Vec<ScoredLabel>>,
}

impl ScriptedTagger {
    fn new(entries: &[(&str, &[(&str, f64)])]) -> Self {
        let responses = entries
            .iter()
            .map(|(stem, labels)| {
                (
                    stem.to_string(),
                    labels
                        .iter()
                        .map(|(l, c)| ScoredLabel::new(*l, *c))
                        .collect(),
                )
            })
            .collect();
        Self { responses }
    }
}

#[async_trait]
impl TaggingService for ScriptedTagger {
    async fn classify(&self, path: &Path, _threshold: f64) -> Result<Vec<ScoredLabel>> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.responses
            .get(&stem)
            .cloned()
            .ok_or_else(|| ImagoError::Classification(format!("cannot decode {}", stem)))
    }
}

fn write_images(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn scan_edit_commit_round_trip() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_images(source.path(), &["armor.jpg", "bike.jpg", "broken.jpg"]);

    let catalog_path = source.path().join("catalog.json");
    let catalog = Arc::new(Catalog::new());
    catalog.create(&catalog_path).unwrap();
    catalog.set_base_dir(source.path()).unwrap();

    let tagger = ScriptedTagger::new(&[
        ("armor", &[("tank", 0.93), ("camouflage", 0.41)]),
        ("bike", &[("bicycle", 0.88)]),
        // "broken" is absent: classification fails for it
    ]);

    let builder = Arc::new(
        PlanBuilder::new(Arc::new(tagger), 0.3).with_catalog(Arc::clone(&catalog), true),
    );
    let pipeline = ScanPipeline::new(builder, vec!["jpg".to_string()]);
    let mut handle = pipeline.start(source.path().to_path_buf(), true);

    let mut plan = None;
    while let Some(event) = handle.next_event().await {
        if let ScanEvent::Completed(done) = event {
            plan = Some(done);
        }
    }
    let mut plan = plan.expect("scan should complete");

    // tank + camouflage both map to Military; bicycle to Vehicles;
    // the failing file degrades to Uncategorized
    assert_eq!(plan.entry_count(), 3);
    assert_eq!(plan.folders()["Military"].len(), 1);
    assert_eq!(plan.folders()["Vehicles"].len(), 1);
    assert_eq!(plan.folders()["Uncategorized"].len(), 1);

    // Interactive edits run through the history log
    let key = source.path().join("armor.jpg");
    let mut history = HistoryManager::new();
    assert!(apply_edit(&mut plan, &mut history, &key, |e| {
        e.new_filename = "Desert Exercise".to_string();
        e.renamed_by_user = true;
        e.rating = 5;
    }));

    history.undo(&mut plan);
    assert_eq!(plan.find(&key).unwrap().rating, 0);
    history.redo(&mut plan);
    assert_eq!(plan.find(&key).unwrap().new_filename, "Desert Exercise");

    // Commit with the edited name; extension comes from the source
    let index = TagIndex::in_memory().unwrap();
    let stats = CommitExecutor::new(dest.path().to_path_buf(), CommitMode::Copy)
        .with_index(index.clone())
        .execute(&plan)
        .unwrap();
    assert_eq!(stats, CommitStats { processed: 3, merged: 0, failed: 0 });
    assert!(dest.path().join("Military/Desert Exercise.jpg").exists());
    assert!(dest.path().join("Vehicles/bike.jpg").exists());
    assert!(dest.path().join("Uncategorized/broken.jpg").exists());
    assert_eq!(index.search("tank", 10).unwrap().len(), 1);

    // Write-through made the scan's tags durable: a reloaded catalog
    // finds them without rescanning
    catalog.save().unwrap();
    let reloaded = Catalog::new();
    reloaded.load(&catalog_path).unwrap();
    assert_eq!(reloaded.search("tank"), vec!["armor.jpg".to_string()]);
    assert_eq!(
        reloaded.get(&key).tags,
        ["Military", "camouflage", "tank"]
            .iter()
            .map(|t| t.to_string())
            .collect::<BTreeSet<_>>()
    );
}
