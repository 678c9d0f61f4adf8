// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Linear undo/redo over plan-entry edits
//!
//! Commands are data only: a key plus before/after snapshots of the
//! mutable fields. The caller applies the edit first, pushes the
//! command, and performs its own refresh from the key returned by
//! undo/redo. Automatic catalog write-through happens outside this
//! log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use crate::plan::{Plan, PlanEntry};

/// Snapshot of a plan entry's mutable fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntrySnapshot {
    pub new_filename: String,
    pub tags: BTreeSet<String>,
    pub rating: u8,
    pub color_label: String,
    pub renamed_by_user: bool,
}

impl EntrySnapshot {
    /// Capture the current state of an entry
    pub fn of(entry: &PlanEntry) -> Self {
        Self {
            new_filename: entry.new_filename.clone(),
            tags: entry.tags.clone(),
            rating: entry.rating,
            color_label: entry.color_label.clone(),
            renamed_by_user: entry.renamed_by_user,
        }
    }

    /// Write this snapshot back onto an entry
    pub fn apply(&self, entry: &mut PlanEntry) {
        entry.new_filename = self.new_filename.clone();
        entry.tags = self.tags.clone();
        entry.rating = self.rating;
        entry.color_label = self.color_label.clone();
        entry.renamed_by_user = self.renamed_by_user;
    }
}

/// One recorded mutation: applying `before` then `after` round-trips
/// the entry between its original and edited states exactly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub key: PathBuf,
    pub before: EntrySnapshot,
    pub after: EntrySnapshot,
}

impl Command {
    pub fn new(key: PathBuf, before: EntrySnapshot, after: EntrySnapshot) -> Self {
        Self { key, before, after }
    }
}

/// Linear history: any new push clears the redo stack, so there is no
/// branching
#[derive(Debug, Default)]
pub struct HistoryManager {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation the caller has already applied
    pub fn push(&mut self, command: Command) {
        self.undo_stack.push(command);
        self.redo_stack.clear();
    }

    /// Revert the most recent edit. Returns the affected key so the
    /// caller can refresh its view; `None` when there is nothing to
    /// undo.
    pub fn undo(&mut self, plan: &mut Plan) -> Option<PathBuf> {
        let command = self.undo_stack.pop()?;
        let key = command.key.clone();
        match plan.find_mut(&key) {
            Some(entry) => command.before.apply(entry),
            None => debug!("Undo target {:?} no longer in plan", key),
        }
        self.redo_stack.push(command);
        Some(key)
    }

    /// Re-apply the most recently undone edit
    pub fn redo(&mut self, plan: &mut Plan) -> Option<PathBuf> {
        let command = self.redo_stack.pop()?;
        let key = command.key.clone();
        match plan.find_mut(&key) {
            Some(entry) => command.after.apply(entry),
            None => debug!("Redo target {:?} no longer in plan", key),
        }
        self.undo_stack.push(command);
        Some(key)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Drop both stacks, e.g. when a new scan replaces the plan
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Apply an edit to an entry and record it in one step
pub fn apply_edit<F>(
    plan: &mut Plan,
    history: &mut HistoryManager,
    key: &std::path::Path,
    edit: F,
) -> bool
where
    F: FnOnce(&mut PlanEntry),
{
    let Some(entry) = plan.find_mut(key) else {
        return false;
    };
    let before = EntrySnapshot::of(entry);
    edit(entry);
    let after = EntrySnapshot::of(entry);
    history.push(Command::new(key.to_path_buf(), before, after));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn plan_with_entry(key: &str) -> Plan {
        let mut plan = Plan::new();
        plan.insert(PlanEntry::new(
            Path::new(key),
            BTreeSet::new(),
            "Uncategorized".to_string(),
        ));
        plan
    }

    #[test]
    fn undo_then_redo_round_trips_n_edits() {
        let key = Path::new("/pics/a.jpg");
        let mut plan = plan_with_entry("/pics/a.jpg");
        let mut history = HistoryManager::new();

        let original = EntrySnapshot::of(plan.find(key).unwrap());

        for i in 1..=4u8 {
            apply_edit(&mut plan, &mut history, key, |e| {
                e.rating = i;
                e.new_filename = format!("edit_{}", i);
                e.renamed_by_user = true;
            });
        }
        let edited = EntrySnapshot::of(plan.find(key).unwrap());
        assert_eq!(edited.rating, 4);

        for _ in 0..4 {
            assert_eq!(history.undo(&mut plan), Some(key.to_path_buf()));
        }
        assert_eq!(EntrySnapshot::of(plan.find(key).unwrap()), original);
        assert!(!history.can_undo());

        for _ in 0..4 {
            assert_eq!(history.redo(&mut plan), Some(key.to_path_buf()));
        }
        assert_eq!(EntrySnapshot::of(plan.find(key).unwrap()), edited);
        assert!(!history.can_redo());
    }

    #[test]
    fn push_clears_redo_stack() {
        let key = Path::new("/pics/a.jpg");
        let mut plan = plan_with_entry("/pics/a.jpg");
        let mut history = HistoryManager::new();

        apply_edit(&mut plan, &mut history, key, |e| e.rating = 1);
        apply_edit(&mut plan, &mut history, key, |e| e.rating = 2);
        history.undo(&mut plan);
        assert!(history.can_redo());

        // A fresh edit forks history: the undone branch is gone
        apply_edit(&mut plan, &mut history, key, |e| e.rating = 5);
        assert!(!history.can_redo());
        assert_eq!(plan.find(key).unwrap().rating, 5);
    }

    #[test]
    fn undo_on_empty_history_is_a_noop() {
        let mut plan = plan_with_entry("/pics/a.jpg");
        let mut history = HistoryManager::new();
        assert_eq!(history.undo(&mut plan), None);
        assert_eq!(history.redo(&mut plan), None);
    }

    #[test]
    fn edit_on_unknown_key_is_rejected() {
        let mut plan = plan_with_entry("/pics/a.jpg");
        let mut history = HistoryManager::new();
        assert!(!apply_edit(
            &mut plan,
            &mut history,
            Path::new("/pics/missing.jpg"),
            |e| e.rating = 1
        ));
        assert!(!history.can_undo());
    }

    #[test]
    fn snapshots_cover_tags_and_labels() {
        let key = Path::new("/pics/a.jpg");
        let mut plan = plan_with_entry("/pics/a.jpg");
        let mut history = HistoryManager::new();

        apply_edit(&mut plan, &mut history, key, |e| {
            e.tags.insert("sunset".to_string());
            e.color_label = "Red".to_string();
        });
        history.undo(&mut plan);

        let entry = plan.find(key).unwrap();
        assert!(entry.tags.is_empty());
        assert_eq!(entry.color_label, "");
    }
}
