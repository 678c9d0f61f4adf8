// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Background scan pipeline with progress events and cooperative
//! cancellation
//!
//! One scan runs per session. Events arrive in file-index order and
//! the stream always ends with exactly one terminal event; a
//! cancelled scan yields the partial plan accumulated so far, never a
//! half-built structure.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::plan::{Plan, PlanBuilder};
use crate::{ImagoError, Result};

/// Events emitted by a running scan
#[derive(Debug)]
pub enum ScanEvent {
    /// Per-file progress, emitted in strictly increasing index order
    Progress {
        index: usize,
        total: usize,
        percent: u8,
        file: String,
    },
    /// Scan finished over every enumerated file
    Completed(Plan),
    /// Scan stopped at a file boundary; carries the partial plan
    Cancelled(Plan),
    /// Enumeration-level failure; per-file errors never produce this
    Failed(String),
}

impl ScanEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanEvent::Progress { .. })
    }
}

/// Shared cancellation flag, checked once per file boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to an in-flight scan
pub struct ScanHandle {
    events: mpsc::UnboundedReceiver<ScanEvent>,
    token: CancelToken,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Next event; `None` after the terminal event has been consumed
    /// and the channel drained
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Request cooperative cancellation at the next file boundary
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Wait for the background task to finish
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Scan task did not finish cleanly: {}", e);
        }
    }
}

/// Drives the plan builder over a directory in a background task.
/// Starting a new scan stops the one in flight first; two concurrent
/// scans are never allowed.
pub struct ScanPipeline {
    builder: Arc<PlanBuilder>,
    extensions: Vec<String>,
    current: Mutex<Option<CancelToken>>,
}

impl ScanPipeline {
    pub fn new(builder: Arc<PlanBuilder>, extensions: Vec<String>) -> Self {
        Self {
            builder,
            extensions,
            current: Mutex::new(None),
        }
    }

    /// Spawn a scan over `source_dir`, cancelling any prior scan
    pub fn start(&self, source_dir: PathBuf, recursive: bool) -> ScanHandle {
        let token = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(prev) = current.take() {
                info!("Stopping previous scan before starting a new one");
                prev.cancel();
            }
            let token = CancelToken::new();
            *current = Some(token.clone());
            token
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let builder = Arc::clone(&self.builder);
        let extensions = self.extensions.clone();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            run_scan(builder, extensions, source_dir, recursive, task_token, tx).await;
        });

        ScanHandle { events: rx, token, task }
    }
}

/// Enumerate image files under `source_dir` by the case-insensitive
/// extension allow-list, sorted for deterministic event order
pub fn enumerate_images(
    source_dir: &Path,
    recursive: bool,
    extensions: &[String],
) -> Result<Vec<PathBuf>> {
    if !source_dir.is_dir() {
        return Err(ImagoError::Scan(format!(
            "Source directory does not exist: {}",
            source_dir.display()
        )));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(source_dir).max_depth(max_depth) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // Unreadable subtrees degrade, they do not fail the scan
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| extensions.iter().any(|allow| allow.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn run_scan(
    builder: Arc<PlanBuilder>,
    extensions: Vec<String>,
    source_dir: PathBuf,
    recursive: bool,
    token: CancelToken,
    tx: mpsc::UnboundedSender<ScanEvent>,
) {
    let files = match enumerate_images(&source_dir, recursive, &extensions) {
        Ok(files) => files,
        Err(e) => {
            let _ = tx.send(ScanEvent::Failed(e.to_string()));
            return;
        }
    };

    let total = files.len();
    info!("Scanning {} images under {}", total, source_dir.display());

    let mut plan = Plan::new();
    for (i, file) in files.iter().enumerate() {
        // File boundary: the only cancellation point, so a file's
        // classification is never interrupted midway.
        if token.is_cancelled() {
            info!("Scan cancelled after {} of {} files", i, total);
            let _ = tx.send(ScanEvent::Cancelled(plan));
            return;
        }

        let index = i + 1;
        let _ = tx.send(ScanEvent::Progress {
            index,
            total,
            percent: ((index * 100) / total.max(1)) as u8,
            file: file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        });

        plan.insert(builder.build_entry(file).await);
    }

    let _ = tx.send(ScanEvent::Completed(plan));
}
