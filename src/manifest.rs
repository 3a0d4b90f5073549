/*!
 * Run manifest: which selections produced which files, and which were
 * skipped and why. Append-only while the run progresses.
 */

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{SelectionError, Stage};
use crate::file_utils::FileManager;
use crate::models::LayoutKind;

/// How a succeeded selection ended up in the outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Published as its own file
    Published,
    /// Included in a short-form batch
    Batched,
    /// Included in a batch and also kept as its own file
    BatchedAndPreserved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub outputs: Vec<PathBuf>,
    /// Duration of the selection's own composed clip in seconds
    pub duration: f64,
    pub layout: LayoutKind,
    pub outcome: EntryOutcome,
    /// Batch number (1-based) for batched entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub id: String,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub members: Vec<String>,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub source: PathBuf,
    pub layout: LayoutKind,
    pub started_at: DateTime<Local>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
    #[serde(default)]
    pub skipped: Vec<SkippedEntry>,
    #[serde(default)]
    pub batches: Vec<BatchEntry>,
}

impl RunManifest {
    pub fn new<P: AsRef<Path>>(source: P, layout: LayoutKind) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            layout,
            started_at: Local::now(),
            finished_at: None,
            entries: Vec::new(),
            skipped: Vec::new(),
            batches: Vec::new(),
        }
    }

    pub fn record_success(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    pub fn record_failure(&mut self, error: &SelectionError) {
        self.record_skip(&error.selection_id, error.stage, error.source.to_string());
    }

    pub fn record_skip(&mut self, id: &str, stage: Stage, reason: impl Into<String>) {
        self.skipped.push(SkippedEntry {
            id: id.to_string(),
            stage,
            reason: reason.into(),
        });
    }

    pub fn record_batch(&mut self, batch: BatchEntry) {
        self.batches.push(batch);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    pub fn succeeded_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Pretty JSON, written atomically
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        FileManager::write_atomically(path, &json)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}
