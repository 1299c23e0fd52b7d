//! Append-only creation history
//!
//! A best-effort JSON log of created worktrees. The file is read in full,
//! appended to, and written back on each save; git's own registry remains
//! the source of truth for which worktrees currently exist.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub branch_name: String,
    pub issue_url: String,
    pub issue_number: u64,
    pub repository: String,
}

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load all records; a missing or unreadable file yields an empty list
    pub fn load(&self) -> Vec<HistoryRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };

        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    "History file {} is unreadable ({err}); treating it as empty",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    /// Append one record, rewriting the whole file.
    ///
    /// Safe only under the single-process assumption; there is no locking.
    pub fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.load();
        records.push(record);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(&records)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write history to {}", self.path.display()))?;
        Ok(())
    }

    /// Most recent record for a worktree path, if any
    pub fn find_by_path(&self, path: &Path) -> Option<HistoryRecord> {
        self.load()
            .into_iter()
            .rev()
            .find(|record| record.path == path)
    }
}
