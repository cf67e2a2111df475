//! Bounded in-memory log of prompts and raw completions for developer
//! inspection. Recording never blocks and never fails the caller: if the
//! lock is contended or poisoned the entry is dropped.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub at: DateTime<Utc>,
    pub label: String,
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub outcome: DebugOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DebugOutcome {
    Response(String),
    Error(String),
}

#[derive(Debug)]
pub struct DebugLog {
    capacity: usize,
    entries: Mutex<VecDeque<DebugEntry>>,
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, entry: DebugEntry) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut entries) = self.entries.try_lock() else {
            trace!(label = %entry.label, "debug log busy, entry dropped");
            return;
        };
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<DebugEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Restores a log written by `save_json`, keeping the newest
    /// `capacity` entries. A missing file gives an empty log.
    pub fn load_json(path: &Path, capacity: usize) -> PipelineResult<Self> {
        let log = Self::new(capacity);
        if !path.exists() {
            return Ok(log);
        }
        let content = fs::read_to_string(path)?;
        let entries: Vec<DebugEntry> = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;
        for entry in entries {
            log.record(entry);
        }
        Ok(log)
    }

    pub fn save_json(&self, path: &Path) -> PipelineResult<()> {
        let serialized = serde_json::to_string_pretty(&self.entries())
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        fs::write(path, serialized)?;
        Ok(())
    }
}
