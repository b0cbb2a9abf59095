use crate::error::Result;
use embedsync_store::unix_now_ms;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Failure reasons kept in the persisted snapshot (rolling cap).
const MAX_SNAPSHOT_FAILURES: usize = 20;

/// Per-chunk failure recorded by the batch generator or the merger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkFailure {
    pub id: String,
    pub reason: String,
}

impl ChunkFailure {
    #[must_use]
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of one merge run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every selected chunk embedded and merged
    Clean,
    /// The commit happened, but some chunks were skipped with a warning
    Partial,
}

/// Counters describing one reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    /// New records added to the store
    pub inserted: usize,
    /// Stored records replaced wholesale by fresh embeddings
    pub updated: usize,
    /// Stored records carried over unchanged
    pub retained: usize,
    /// Stored records dropped because their chunks left the source
    pub deleted: usize,
    /// Chunks handed to the embedder this run
    pub embedded: usize,
    /// Chunks skipped by selection (stored content hash still current)
    pub skipped: usize,
    /// Wall-clock time for the whole run in milliseconds
    pub time_ms: u64,
    /// Per-chunk failures, in decision order
    pub failures: Vec<ChunkFailure>,
}

impl MergeReport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inserted: 0,
            updated: 0,
            retained: 0,
            deleted: 0,
            embedded: 0,
            skipped: 0,
            time_ms: 0,
            failures: Vec::new(),
        }
    }

    pub fn add_failure(&mut self, failure: ChunkFailure) {
        self.failures.push(failure);
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        if self.failures.is_empty() {
            RunOutcome::Clean
        } else {
            RunOutcome::Partial
        }
    }
}

impl Default for MergeReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the last run, persisted next to the store so `status` and
/// other processes can report on it without replaying logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub finished_at_unix_ms: u64,
    pub duration_ms: u64,
    pub inserted: usize,
    pub updated: usize,
    pub retained: usize,
    pub deleted: usize,
    pub failed: usize,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<String>,
}

#[must_use]
pub fn snapshot_path_for_store(store_path: &Path) -> PathBuf {
    store_path.with_extension("last_run.json")
}

pub async fn write_run_snapshot(store_path: &Path, report: &MergeReport) -> Result<RunSnapshot> {
    let snapshot = RunSnapshot {
        finished_at_unix_ms: unix_now_ms(),
        duration_ms: report.time_ms,
        inserted: report.inserted,
        updated: report.updated,
        retained: report.retained,
        deleted: report.deleted,
        failed: report.failed(),
        outcome: report.outcome(),
        failure_reasons: report
            .failures
            .iter()
            .take(MAX_SNAPSHOT_FAILURES)
            .map(|failure| format!("{}: {}", failure.id, failure.reason))
            .collect(),
    };

    let path = snapshot_path_for_store(store_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(snapshot)
}

pub async fn read_run_snapshot(store_path: &Path) -> Result<Option<RunSnapshot>> {
    let path = snapshot_path_for_store(store_path);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
