//! Append-only per-node history, written as newline-delimited JSON
//! under a well-known directory scheme. Writes are best-effort: a
//! failure to append must never fail a node execution, so every
//! fallible step here only ever logs a warning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOp {
    Input,
    Output,
    Interrupt,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub op: HistoryOp,
    pub payload: Value,
}

impl HistoryEntry {
    pub fn new(op: HistoryOp, payload: Value) -> Self {
        Self { timestamp: Utc::now(), op, payload }
    }
}

/// Writes history records for one `(session, node)` pair into
/// `<base>/<session>/<node_id>.jsonl`.
#[derive(Debug, Clone)]
pub struct HistoryWriter {
    path: PathBuf,
}

impl HistoryWriter {
    pub fn new(base_path: &Path, session: &str, node_id: &str) -> Self {
        Self {
            path: base_path.join(session).join(format!("{node_id}.jsonl")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &HistoryEntry) {
        if let Err(e) = self.try_append(entry).await {
            tracing::warn!(path = %self.path.display(), error = %e, "history append failed, continuing");
        }
    }

    async fn try_append(&self, entry: &HistoryEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry).unwrap_or_default();
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
