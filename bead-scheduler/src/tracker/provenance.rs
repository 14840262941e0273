//! Append-only provenance log, one JSON record per line

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::ProvenanceRecord;

pub struct ProvenanceLog {
    path: PathBuf,
    /// Serializes appends so concurrent requests never interleave lines
    write_lock: Mutex<()>,
}

impl ProvenanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line
    pub async fn append(&self, record: &ProvenanceRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record).map_err(io::Error::other)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        log::info!(
            "[PROVENANCE] {} {} -> {} (session: {:?}, actor: {:?})",
            record.action,
            record.work_item_id,
            record.resulting_status,
            record.session_id,
            record.actor
        );
        Ok(())
    }

    /// All records in append order. A missing file reads as empty; lines
    /// that do not parse are skipped.
    pub async fn read_all(&self) -> io::Result<Vec<ProvenanceRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let records = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("[PROVENANCE] Skipping unreadable record: {}", e);
                    None
                }
            })
            .collect();
        Ok(records)
    }
}
