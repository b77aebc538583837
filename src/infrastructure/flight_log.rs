//! JSON-lines flight recorder.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::models::RoundSummary;
use crate::domain::ports::FlightRecorder;

#[derive(Serialize)]
struct FlightRecord<'a> {
    event: &'static str,
    #[serde(flatten)]
    summary: &'a RoundSummary,
}

/// Appends one JSON object per finalized round to a file.
pub struct JsonlFlightRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFlightRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FlightRecorder for JsonlFlightRecorder {
    async fn record_round(&self, summary: &RoundSummary) -> Result<()> {
        let mut line = serde_json::to_vec(&FlightRecord {
            event: "round_finalized",
            summary,
        })?;
        line.push(b'\n');

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
            .await
            .with_context(|| format!("Failed to open flight log {}", self.path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
