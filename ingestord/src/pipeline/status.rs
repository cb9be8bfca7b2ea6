//! Status record: the canonical, always-fresh signal of what the pipeline
//! is doing, written atomically on every state transition.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub timestamp: String,
    pub status: PipelineState,
    pub detail: String,
    pub current_artist: Option<String>,
}

impl StatusRecord {
    pub fn new(status: PipelineState, detail: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status,
            detail: detail.into(),
            current_artist: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.current_artist = Some(artist.into());
        self
    }
}

pub fn write_status(path: &Path, record: &StatusRecord) -> ingest_common::Result<()> {
    ingest_common::atomic_io::write_json_atomic(path, record)
}

pub fn read_status(path: &Path) -> ingest_common::Result<Option<StatusRecord>> {
    ingest_common::atomic_io::read_json_opt(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_with_current_artist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline_status.json");

        let record = StatusRecord::new(PipelineState::Running, "scanning inbox")
            .with_artist("The Foo Bars");
        write_status(&path, &record).unwrap();

        let read_back = read_status(&path).unwrap().unwrap();
        assert_eq!(read_back.status, PipelineState::Running);
        assert_eq!(read_back.current_artist.as_deref(), Some("The Foo Bars"));
    }

    #[test]
    fn missing_status_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_status(&path).unwrap().is_none());
    }
}
