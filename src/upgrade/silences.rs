//! Per-org silence files read by the Alertmanager on start.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::unified::MeshSilence;

const ALERTING_DIR: &str = "alerting";
const SILENCES_FILE: &str = "silences";

#[derive(Debug, Error)]
pub enum SilenceError {
    #[error("failed to access silence file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to encode silences: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SilenceError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
pub trait SilenceSink: Send + Sync {
    /// Silences stored for `org_id`; empty when no file exists.
    async fn read(&self, org_id: i64) -> Result<Vec<MeshSilence>, SilenceError>;

    /// Replaces the silences of `org_id`.
    async fn write(&self, org_id: i64, silences: &[MeshSilence]) -> Result<(), SilenceError>;

    async fn remove(&self, org_id: i64) -> Result<(), SilenceError>;

    /// Removes the silence files of every org.
    async fn remove_all(&self) -> Result<(), SilenceError>;
}

/// Stores silences as a JSON list at `<data_path>/alerting/<org_id>/silences`.
#[derive(Debug, Clone)]
pub struct FileSilenceSink {
    data_path: PathBuf,
}

impl FileSilenceSink {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
        }
    }

    pub fn silences_path(&self, org_id: i64) -> PathBuf {
        self.data_path
            .join(ALERTING_DIR)
            .join(org_id.to_string())
            .join(SILENCES_FILE)
    }

    async fn remove_file(path: &Path) -> Result<(), SilenceError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed silence file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SilenceError::io(path, err)),
        }
    }
}

#[async_trait]
impl SilenceSink for FileSilenceSink {
    async fn read(&self, org_id: i64) -> Result<Vec<MeshSilence>, SilenceError> {
        let path = self.silences_path(org_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(SilenceError::io(&path, err)),
        }
    }

    async fn write(&self, org_id: i64, silences: &[MeshSilence]) -> Result<(), SilenceError> {
        let path = self.silences_path(org_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|err| SilenceError::io(dir, err))?;
        }
        let encoded = serde_json::to_vec(silences)?;
        fs::write(&path, encoded)
            .await
            .map_err(|err| SilenceError::io(&path, err))?;
        info!(org_id, count = silences.len(), path = %path.display(), "wrote silence file");
        Ok(())
    }

    async fn remove(&self, org_id: i64) -> Result<(), SilenceError> {
        Self::remove_file(&self.silences_path(org_id)).await
    }

    async fn remove_all(&self) -> Result<(), SilenceError> {
        let root = self.data_path.join(ALERTING_DIR);
        let mut entries = match fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(SilenceError::io(&root, err)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| SilenceError::io(&root, err))?
        {
            Self::remove_file(&entry.path().join(SILENCES_FILE)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence() -> MeshSilence {
        MeshSilence::equal_matchers(&[("alertname", "DatasourceError"), ("rule_uid", "abc")], "test")
    }

    #[tokio::test]
    async fn write_read_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSilenceSink::new(dir.path());

        assert!(sink.read(1).await.unwrap().is_empty());
        sink.write(1, &[silence()]).await.unwrap();
        assert!(dir.path().join("alerting/1/silences").exists());

        let stored = sink.read(1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].matcher_value("rule_uid"), Some("abc"));

        sink.remove(1).await.unwrap();
        assert!(sink.read(1).await.unwrap().is_empty());
        sink.remove(1).await.unwrap();
    }

    #[tokio::test]
    async fn remove_all_clears_every_org() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSilenceSink::new(dir.path());
        sink.write(1, &[silence()]).await.unwrap();
        sink.write(2, &[silence()]).await.unwrap();

        sink.remove_all().await.unwrap();
        assert!(!sink.silences_path(1).exists());
        assert!(!sink.silences_path(2).exists());
    }

    #[tokio::test]
    async fn remove_all_without_data_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSilenceSink::new(dir.path().join("missing"));
        sink.remove_all().await.unwrap();
    }
}
