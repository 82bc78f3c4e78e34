//! JSON file state store.
//!
//! One `<kind>.json` file per stream kind under a directory. Saves write a
//! temp file, sync it, then rename over the old state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::{IngestError, IngestResult, PipelineState, StreamKind};
use crate::ports::outbound::StateStore;

/// State store persisting [`PipelineState`] as JSON files.
#[derive(Clone, Debug)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    /// Store rooted at `dir`; created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding `kind`'s state.
    pub fn path_for(&self, kind: StreamKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.name()))
    }

    fn io_error(path: &Path, e: std::io::Error) -> IngestError {
        IngestError::StateStore(format!("{}: {}", path.display(), e))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load_last(&self, kind: StreamKind) -> IngestResult<Option<PipelineState>> {
        let path = self.path_for(kind);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&path, e)),
        };
        let state: PipelineState = serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::StateStore(format!("{}: {}", path.display(), e)))?;
        if state.kind != kind {
            return Err(IngestError::StateStore(format!(
                "{} holds {} state",
                path.display(),
                state.kind
            )));
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &PipelineState) -> IngestResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_error(&self.dir, e))?;

        let path = self.path_for(state.kind);
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| IngestError::StateStore(e.to_string()))?;

        let temp_path = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| Self::io_error(&temp_path, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| Self::io_error(&temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::io_error(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;

        debug!(kind = %state.kind, path = %path.display(), "Saved pipeline state");
        Ok(())
    }
}
