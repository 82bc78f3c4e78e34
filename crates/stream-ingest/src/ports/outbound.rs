//! # Outbound Ports
//!
//! Collaborators the pipeline depends on: object storage, the node
//! registry, resume-state persistence and the downstream sink.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{ConsensusNode, IngestResult, PipelineState, StreamFile, StreamKind};

/// Object storage holding every node's published files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List keys directly under `prefix` (no deeper `/`), in ascending
    /// order, strictly after `after`, at most `limit` keys.
    async fn list(&self, prefix: &str, after: Option<&str>, limit: usize)
        -> IngestResult<Vec<String>>;

    /// Fetch the full object at `key`.
    async fn get_bytes(&self, key: &str) -> IngestResult<Bytes>;
}

/// Source of the current consensus node set.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Nodes with stakes and public keys, as of now.
    async fn current_nodes(&self) -> IngestResult<Vec<ConsensusNode>>;
}

/// Durable per-kind resume state.
///
/// Must be read-after-write consistent for one pipeline instance.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last saved state for `kind`, `None` if nothing was ever accepted.
    async fn load_last(&self, kind: StreamKind) -> IngestResult<Option<PipelineState>>;

    /// Save marker and hash in one call.
    async fn save(&self, state: &PipelineState) -> IngestResult<()>;
}

/// Downstream consumer of accepted files, called in resume-marker order.
///
/// A pass that fails after the sink accepted a file but before state was
/// saved re-delivers that file on the next pass, so sinks must be
/// idempotent per filename.
#[async_trait]
pub trait StreamFileSink: Send + Sync {
    /// Take ownership of an accepted file.
    async fn accept(&self, file: StreamFile) -> IngestResult<()>;
}
