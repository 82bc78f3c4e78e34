//! # Domain Errors
//!
//! Two layers: [`StreamFault`] is a per-filename outcome that never aborts a
//! pass, [`IngestError`] is a failure of the pipeline itself (config, state
//! store, sink).

use thiserror::Error;

use super::filename::StreamKind;
use super::value_objects::{FileHash, NodeId};

/// Structured fault reported for one filename (or one node's copy of it).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamFault {
    /// Storage transfer failed. The transport owns retries.
    #[error("transfer of {filename} from node {node} failed: {reason}")]
    TransientIo {
        /// Node the transfer was from
        node: NodeId,
        /// Object filename
        filename: String,
        /// Transport error text
        reason: String,
    },

    /// No attestation group reached the stake threshold.
    #[error("quorum not reached for {filename}: best stake {best_stake} < {required_stake}")]
    QuorumNotReached {
        /// Signature filename
        filename: String,
        /// Stake of the best group
        best_stake: u64,
        /// Stake required
        required_stake: u64,
    },

    /// A node's copy does not hash to the agreed value.
    #[error("hash mismatch for {filename} from node {node}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Node the copy came from
        node: NodeId,
        /// Data filename
        filename: String,
        /// Agreed hash
        expected: FileHash,
        /// Computed hash
        actual: FileHash,
    },

    /// The file does not reference the last accepted file.
    #[error("chain discontinuity at {filename}: expected previous {expected}, found {}", display_opt(.actual))]
    ChainDiscontinuity {
        /// Data filename
        filename: String,
        /// Hash of the last accepted file
        expected: FileHash,
        /// Previous hash carried by the candidate
        actual: Option<FileHash>,
    },

    /// A node's copy could not be decoded.
    #[error("malformed {filename} from node {node}: {reason}")]
    MalformedFile {
        /// Node the copy came from
        node: NodeId,
        /// Object filename
        filename: String,
        /// Decoder error text
        reason: String,
    },

    /// A sidecar could not be fetched or did not match its reference.
    #[error("sidecar {sidecar_id} of {filename} from node {node}: {reason}")]
    SidecarMismatch {
        /// Node the sidecar came from
        node: NodeId,
        /// Parent data filename
        filename: String,
        /// Sidecar index
        sidecar_id: u8,
        /// Failure text
        reason: String,
    },

    /// A node task failed outside of per-file handling.
    #[error("node task {} failed: {reason}", display_opt(.node))]
    NodeTaskFailed {
        /// Node, when known
        node: Option<NodeId>,
        /// Failure text
        reason: String,
    },
}

fn display_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<none>".to_string(),
    }
}

impl StreamFault {
    /// Metric label for the fault.
    pub fn label(&self) -> &'static str {
        match self {
            StreamFault::TransientIo { .. } => "transient_io",
            StreamFault::QuorumNotReached { .. } => "quorum_not_reached",
            StreamFault::HashMismatch { .. } => "hash_mismatch",
            StreamFault::ChainDiscontinuity { .. } => "chain_discontinuity",
            StreamFault::MalformedFile { .. } => "malformed_file",
            StreamFault::SidecarMismatch { .. } => "sidecar_mismatch",
            StreamFault::NodeTaskFailed { .. } => "node_task_failed",
        }
    }

    /// Only a broken chain stops the stream kind.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamFault::ChainDiscontinuity { .. })
    }

    /// Node the fault is attributed to, if any.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            StreamFault::TransientIo { node, .. }
            | StreamFault::HashMismatch { node, .. }
            | StreamFault::MalformedFile { node, .. }
            | StreamFault::SidecarMismatch { node, .. } => Some(node),
            StreamFault::NodeTaskFailed { node, .. } => node.as_ref(),
            StreamFault::QuorumNotReached { .. } | StreamFault::ChainDiscontinuity { .. } => None,
        }
    }
}

/// Pipeline-level error.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object store request failed.
    #[error("storage error on {key}: {reason}")]
    Storage {
        /// Object key or prefix
        key: String,
        /// Error text
        reason: String,
    },

    /// Object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Loading or saving pipeline state failed.
    #[error("state store error: {0}")]
    StateStore(String),

    /// Downstream sink refused a file.
    #[error("sink error: {0}")]
    Sink(String),

    /// Node registry unavailable.
    #[error("node registry error: {0}")]
    Registry(String),

    /// Stream kind is halted on a chain discontinuity.
    #[error("{kind} stream halted at {filename}")]
    Halted {
        /// Halted kind
        kind: StreamKind,
        /// File that broke the chain
        filename: String,
    },
}

/// Result alias for pipeline operations.
pub type IngestResult<T> = Result<T, IngestError>;
