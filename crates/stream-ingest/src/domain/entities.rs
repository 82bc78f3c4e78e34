//! # Domain Entities
//!
//! Nodes, attestations, quorum outcomes and accepted stream files.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared_crypto::{NodePublicKey, SignatureAlgorithm};

use super::filename::{StreamFilename, StreamKind};
use super::value_objects::{FileHash, NodeId};

/// A publishing consensus node as reported by the node registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusNode {
    /// Node identifier
    pub id: NodeId,
    /// Stake weight
    pub stake: u64,
    /// Key the node signs its signature files with
    pub public_key: NodePublicKey,
}

impl ConsensusNode {
    /// Create a node.
    pub fn new(id: impl Into<NodeId>, stake: u64, public_key: NodePublicKey) -> Self {
        Self {
            id: id.into(),
            stake,
            public_key,
        }
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId::new(id)
    }
}

/// Raw signature plus its algorithm tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureBlob {
    /// Algorithm tag
    pub algorithm: SignatureAlgorithm,
    /// Signature bytes
    pub bytes: Vec<u8>,
}

/// A hash a node attests to, with the node's signature over it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedHash {
    /// Attested digest
    pub hash: FileHash,
    /// Signature over the digest bytes
    pub signature: SignatureBlob,
}

/// Decoded signature file published by one node for one timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureFile {
    /// Publishing node
    pub node: NodeId,
    /// Signature filename
    pub filename: StreamFilename,
    /// Signature file format version
    pub version: u8,
    /// Attested file hash
    pub file: AttestedHash,
    /// Attested metadata hash (format v5 and newer)
    pub metadata: Option<AttestedHash>,
}

impl SignatureFile {
    /// Grouping key used when folding attestations: both hashes must match.
    pub fn attestation_key(&self) -> (FileHash, Option<FileHash>) {
        (
            self.file.hash.clone(),
            self.metadata.as_ref().map(|m| m.hash.clone()),
        )
    }
}

/// Outcome of folding every node's signature for one filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumResult {
    /// Signature filename the attestations were for
    pub filename: StreamFilename,
    /// Winning file hash, if any group reached the threshold
    pub file_hash: Option<FileHash>,
    /// Winning metadata hash, when the winning group attests one
    pub metadata_hash: Option<FileHash>,
    /// Nodes in the winning group, sorted
    pub nodes: Vec<NodeId>,
    /// Stake of the winning group (or of the best group when no quorum)
    pub stake: u64,
    /// Stake needed to win
    pub required_stake: u64,
    /// Total stake of the network for this pass
    pub total_stake: u64,
}

impl QuorumResult {
    /// True when a hash was agreed.
    pub fn is_reached(&self) -> bool {
        self.file_hash.is_some()
    }

    /// True if `node` attested the winning hash.
    pub fn attested_by(&self, node: &NodeId) -> bool {
        self.nodes.binary_search(node).is_ok()
    }
}

/// One consensus-ordered item inside a stream file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamItem {
    /// Consensus timestamp, nanoseconds since the epoch
    pub consensus_ns: i64,
    /// Opaque payload, interpreted downstream
    pub payload: Bytes,
}

/// Sidecar referenced by a record file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sidecar {
    /// Sidecar index
    pub id: u8,
    /// Expected digest of the sidecar bytes
    pub hash: FileHash,
    /// Verified bytes, once fetched
    pub bytes: Option<Bytes>,
}

/// A stream file that passed content verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFile {
    /// Stream kind
    pub kind: StreamKind,
    /// Data filename of the copy that was verified
    pub filename: StreamFilename,
    /// Node the verified copy came from
    pub source_node: NodeId,
    /// Wire format version
    pub version: u32,
    /// Self-hash
    pub hash: FileHash,
    /// Metadata hash (v5 and newer)
    pub metadata_hash: Option<FileHash>,
    /// Hash of the predecessor (chained kinds only)
    pub previous_hash: Option<FileHash>,
    /// First consensus timestamp
    pub consensus_start: i64,
    /// Last consensus timestamp
    pub consensus_end: i64,
    /// Number of items
    pub count: u64,
    /// Decompressed file bytes
    pub bytes: Bytes,
    /// Parsed items
    pub items: Vec<StreamItem>,
    /// Referenced sidecars
    pub sidecars: Vec<Sidecar>,
}

/// Per-kind resume state.
///
/// `resume_marker` is the last filename fully resolved; `last_hash` is the
/// self-hash of the last accepted file, which the next chained file must
/// reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Stream kind
    pub kind: StreamKind,
    /// Last resolved filename, `None` before the first accept
    pub resume_marker: Option<StreamFilename>,
    /// Self-hash of the last accepted file
    pub last_hash: Option<FileHash>,
}

impl PipelineState {
    /// State before anything was accepted.
    pub fn initial(kind: StreamKind) -> Self {
        Self {
            kind,
            resume_marker: None,
            last_hash: None,
        }
    }

    /// State after accepting `file`. Marker and hash move together.
    pub fn advanced(&self, file: &StreamFile) -> Self {
        Self {
            kind: self.kind,
            resume_marker: Some(file.filename.clone()),
            last_hash: Some(file.hash.clone()),
        }
    }

    /// Timestamp of the marker, `None` at the epoch sentinel.
    pub fn marker_timestamp(&self) -> Option<i64> {
        self.resume_marker.as_ref().map(StreamFilename::timestamp)
    }
}
