//! # Hash Chain Validation
//!
//! Checks a downloaded copy against the agreed hash and links it to the
//! last accepted file of the same kind.

use bytes::Bytes;
use shared_crypto::DigestAlgorithm;
use tracing::warn;

use super::framing::{self, FramingError};
use crate::config::ChainBypassWindow;
use crate::domain::{
    invariant_chain_link, FileHash, NodeId, QuorumResult, StreamFault, StreamFile,
    StreamFilename, StreamKind, DEFAULT_MAX_DECOMPRESSED_LEN,
};

/// How a file joined the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepted {
    /// Previous hash matched the last accepted file.
    Linked,
    /// Kind is not chained.
    Unchained,
    /// No earlier file is known; this starts the chain.
    Genesis,
    /// Link was broken but the file is inside the configured bypass window.
    Bypassed,
}

/// Per-kind content and chain validator.
#[derive(Clone, Debug)]
pub struct HashChainValidator {
    kind: StreamKind,
    digest: DigestAlgorithm,
    bypass: Option<ChainBypassWindow>,
    max_decompressed_len: u64,
}

impl HashChainValidator {
    /// Validator without a bypass window.
    pub fn new(kind: StreamKind, digest: DigestAlgorithm) -> Self {
        Self {
            kind,
            digest,
            bypass: None,
            max_decompressed_len: DEFAULT_MAX_DECOMPRESSED_LEN,
        }
    }

    /// Reject compressed copies inflating past `limit` bytes.
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.max_decompressed_len = limit;
        self
    }

    /// Skip chain checks for files inside `window`.
    pub fn with_bypass(mut self, window: Option<ChainBypassWindow>) -> Self {
        self.bypass = window;
        self
    }

    /// Stream kind.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Digest algorithm.
    pub fn digest(&self) -> DigestAlgorithm {
        self.digest
    }

    /// Self-hash of decompressed file bytes; version is read from the bytes.
    pub fn compute_self_hash(&self, bytes: &[u8]) -> Result<FileHash, FramingError> {
        framing::compute_self_hash(self.kind, self.digest, bytes)
    }

    /// Decode one node's copy and check it against the quorum.
    pub fn verify_content(
        &self,
        node: &NodeId,
        filename: &StreamFilename,
        raw: Bytes,
        quorum: &QuorumResult,
    ) -> Result<StreamFile, StreamFault> {
        let malformed = |e: FramingError| StreamFault::MalformedFile {
            node: node.clone(),
            filename: filename.to_string(),
            reason: e.to_string(),
        };
        let expected = quorum
            .file_hash
            .as_ref()
            .ok_or_else(|| StreamFault::QuorumNotReached {
                filename: quorum.filename.to_string(),
                best_stake: quorum.stake,
                required_stake: quorum.required_stake,
            })?;

        let bytes = framing::decompress(filename, raw, self.max_decompressed_len).map_err(malformed)?;
        let contents =
            framing::decode_data_file(self.kind, self.digest, &bytes).map_err(malformed)?;

        if &contents.hash != expected {
            return Err(StreamFault::HashMismatch {
                node: node.clone(),
                filename: filename.to_string(),
                expected: expected.clone(),
                actual: contents.hash,
            });
        }
        if let Some(expected_meta) = &quorum.metadata_hash {
            if contents.metadata_hash.as_ref() != Some(expected_meta) {
                return Err(StreamFault::HashMismatch {
                    node: node.clone(),
                    filename: filename.to_string(),
                    expected: expected_meta.clone(),
                    actual: contents
                        .metadata_hash
                        .clone()
                        .unwrap_or_else(|| FileHash::zero(self.digest.output_len())),
                });
            }
        }

        Ok(StreamFile {
            kind: self.kind,
            filename: filename.clone(),
            source_node: node.clone(),
            version: contents.version,
            consensus_start: contents.consensus_start(),
            consensus_end: contents.consensus_end(),
            count: contents.items.len() as u64,
            hash: contents.hash,
            metadata_hash: contents.metadata_hash,
            previous_hash: contents.previous_hash,
            bytes,
            items: contents.items,
            sidecars: contents.sidecars,
        })
    }

    /// Decide whether `file` may be appended after `previous`.
    ///
    /// The caller advances pipeline state (marker and hash together) only on
    /// `Ok`.
    pub fn accept(
        &self,
        file: &StreamFile,
        quorum: &QuorumResult,
        previous: Option<&FileHash>,
    ) -> Result<Accepted, StreamFault> {
        if quorum.file_hash.as_ref() != Some(&file.hash) {
            return Err(StreamFault::HashMismatch {
                node: file.source_node.clone(),
                filename: file.filename.to_string(),
                expected: quorum
                    .file_hash
                    .clone()
                    .unwrap_or_else(|| FileHash::zero(self.digest.output_len())),
                actual: file.hash.clone(),
            });
        }
        if !self.kind.is_chained() {
            return Ok(Accepted::Unchained);
        }
        let Some(previous) = previous else {
            return Ok(Accepted::Genesis);
        };

        match invariant_chain_link(file, previous) {
            Ok(()) => Ok(Accepted::Linked),
            Err(fault) if self.in_bypass_window(&file.filename) => {
                warn!(
                    kind = %self.kind,
                    file = %file.filename,
                    %fault,
                    "Chain check bypassed by configuration"
                );
                Ok(Accepted::Bypassed)
            }
            Err(fault) => Err(fault),
        }
    }

    fn in_bypass_window(&self, filename: &StreamFilename) -> bool {
        self.bypass
            .as_ref()
            .map_or(false, |window| window.contains(filename.timestamp()))
    }
}
