//! Simulated consensus-node publisher.
//!
//! Writes signed data, signature and sidecar files into a
//! [`MemoryObjectStore`] using the same layouts real nodes publish, so the
//! pipeline can be exercised end to end without a network.

use std::sync::Arc;

use bytes::Bytes;
use shared_crypto::{CryptoError, DigestAlgorithm, NodeKeyPair};

use super::memory::MemoryObjectStore;
use crate::algorithms::framing::{encode_data_file, encode_signature_file, DataFileParts};
use crate::algorithms::{decode_data_file, FramingError};
use crate::domain::{
    AttestedHash, ConsensusNode, FileHash, IngestError, IngestResult, NodeId, Sidecar,
    SignatureBlob, StreamFilename, StreamItem, StreamKind,
};

/// A node identity that can sign what it publishes.
pub struct SimulatedNode {
    /// Node id
    pub id: NodeId,
    /// Stake
    pub stake: u64,
    keys: NodeKeyPair,
}

impl SimulatedNode {
    /// Ed25519 node with a deterministic key.
    pub fn ed25519(id: impl Into<NodeId>, stake: u64, seed: u8) -> Self {
        Self {
            id: id.into(),
            stake,
            keys: NodeKeyPair::ed25519_from_seed([seed; 32]),
        }
    }

    /// ECDSA secp256k1 node with a deterministic key. `seed` must be non-zero.
    pub fn secp256k1(id: impl Into<NodeId>, stake: u64, seed: u8) -> Result<Self, CryptoError> {
        Ok(Self {
            id: id.into(),
            stake,
            keys: NodeKeyPair::secp256k1_from_bytes([seed; 32])?,
        })
    }

    /// Registry entry for this node.
    pub fn consensus_node(&self) -> ConsensusNode {
        ConsensusNode::new(self.id.clone(), self.stake, self.keys.public_key())
    }

    /// Sign a hash.
    pub fn attest(&self, hash: &FileHash) -> AttestedHash {
        AttestedHash {
            hash: hash.clone(),
            signature: SignatureBlob {
                algorithm: self.keys.algorithm(),
                bytes: self.keys.sign(hash.as_bytes()),
            },
        }
    }
}

/// A data file ready to be published by any number of nodes.
#[derive(Clone, Debug)]
pub struct PublishedFile {
    /// Data filename
    pub filename: StreamFilename,
    /// Uncompressed bytes
    pub bytes: Bytes,
    /// Self-hash
    pub hash: FileHash,
    /// Metadata hash (v5 and newer)
    pub metadata_hash: Option<FileHash>,
    /// Previous hash written into the file
    pub previous_hash: Option<FileHash>,
    /// Sidecar files with their bytes
    pub sidecars: Vec<(StreamFilename, Bytes)>,
}

/// Builds a hash-chained sequence of files for one stream kind.
pub struct StreamPublisher {
    store: Arc<MemoryObjectStore>,
    kind: StreamKind,
    digest: DigestAlgorithm,
    version: u32,
    compressed: bool,
    head: Option<FileHash>,
}

impl StreamPublisher {
    /// Publisher writing the newest format for `kind`, uncompressed.
    pub fn new(store: Arc<MemoryObjectStore>, kind: StreamKind) -> Self {
        let version = match kind {
            StreamKind::Balance => 1,
            StreamKind::Event => 5,
            StreamKind::Record => 6,
        };
        Self {
            store,
            kind,
            digest: DigestAlgorithm::Sha384,
            version,
            compressed: false,
            head: None,
        }
    }

    /// Use another digest algorithm.
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Write another format version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Publish `.zst` data files.
    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Hash the next file will reference.
    pub fn head(&self) -> Option<&FileHash> {
        self.head.as_ref()
    }

    /// Override the chain head (to simulate a break).
    pub fn set_head(&mut self, head: Option<FileHash>) {
        self.head = head;
    }

    /// Build the next file in the chain and advance the head.
    pub fn build(
        &mut self,
        timestamp: i64,
        payloads: &[&[u8]],
    ) -> Result<PublishedFile, FramingError> {
        self.build_with_sidecars(timestamp, payloads, &[])
    }

    /// Build the next file, referencing one sidecar per entry of `sidecars`.
    pub fn build_with_sidecars(
        &mut self,
        timestamp: i64,
        payloads: &[&[u8]],
        sidecars: &[Bytes],
    ) -> Result<PublishedFile, FramingError> {
        let items: Vec<StreamItem> = payloads
            .iter()
            .enumerate()
            .map(|(i, payload)| StreamItem {
                consensus_ns: timestamp + i as i64,
                payload: Bytes::copy_from_slice(payload),
            })
            .collect();
        let sidecar_files: Vec<(StreamFilename, Bytes)> = sidecars
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                (
                    StreamFilename::sidecar(self.kind, timestamp, i as u8 + 1),
                    bytes.clone(),
                )
            })
            .collect();
        let sidecar_refs: Vec<Sidecar> = sidecar_files
            .iter()
            .enumerate()
            .map(|(i, (_, bytes))| Sidecar {
                id: i as u8 + 1,
                hash: FileHash::new(self.digest.digest(bytes)),
                bytes: None,
            })
            .collect();

        let bytes = encode_data_file(&DataFileParts {
            kind: self.kind,
            version: self.version,
            digest: self.digest,
            timestamp,
            previous_hash: self.head.as_ref(),
            items: &items,
            sidecars: &sidecar_refs,
        });
        let contents = decode_data_file(self.kind, self.digest, &bytes)?;
        if self.kind.is_chained() {
            self.head = Some(contents.hash.clone());
        }

        Ok(PublishedFile {
            filename: StreamFilename::data(self.kind, timestamp, self.compressed),
            bytes,
            hash: contents.hash,
            metadata_hash: contents.metadata_hash,
            previous_hash: contents.previous_hash,
            sidecars: sidecar_files,
        })
    }

    /// Publish data, signature and sidecars of `file` from every node.
    pub fn publish(&self, file: &PublishedFile, nodes: &[&SimulatedNode]) -> IngestResult<()> {
        for node in nodes {
            self.publish_data(file, &node.id)?;
            self.publish_signature(file, node);
            self.publish_sidecars(file, &node.id);
        }
        Ok(())
    }

    /// Publish only the data file from `node`.
    pub fn publish_data(&self, file: &PublishedFile, node: &NodeId) -> IngestResult<()> {
        let key = self.kind.object_key(node, &file.filename);
        let bytes = if file.filename.is_compressed() {
            zstd::encode_all(file.bytes.as_ref(), 3)
                .map(Bytes::from)
                .map_err(|e| IngestError::Storage {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
        } else {
            file.bytes.clone()
        };
        self.store.put(key, bytes);
        Ok(())
    }

    /// Publish `node`'s signature over the file's hashes.
    pub fn publish_signature(&self, file: &PublishedFile, node: &SimulatedNode) {
        self.publish_signature_for(
            node,
            file.filename.timestamp(),
            &file.hash,
            file.metadata_hash.as_ref(),
        );
    }

    /// Publish `node`'s signature over arbitrary hashes.
    pub fn publish_signature_for(
        &self,
        node: &SimulatedNode,
        timestamp: i64,
        hash: &FileHash,
        metadata_hash: Option<&FileHash>,
    ) {
        let name = StreamFilename::signature(self.kind, timestamp);
        let metadata = metadata_hash.map(|h| node.attest(h));
        let bytes = encode_signature_file(&node.attest(hash), metadata.as_ref());
        self.store.put(self.kind.object_key(&node.id, &name), bytes);
    }

    /// Publish the file's sidecars from `node`.
    pub fn publish_sidecars(&self, file: &PublishedFile, node: &NodeId) {
        for (name, bytes) in &file.sidecars {
            self.store.put(self.kind.object_key(node, name), bytes.clone());
        }
    }

    /// Publish arbitrary bytes under `filename` for `node`.
    pub fn publish_raw(&self, node: &NodeId, filename: &StreamFilename, bytes: Bytes) {
        self.store.put(self.kind.object_key(node, filename), bytes);
    }
}
