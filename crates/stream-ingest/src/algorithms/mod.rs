//! # Algorithms Module
//!
//! Pure verification logic: node sampling, signature quorum, file framing
//! and hash-chain checks.

pub mod framing;
pub mod hash_chain;
pub mod node_selection;
pub mod quorum;

pub use framing::{
    compute_self_hash, decode_data_file, decode_signature_file, decompress, encode_data_file,
    encode_signature_file, DataFileContents, DataFileParts, FramingError,
};
pub use hash_chain::{Accepted, HashChainValidator};
pub use node_selection::{select_nodes, select_nodes_with_rng};
pub use quorum::SignatureQuorumVerifier;
