//! # Stream Ingest
//!
//! Ingests the record, event and balance stream files consensus nodes
//! publish to shared object storage.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Every node uploads its own copy of each stream file plus a signature
//! file. A file is trusted once signatures over one hash carry enough
//! stake, and is appended only if it links to the previous file's hash.
//!
//! | Defense | Description |
//! |---------|-------------|
//! | Stake quorum | Signatures over one (file, metadata) hash pair reach 1/3 of stake |
//! | Hash verification | Downloaded bytes must hash to the agreed value |
//! | Hash chain | Each file names its predecessor's hash; a break halts the stream |
//! | Node sampling | Random subset covering the download ratio of stake each pass |
//!
//! ## Module Structure
//!
//! ```text
//! stream-ingest/
//! ├── domain/          # Filenames, stream files, state, faults, invariants
//! ├── algorithms/      # Node selection, quorum, framing, hash chain
//! ├── ports/           # StreamIngestApi (inbound) + storage/registry/sink traits
//! ├── adapters/        # In-memory ports, JSON state files, simulated publisher
//! ├── application/     # Node tasks, downloads, PipelineRunner, IngestService
//! └── config.rs        # PipelineConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    CollectingSink, JsonFileStateStore, MemoryObjectStore, MemoryStateStore, PublishedFile,
    SimulatedNode, StaticNodeRegistry, StreamPublisher,
};
pub use algorithms::{
    select_nodes, select_nodes_with_rng, Accepted, FramingError, HashChainValidator,
    SignatureQuorumVerifier,
};
pub use application::{
    CandidateLister, ClaimSet, FileOutcome, IngestService, PassReport, PendingDownload,
    PendingDownloadTracker, PipelineRunner, Resolution, SkipReason,
};
pub use config::{ChainBypassWindow, PipelineConfig, StreamKindConfig, StreamsConfig};
pub use domain::{
    ConsensusNode, FileHash, FileKind, IngestError, IngestResult, NodeId, PipelineState,
    QuorumResult, SignatureFile, StreamFault, StreamFile, StreamFilename, StreamKind,
};
pub use ports::{NodeRegistry, ObjectStore, StateStore, StreamFileSink, StreamIngestApi};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
