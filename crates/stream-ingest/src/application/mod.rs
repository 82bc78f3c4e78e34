//! # Application Module
//!
//! Pass orchestration: node tasks, downloads, quorum and advancing.

pub mod claims;
pub mod downloader;
pub mod lister;
pub mod node_task;
pub mod report;
pub mod runner;
pub mod service;

pub use claims::ClaimSet;
pub use downloader::{DownloadFailure, DownloadState, PendingDownload, PendingDownloadTracker};
pub use lister::CandidateLister;
pub use node_task::{harvest_node, DataCopy, NodeHarvest, NodeTaskSettings};
pub use report::{FileOutcome, PassReport, Resolution, SkipReason};
pub use runner::PipelineRunner;
pub use service::IngestService;
