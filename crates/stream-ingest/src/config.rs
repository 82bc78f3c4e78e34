//! # Pipeline Configuration
//!
//! Tunables for one ingestion pipeline, loadable from TOML.
//!
//! ```toml
//! download_ratio = 0.5
//! consensus_ratio = 0.3333333333333333
//! max_concurrent_nodes = 8
//!
//! [streams.record]
//! digest = "sha384"
//!
//! [streams.event.chain_bypass]
//! start = "2024-01-01T00:00:00Z"
//! end = "2024-01-02T00:00:00Z"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_crypto::DigestAlgorithm;

use crate::domain::{
    IngestError, IngestResult, StreamKind, DEFAULT_CONSENSUS_RATIO, DEFAULT_DOWNLOAD_RATIO,
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_LIST_PAGE_SIZE, DEFAULT_MAX_CONCURRENT_NODES,
    DEFAULT_MAX_DECOMPRESSED_LEN, DEFAULT_MAX_FILES_PER_PASS,
};

/// Inclusive consensus-time range whose files skip the chain check.
///
/// Used to step over a known, audited break in a node's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBypassWindow {
    /// First bypassed instant
    pub start: DateTime<Utc>,
    /// Last bypassed instant
    pub end: DateTime<Utc>,
}

impl ChainBypassWindow {
    /// True if `timestamp` (nanoseconds since the epoch) falls in the window.
    pub fn contains(&self, timestamp: i64) -> bool {
        let start = self.start.timestamp_nanos_opt().unwrap_or(i64::MIN);
        let end = self.end.timestamp_nanos_opt().unwrap_or(i64::MAX);
        (start..=end).contains(&timestamp)
    }
}

/// Settings for one stream kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamKindConfig {
    /// Whether the service runs passes for this kind.
    pub enabled: bool,
    /// Digest used for self-hashes and signature files.
    pub digest: DigestAlgorithm,
    /// Optional chain-bypass window.
    pub chain_bypass: Option<ChainBypassWindow>,
}

impl Default for StreamKindConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            digest: DigestAlgorithm::Sha384,
            chain_bypass: None,
        }
    }
}

/// Pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fraction of total stake whose nodes are downloaded from.
    pub download_ratio: f64,

    /// Fraction of total stake that must attest the same hash.
    pub consensus_ratio: f64,

    /// Node tasks running at once.
    pub max_concurrent_nodes: usize,

    /// In-flight downloads per node task.
    pub per_node_fetch_concurrency: usize,

    /// Keys requested per listing call.
    pub list_page_size: usize,

    /// Distinct timestamps each node task looks at per pass.
    pub max_files_per_pass: usize,

    /// Fetch and verify sidecars referenced by record files.
    pub sidecars_enabled: bool,

    /// Largest inflated size accepted for a compressed data file, in bytes.
    pub max_decompressed_len: u64,

    /// Per-kind settings.
    pub streams: StreamsConfig,
}

/// Per-kind settings; omitted kinds use defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Balance files
    pub balance: StreamKindConfig,
    /// Event files
    pub event: StreamKindConfig,
    /// Record files
    pub record: StreamKindConfig,
}

impl StreamsConfig {
    /// Settings for `kind`.
    pub fn get(&self, kind: StreamKind) -> &StreamKindConfig {
        match kind {
            StreamKind::Balance => &self.balance,
            StreamKind::Event => &self.event,
            StreamKind::Record => &self.record,
        }
    }

    /// Mutable settings for `kind`.
    pub fn get_mut(&mut self, kind: StreamKind) -> &mut StreamKindConfig {
        match kind {
            StreamKind::Balance => &mut self.balance,
            StreamKind::Event => &mut self.event,
            StreamKind::Record => &mut self.record,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_ratio: DEFAULT_DOWNLOAD_RATIO,
            consensus_ratio: DEFAULT_CONSENSUS_RATIO,
            max_concurrent_nodes: DEFAULT_MAX_CONCURRENT_NODES,
            per_node_fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            max_files_per_pass: DEFAULT_MAX_FILES_PER_PASS,
            sidecars_enabled: true,
            max_decompressed_len: DEFAULT_MAX_DECOMPRESSED_LEN,
            streams: StreamsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a config for testing: every node is downloaded from, small pages.
    pub fn for_testing() -> Self {
        Self {
            download_ratio: 1.0,
            max_concurrent_nodes: 4,
            list_page_size: 2,
            max_files_per_pass: 50,
            ..Self::default()
        }
    }

    /// Parse from TOML; omitted fields take defaults.
    pub fn from_toml_str(input: &str) -> IngestResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| IngestError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for `kind`.
    pub fn stream(&self, kind: StreamKind) -> &StreamKindConfig {
        self.streams.get(kind)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> IngestResult<()> {
        check_ratio("download_ratio", self.download_ratio)?;
        check_ratio("consensus_ratio", self.consensus_ratio)?;
        for (name, value) in [
            ("max_concurrent_nodes", self.max_concurrent_nodes),
            ("per_node_fetch_concurrency", self.per_node_fetch_concurrency),
            ("list_page_size", self.list_page_size),
            ("max_files_per_pass", self.max_files_per_pass),
        ] {
            if value == 0 {
                return Err(IngestError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        if self.max_decompressed_len == 0 {
            return Err(IngestError::InvalidConfig(
                "max_decompressed_len must be > 0".to_string(),
            ));
        }
        for kind in StreamKind::ALL {
            if let Some(window) = &self.stream(kind).chain_bypass {
                if window.start > window.end {
                    return Err(IngestError::InvalidConfig(format!(
                        "{kind} chain_bypass starts after it ends"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_ratio(name: &str, value: f64) -> IngestResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(IngestError::InvalidConfig(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}
