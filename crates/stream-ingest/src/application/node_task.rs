//! Node task: list one node's folder and download what it published.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use shared_crypto::DigestAlgorithm;
use tracing::{debug, warn};

use super::downloader::{DownloadFailure, DownloadState, PendingDownload, PendingDownloadTracker};
use super::lister::CandidateLister;
use crate::algorithms::decode_signature_file;
use crate::domain::{NodeId, SignatureFile, StreamFault, StreamFilename, StreamKind};
use crate::ports::outbound::ObjectStore;

/// Settings shared by every node task of a pass.
#[derive(Clone, Debug)]
pub struct NodeTaskSettings {
    /// Stream kind
    pub kind: StreamKind,
    /// Digest width for decoding signature files
    pub digest: DigestAlgorithm,
    /// List strictly after this filename
    pub resume_marker: Option<StreamFilename>,
    /// Listing page size
    pub page_size: usize,
    /// In-flight downloads per node
    pub fetch_concurrency: usize,
    /// Distinct timestamps to look at
    pub max_files: usize,
}

/// A verified-later copy of a data file from one node.
#[derive(Clone, Debug)]
pub struct DataCopy {
    /// Node it came from
    pub node: NodeId,
    /// Data filename (plain or compressed)
    pub filename: StreamFilename,
    /// Raw bytes as stored
    pub bytes: Bytes,
}

/// Everything one node task collected.
#[derive(Debug)]
pub struct NodeHarvest {
    /// Node
    pub node: NodeId,
    /// Decoded signature files by timestamp
    pub signatures: BTreeMap<i64, SignatureFile>,
    /// Data files this node won the claim for
    pub data: Vec<DataCopy>,
    /// Per-node faults
    pub faults: Vec<StreamFault>,
}

impl NodeHarvest {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            signatures: BTreeMap::new(),
            data: Vec::new(),
            faults: Vec::new(),
        }
    }

    async fn absorb(&mut self, mut download: PendingDownload, digest: DigestAlgorithm) {
        if !download.wait_for_completion().await {
            match download.state() {
                DownloadState::Failed(DownloadFailure::AlreadyClaimed(owner)) => {
                    debug!(node = %self.node, file = %download.filename(), %owner, "Copy already claimed");
                }
                _ => self.faults.extend(download.fault()),
            }
            return;
        }

        let filename = download.filename().clone();
        let Some(bytes) = download.into_bytes() else {
            return;
        };
        if filename.is_data() {
            self.data.push(DataCopy {
                node: self.node.clone(),
                filename,
                bytes,
            });
            return;
        }

        match decode_signature_file(&self.node, &filename, digest, &bytes) {
            Ok(signature) => {
                self.signatures.insert(filename.timestamp(), signature);
            }
            Err(e) => {
                warn!(node = %self.node, file = %filename, error = %e, "Malformed signature file");
                self.faults.push(StreamFault::MalformedFile {
                    node: self.node.clone(),
                    filename: filename.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// List and download one node's files.
///
/// At most `fetch_concurrency` downloads are in flight; the oldest is
/// awaited before another starts. A listing failure ends the listing but
/// keeps whatever was already downloaded.
pub async fn harvest_node(
    store: Arc<dyn ObjectStore>,
    tracker: PendingDownloadTracker,
    node: NodeId,
    settings: Arc<NodeTaskSettings>,
) -> NodeHarvest {
    let mut harvest = NodeHarvest::new(node.clone());
    let mut lister = CandidateLister::new(
        store,
        settings.kind,
        node.clone(),
        settings.resume_marker.as_ref(),
        tracker.claims().clone(),
        settings.page_size,
    );
    let mut in_flight: VecDeque<PendingDownload> = VecDeque::new();
    let mut last_timestamp = None;
    let mut timestamps = 0usize;

    loop {
        let filename = match lister.next().await {
            Ok(Some(filename)) => filename,
            Ok(None) => break,
            Err(e) => {
                warn!(node = %node, error = %e, "Listing failed");
                harvest.faults.push(StreamFault::NodeTaskFailed {
                    node: Some(node.clone()),
                    reason: e.to_string(),
                });
                break;
            }
        };

        if last_timestamp != Some(filename.timestamp()) {
            if timestamps == settings.max_files {
                break;
            }
            timestamps += 1;
            last_timestamp = Some(filename.timestamp());
        }

        if in_flight.len() >= settings.fetch_concurrency {
            if let Some(oldest) = in_flight.pop_front() {
                harvest.absorb(oldest, settings.digest).await;
            }
        }
        in_flight.push_back(tracker.fetch(&node, &filename));
    }

    while let Some(download) = in_flight.pop_front() {
        harvest.absorb(download, settings.digest).await;
    }

    debug!(
        node = %node,
        signatures = harvest.signatures.len(),
        data = harvest.data.len(),
        faults = harvest.faults.len(),
        "Node task finished"
    );
    harvest
}
