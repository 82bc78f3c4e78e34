//! Pending downloads.
//!
//! `fetch` spawns the transfer on the runtime and returns a handle at once;
//! the spawned task reports back through a oneshot channel. Waiting on one
//! handle never blocks other tasks.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::debug;

use super::claims::ClaimSet;
use crate::domain::{NodeId, StreamFault, StreamFilename, StreamKind};
use crate::ports::outbound::ObjectStore;

/// Why a download did not produce usable bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadFailure {
    /// The storage transfer failed.
    Transport(String),
    /// Another node task already transferred this data file.
    AlreadyClaimed(NodeId),
}

/// Download state. Leaves `Pending` exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadState {
    /// Transfer in flight
    Pending,
    /// Bytes available
    Succeeded(Bytes),
    /// Transfer failed or lost the claim race
    Failed(DownloadFailure),
}

/// Handle for one (node, filename) transfer.
pub struct PendingDownload {
    node: NodeId,
    filename: StreamFilename,
    state: DownloadState,
    receiver: Option<oneshot::Receiver<DownloadState>>,
}

impl PendingDownload {
    /// Node the file is fetched from.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// File being fetched.
    pub fn filename(&self) -> &StreamFilename {
        &self.filename
    }

    /// Current state.
    pub fn state(&self) -> &DownloadState {
        &self.state
    }

    /// Wait for the transfer to finish. True if bytes are available.
    pub async fn wait_for_completion(&mut self) -> bool {
        if let Some(receiver) = self.receiver.take() {
            self.state = receiver.await.unwrap_or_else(|_| {
                DownloadState::Failed(DownloadFailure::Transport(
                    "download task dropped".to_string(),
                ))
            });
        }
        matches!(self.state, DownloadState::Succeeded(_))
    }

    /// Bytes, once succeeded.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.state {
            DownloadState::Succeeded(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consume the handle, returning the bytes if succeeded.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self.state {
            DownloadState::Succeeded(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Fault to report for a transport failure, if this download had one.
    pub fn fault(&self) -> Option<StreamFault> {
        match &self.state {
            DownloadState::Failed(DownloadFailure::Transport(reason)) => {
                Some(StreamFault::TransientIo {
                    node: self.node.clone(),
                    filename: self.filename.to_string(),
                    reason: reason.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Spawns transfers and claims data files on success.
#[derive(Clone)]
pub struct PendingDownloadTracker {
    store: Arc<dyn ObjectStore>,
    kind: StreamKind,
    claims: ClaimSet,
}

impl PendingDownloadTracker {
    /// Tracker sharing the pass's claim set.
    pub fn new(store: Arc<dyn ObjectStore>, kind: StreamKind, claims: ClaimSet) -> Self {
        Self {
            store,
            kind,
            claims,
        }
    }

    /// Claim set shared with listers.
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// Start fetching `filename` from `node`. Data files are claimed on a
    /// successful transfer; losing the claim race fails the download.
    pub fn fetch(&self, node: &NodeId, filename: &StreamFilename) -> PendingDownload {
        let claims = filename.is_data().then(|| self.claims.clone());
        self.spawn(node, filename, claims)
    }

    /// Start fetching without touching the claim set. Used to re-fetch a
    /// data file from another attesting node after a bad copy.
    pub fn fetch_unclaimed(&self, node: &NodeId, filename: &StreamFilename) -> PendingDownload {
        self.spawn(node, filename, None)
    }

    fn spawn(
        &self,
        node: &NodeId,
        filename: &StreamFilename,
        claims: Option<ClaimSet>,
    ) -> PendingDownload {
        let (sender, receiver) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let key = self.kind.object_key(node, filename);
        let task_node = node.clone();
        let task_filename = filename.clone();

        tokio::spawn(async move {
            let state = match store.get_bytes(&key).await {
                Ok(bytes) => match claims {
                    Some(claims) => match claims.claim(&task_filename, &task_node) {
                        Ok(()) => DownloadState::Succeeded(bytes),
                        Err(owner) => {
                            debug!(node = %task_node, file = %task_filename, %owner, "Lost claim");
                            DownloadState::Failed(DownloadFailure::AlreadyClaimed(owner))
                        }
                    },
                    None => DownloadState::Succeeded(bytes),
                },
                Err(e) => {
                    debug!(node = %task_node, key = %key, error = %e, "Download failed");
                    DownloadState::Failed(DownloadFailure::Transport(e.to_string()))
                }
            };
            // Receiver gone means the pass no longer cares
            let _ = sender.send(state);
        });

        PendingDownload {
            node: node.clone(),
            filename: filename.clone(),
            state: DownloadState::Pending,
            receiver: Some(receiver),
        }
    }
}
