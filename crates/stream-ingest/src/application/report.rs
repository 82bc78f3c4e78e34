//! Per-pass outcome report.

use std::fmt;

use uuid::Uuid;

use crate::domain::{FileHash, StreamFault, StreamFilename, StreamKind};

/// Why a filename was deferred to a later pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No attestation group reached the stake threshold.
    QuorumNotReached,
    /// Every copy from the winning group failed verification.
    NoValidCopy,
    /// A referenced sidecar could not be verified from any node.
    SidecarUnavailable,
    /// An earlier filename is unresolved; advancing would break ordering.
    AwaitingPredecessor,
}

impl SkipReason {
    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::QuorumNotReached => "quorum_not_reached",
            SkipReason::NoValidCopy => "no_valid_copy",
            SkipReason::SidecarUnavailable => "sidecar_unavailable",
            SkipReason::AwaitingPredecessor => "awaiting_predecessor",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to one filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Appended to the chain and handed to the sink.
    Accepted {
        /// Self-hash of the accepted file
        hash: FileHash,
    },
    /// Deferred; retried next pass.
    Skipped(SkipReason),
    /// Stopped on a fault that needs attention.
    Faulted(StreamFault),
}

/// Outcome for one logical filename (one timestamp).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileOutcome {
    /// Signature filename identifying the timestamp
    pub filename: StreamFilename,
    /// Resolution
    pub resolution: Resolution,
}

/// Summary of one pass.
#[derive(Clone, Debug)]
pub struct PassReport {
    /// Correlation id for log lines of this pass
    pub pass_id: Uuid,
    /// Stream kind
    pub kind: StreamKind,
    /// Nodes in the registry
    pub nodes_total: usize,
    /// Nodes downloaded from
    pub nodes_selected: usize,
    /// Outcome per filename, in filename order
    pub outcomes: Vec<FileOutcome>,
    /// Every fault observed, including per-node ones that did not decide
    /// an outcome
    pub faults: Vec<StreamFault>,
    /// True if the pass stopped on a chain discontinuity
    pub halted: bool,
    /// Resume marker after the pass
    pub resume_marker: Option<StreamFilename>,
}

impl PassReport {
    /// Empty report.
    pub fn new(kind: StreamKind) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            kind,
            nodes_total: 0,
            nodes_selected: 0,
            outcomes: Vec::new(),
            faults: Vec::new(),
            halted: false,
            resume_marker: None,
        }
    }

    /// Files accepted this pass.
    pub fn accepted(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Accepted { .. }))
    }

    /// Files deferred this pass.
    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Skipped(_)))
    }

    /// Files that stopped on a fault.
    pub fn faulted(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Faulted(_)))
    }

    /// Hashes of accepted files, in order.
    pub fn accepted_hashes(&self) -> Vec<&FileHash> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.resolution {
                Resolution::Accepted { hash } => Some(hash),
                _ => None,
            })
            .collect()
    }

    /// Faults with the given metric label.
    pub fn faults_labelled(&self, label: &str) -> usize {
        self.faults.iter().filter(|f| f.label() == label).count()
    }

    fn count(&self, predicate: impl Fn(&Resolution) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|o| predicate(&o.resolution))
            .count()
    }
}
