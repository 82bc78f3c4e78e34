//! Claim set: data filenames already transferred this pass.
//!
//! The only state node tasks mutate concurrently. `claim` is an atomic
//! put-if-absent, so exactly one transfer per data filename wins.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{NodeId, StreamFilename};

/// Concurrent set of claimed data filenames, shared by one pass.
#[derive(Clone, Debug, Default)]
pub struct ClaimSet {
    claims: Arc<DashMap<String, NodeId>>,
}

impl ClaimSet {
    /// Empty claim set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `filename` for `node`. Returns `Err(owner)` if another node
    /// got there first.
    pub fn claim(&self, filename: &StreamFilename, node: &NodeId) -> Result<(), NodeId> {
        match self.claims.entry(filename.name().to_string()) {
            Entry::Occupied(owner) => Err(owner.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
                Ok(())
            }
        }
    }

    /// True if `filename` was claimed.
    pub fn is_claimed(&self, filename: &StreamFilename) -> bool {
        self.claims.contains_key(filename.name())
    }

    /// Node that claimed `filename`.
    pub fn claimant(&self, filename: &StreamFilename) -> Option<NodeId> {
        self.claims.get(filename.name()).map(|owner| owner.clone())
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True if nothing was claimed.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
