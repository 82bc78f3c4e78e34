//! # Signature Quorum
//!
//! Fold every node's signature file for one timestamp into a single agreed
//! hash, weighted by stake.
//!
//! ## Algorithm
//!
//! 1. Verify each signature against the node's registered key; drop
//!    failures and unknown nodes.
//! 2. Group attestations by `(file_hash, metadata_hash)`.
//! 3. Sum the stake of each group.
//! 4. The heaviest group wins if it reaches `ceil(total * ratio)`.
//!
//! Equal-stake groups resolve to the lexicographically smallest
//! `(file_hash, metadata_hash)`, so replicas given the same attestations
//! always agree.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use stream_telemetry::SIGNATURE_VERIFICATIONS;
use tracing::{debug, warn};

use crate::domain::{
    effective_stakes, required_stake, ConsensusNode, FileHash, NodeId, QuorumResult,
    SignatureFile, StreamFilename, DEFAULT_CONSENSUS_RATIO,
};

type GroupKey = (FileHash, Option<FileHash>);

/// Stake-weighted signature quorum.
#[derive(Clone, Copy, Debug)]
pub struct SignatureQuorumVerifier {
    threshold_ratio: f64,
}

impl Default for SignatureQuorumVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_CONSENSUS_RATIO)
    }
}

impl SignatureQuorumVerifier {
    /// Create a verifier with the given threshold ratio.
    pub fn new(threshold_ratio: f64) -> Self {
        Self { threshold_ratio }
    }

    /// Configured ratio.
    pub fn threshold_ratio(&self) -> f64 {
        self.threshold_ratio
    }

    /// Decide the agreed hash for `filename`.
    ///
    /// `nodes` is the full registry for this pass; total stake is computed
    /// over all of it, not only over nodes that published a signature.
    pub fn verify(
        &self,
        filename: &StreamFilename,
        signatures: &BTreeMap<NodeId, SignatureFile>,
        nodes: &[ConsensusNode],
    ) -> QuorumResult {
        let stakes = effective_stakes(nodes);
        let total_stake = stakes.iter().copied().fold(0u64, u64::saturating_add);
        let required = required_stake(total_stake, self.threshold_ratio);
        let registry: HashMap<&NodeId, (&ConsensusNode, u64)> = nodes
            .iter()
            .zip(stakes.iter().copied())
            .map(|(node, stake)| (&node.id, (node, stake)))
            .collect();

        let verified: Vec<(NodeId, u64, GroupKey)> = signatures
            .par_iter()
            .filter_map(|(node_id, signature)| {
                let Some((node, stake)) = registry.get(node_id) else {
                    warn!(node = %node_id, file = %filename, "Signature from unknown node");
                    return None;
                };
                if verify_signature_file(node, signature) {
                    Some((node_id.clone(), *stake, signature.attestation_key()))
                } else {
                    warn!(node = %node_id, file = %filename, "Signature verification failed");
                    None
                }
            })
            .collect();

        let mut groups: BTreeMap<GroupKey, (u64, Vec<NodeId>)> = BTreeMap::new();
        for (node_id, stake, key) in verified {
            let entry = groups.entry(key).or_default();
            entry.0 = entry.0.saturating_add(stake);
            entry.1.push(node_id);
        }

        // Ascending key order plus strict comparison keeps the smallest key on ties
        let mut best: Option<(GroupKey, u64, Vec<NodeId>)> = None;
        for (key, (stake, members)) in groups {
            if best.as_ref().map_or(true, |(_, best_stake, _)| stake > *best_stake) {
                best = Some((key, stake, members));
            }
        }

        match best {
            Some(((file_hash, metadata_hash), stake, mut members)) if stake >= required => {
                members.sort();
                debug!(
                    file = %filename,
                    hash = %file_hash,
                    stake,
                    required,
                    nodes = members.len(),
                    "Quorum reached"
                );
                QuorumResult {
                    filename: filename.clone(),
                    file_hash: Some(file_hash),
                    metadata_hash,
                    nodes: members,
                    stake,
                    required_stake: required,
                    total_stake,
                }
            }
            best => QuorumResult {
                filename: filename.clone(),
                file_hash: None,
                metadata_hash: None,
                nodes: Vec::new(),
                stake: best.map_or(0, |(_, stake, _)| stake),
                required_stake: required,
                total_stake,
            },
        }
    }
}

/// Check the file-hash signature and, when present, the metadata signature.
fn verify_signature_file(node: &ConsensusNode, signature: &SignatureFile) -> bool {
    let mut attestations = vec![&signature.file];
    attestations.extend(signature.metadata.as_ref());

    attestations.into_iter().all(|attested| {
        let ok = node
            .public_key
            .verify(
                attested.signature.algorithm,
                attested.hash.as_bytes(),
                &attested.signature.bytes,
            )
            .is_ok();
        SIGNATURE_VERIFICATIONS
            .with_label_values(&[
                attested.signature.algorithm.name(),
                if ok { "valid" } else { "invalid" },
            ])
            .inc();
        ok
    })
}
