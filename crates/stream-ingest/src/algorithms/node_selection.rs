//! # Node Subset Selection
//!
//! Pick a random subset of consensus nodes whose combined stake covers a
//! ratio of total stake. Downloading from a stake-covering subset rather
//! than every node bounds bandwidth while still seeing every honest quorum.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{effective_stakes, required_stake, ConsensusNode};

/// Select nodes covering `ratio` of total stake, using the thread RNG.
pub fn select_nodes(nodes: &[ConsensusNode], ratio: f64) -> Vec<ConsensusNode> {
    select_nodes_with_rng(nodes, ratio, &mut rand::thread_rng())
}

/// Select nodes covering `ratio` of total stake.
///
/// With at most one node, or `ratio >= 1`, the input is returned unchanged.
/// Otherwise the nodes are shuffled and the shortest prefix whose stake
/// reaches `ceil(total * ratio)` is returned. Zero total stake falls back to
/// equal weights.
pub fn select_nodes_with_rng<R: Rng + ?Sized>(
    nodes: &[ConsensusNode],
    ratio: f64,
    rng: &mut R,
) -> Vec<ConsensusNode> {
    if nodes.len() <= 1 || ratio >= 1.0 {
        return nodes.to_vec();
    }

    let stakes = effective_stakes(nodes);
    let total = stakes.iter().copied().fold(0u64, u64::saturating_add);
    let needed = required_stake(total, ratio);

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.shuffle(rng);

    let mut selected = Vec::new();
    let mut accumulated = 0u64;
    for index in order {
        selected.push(nodes[index].clone());
        accumulated = accumulated.saturating_add(stakes[index]);
        if accumulated >= needed {
            break;
        }
    }

    tracing::debug!(
        total_nodes = nodes.len(),
        selected = selected.len(),
        total_stake = total,
        selected_stake = accumulated,
        needed,
        "Selected download nodes"
    );
    selected
}
