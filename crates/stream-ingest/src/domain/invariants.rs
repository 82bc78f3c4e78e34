//! # Domain Invariants
//!
//! Constants and rules that must always hold for the pipeline.

use super::entities::{ConsensusNode, StreamFile};
use super::errors::StreamFault;
use super::value_objects::FileHash;

/// Default fraction of total stake that must attest the same hash.
pub const DEFAULT_CONSENSUS_RATIO: f64 = 1.0 / 3.0;

/// Default fraction of total stake whose nodes are downloaded from each pass.
pub const DEFAULT_DOWNLOAD_RATIO: f64 = 0.5;

/// Default in-flight downloads per node task.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 3;

/// Default number of concurrent node tasks.
pub const DEFAULT_MAX_CONCURRENT_NODES: usize = 8;

/// Default listing page size.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 100;

/// Default number of distinct timestamps a node task looks at per pass.
pub const DEFAULT_MAX_FILES_PER_PASS: usize = 100;

/// Default cap on the inflated size of a compressed data file.
pub const DEFAULT_MAX_DECOMPRESSED_LEN: u64 = 64 * 1024 * 1024;

/// Upper bound on an encoded signature.
pub const MAX_SIGNATURE_LEN: usize = 1024;

/// Largest denominator tried when reading a ratio as a small fraction.
const MAX_RATIO_DENOMINATOR: u128 = 1_000_000;

/// Stake needed to reach `ratio` of `total`, rounded up, never below 1.
///
/// Computed in integers. A ratio within two ulps of a fraction `p/q` with
/// `q <= 1_000_000` is read as that fraction, so `1/3` of `90` gives `30`
/// rather than `31`; any other ratio uses the exact value of the `f64`.
pub fn required_stake(total: u64, ratio: f64) -> u64 {
    if ratio.is_nan() || ratio <= 0.0 {
        return 1;
    }
    if ratio >= 1.0 {
        return total.max(1);
    }

    let needed = match small_fraction(ratio) {
        Some((numerator, denominator)) => (total as u128 * numerator).div_ceil(denominator),
        None => ceil_scaled(total, ratio),
    };
    u64::try_from(needed).unwrap_or(u64::MAX).max(1)
}

/// Continued-fraction expansion of the exact value of `ratio` in `(0, 1)`,
/// stopped at the first convergent that matches it.
fn small_fraction(ratio: f64) -> Option<(u128, u128)> {
    let (mantissa, shift) = binary_parts(ratio);
    if shift >= 127 {
        return None;
    }
    let (mut num, mut den) = (mantissa, 1u128 << shift);
    let (mut h0, mut h1) = (0u128, 1u128);
    let (mut k0, mut k1) = (1u128, 0u128);

    while den != 0 {
        let a = num / den;
        if a > MAX_RATIO_DENOMINATOR {
            return None;
        }
        let (h2, k2) = (a * h1 + h0, a * k1 + k0);
        if k2 > MAX_RATIO_DENOMINATOR {
            return None;
        }
        (h0, h1, k0, k1) = (h1, h2, k1, k2);
        if (h1 as f64 / k1 as f64 - ratio).abs() <= 2.0 * f64::EPSILON * ratio {
            return Some((h1, k1));
        }
        (num, den) = (den, num - a * den);
    }
    None
}

/// `ceil(total * ratio)` using the exact binary value of `ratio` in `(0, 1)`.
fn ceil_scaled(total: u64, ratio: f64) -> u128 {
    let (mantissa, shift) = binary_parts(ratio);
    let product = total as u128 * mantissa;
    if product == 0 {
        0
    } else if shift >= 117 {
        // product < 2^117
        1
    } else {
        product.div_ceil(1u128 << shift)
    }
}

/// `ratio == mantissa / 2^shift` for a positive finite `ratio` below 1.
fn binary_parts(ratio: f64) -> (u128, u32) {
    let bits = ratio.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as u32;
    let fraction = (bits & ((1u64 << 52) - 1)) as u128;
    if exponent == 0 {
        (fraction, 1074)
    } else {
        (fraction | (1u128 << 52), 1075 - exponent)
    }
}

/// Effective stake per node: raw stakes, or 1 each when the network
/// reports no stake at all.
pub fn effective_stakes(nodes: &[ConsensusNode]) -> Vec<u64> {
    let total: u64 = nodes.iter().map(|n| n.stake).fold(0, u64::saturating_add);
    if total == 0 {
        vec![1; nodes.len()]
    } else {
        nodes.iter().map(|n| n.stake).collect()
    }
}

/// Invariant: a chained file must reference the last accepted hash.
pub fn invariant_chain_link(file: &StreamFile, previous: &FileHash) -> Result<(), StreamFault> {
    match &file.previous_hash {
        Some(prev) if prev == previous => Ok(()),
        actual => Err(StreamFault::ChainDiscontinuity {
            filename: file.filename.to_string(),
            expected: previous.clone(),
            actual: actual.clone(),
        }),
    }
}

/// Invariant: consensus times never go backwards inside a file.
pub fn invariant_monotonic_times(times: &[i64]) -> bool {
    times.windows(2).all(|w| w[0] <= w[1])
}
