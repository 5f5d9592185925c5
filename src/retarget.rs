//! Difficulty retargeting engine
//!
//! Computes the packed difficulty the next block must satisfy and validates
//! candidate hashes against their declared target. Every operation is a pure
//! function of the supplied chain snapshot, header fields, and parameters:
//! no shared state, no I/O, safe to call concurrently against the same
//! immutable snapshot.
//!
//! Numeric semantics are consensus-critical. The damping divisor, the
//! asymmetric clamp percentages, and the multiply-before-divide order must
//! not change; any deviation changes consensus-relevant output.

use crate::chain::ChainAncestry;
use crate::compact;
use crate::params::Params;
use crate::types::{BlockHash, BlockHeader, CompactBits};
use crate::{Error, Result};
use tracing::debug;

/// Only a quarter of the deviation from the ideal timespan is applied per
/// retarget.
const DAMPING_DIVISOR: i64 = 4;

/// Maximum difficulty increase per cycle, expressed inversely on the
/// measured timespan (shorter timespan = higher difficulty)
const MAX_ADJUST_UP_PCT: i64 = 8;

/// Maximum difficulty decrease per cycle
const MAX_ADJUST_DOWN_PCT: i64 = 16;

/// Packed difficulty the next block built on `tip` must satisfy.
///
/// `tip == None` means the genesis block's own target is being computed.
pub fn required_work<C: ChainAncestry>(
    chain: &C,
    tip: Option<C::Node>,
    header: &BlockHeader,
    params: &Params,
) -> Result<CompactBits> {
    let pow_limit_bits = compact::encode(params.pow_limit);

    let Some(tip) = tip else {
        return Ok(pow_limit_bits);
    };

    if params.allow_min_difficulty_blocks {
        // Escape valve: when block production has stalled for more than two
        // spacing intervals, permit a minimum-difficulty block so the
        // network cannot strand itself at unreachable difficulty.
        if header.time > chain.time(tip) + 2 * params.pow_target_spacing {
            debug!(tip_time = chain.time(tip), header_time = header.time,
                   "production stalled, allowing minimum-difficulty block");
            return Ok(pow_limit_bits);
        }

        // Otherwise return the last non-minimum-difficulty bits. Walking
        // past min-difficulty blocks at off-interval heights keeps a run of
        // easy blocks from becoming the next retarget's baseline.
        let interval = params.retarget_interval();
        let mut node = tip;
        while let Some(prev) = chain.prev(node) {
            if chain.height(node) % interval == 0 || chain.bits(node) != pow_limit_bits {
                break;
            }
            node = prev;
        }
        return Ok(chain.bits(node));
    }

    calculate_next_work(chain, tip, params)
}

/// Retarget computation for the block following `tip`.
pub fn calculate_next_work<C: ChainAncestry>(
    chain: &C,
    tip: C::Node,
    params: &Params,
) -> Result<CompactBits> {
    if params.no_pow_retargeting {
        return Ok(chain.bits(tip));
    }

    let interval = params.retarget_interval();
    let height = chain.height(tip);
    if height + 1 < interval {
        // Not enough history for a full window yet
        return Ok(compact::encode(params.pow_limit));
    }

    let first_height = height - (interval - 1);
    let first = chain.ancestor(tip, first_height).ok_or_else(|| {
        Error::chain(format!(
            "missing ancestor at height {} below tip at height {}",
            first_height, height
        ))
    })?;

    // Seconds elapsed across the window, measured between median-smoothed
    // timestamps so no single miner can warp the baseline
    let timespan = params.pow_target_timespan;
    let mut actual_timespan = chain.median_time_past(tip) - chain.median_time_past(first);
    debug!(height, actual_timespan, "measured retarget window");

    actual_timespan = timespan + (actual_timespan - timespan) / DAMPING_DIVISOR;

    let min_timespan = timespan * (100 - MAX_ADJUST_UP_PCT) / 100;
    let max_timespan = timespan * (100 + MAX_ADJUST_DOWN_PCT) / 100;
    actual_timespan = actual_timespan.clamp(min_timespan, max_timespan);

    // Multiply before divide, through the wide intermediate
    let mut next = compact::decode(chain.bits(tip))
        .target
        .mul_div(actual_timespan as u64, timespan as u64);
    if next > params.pow_limit {
        next = params.pow_limit;
    }

    let bits = compact::encode(next);
    debug!(
        actual_timespan,
        timespan,
        before = %chain.bits(tip),
        after = %bits,
        "retarget computed"
    );
    Ok(bits)
}

/// Check that `hash` satisfies the target declared by `bits`.
///
/// Pure predicate, never memoized: callers validating untrusted blocks must
/// re-check independently.
pub fn check_proof_of_work(hash: &BlockHash, bits: CompactBits, params: &Params) -> Result<()> {
    let decoded = compact::decode(bits);

    if decoded.negative {
        return Err(Error::malformed_target(bits, "negative target"));
    }
    if decoded.overflow {
        return Err(Error::malformed_target(bits, "target overflows 256 bits"));
    }
    if decoded.target.is_zero() {
        return Err(Error::malformed_target(bits, "zero target"));
    }
    if decoded.target > params.pow_limit {
        return Err(Error::malformed_target(
            bits,
            "target above the proof-of-work limit",
        ));
    }

    if !hash.meets_target(&decoded.target) {
        return Err(Error::insufficient_work(*hash, decoded.target));
    }

    Ok(())
}

/// Boolean convenience over [`check_proof_of_work`]
pub fn is_valid_proof_of_work(hash: &BlockHash, bits: CompactBits, params: &Params) -> bool {
    check_proof_of_work(hash, bits, params).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainIndex, NodeId};
    use crate::params::Network;
    use crate::types::Target;
    use assert_matches::assert_matches;
    use primitive_types::U256;

    const MIN_BITS: CompactBits = CompactBits::new(0x1d00ffff);
    const REAL_BITS: CompactBits = CompactBits::new(0x1c0fffff);

    fn header(time: i64) -> BlockHeader {
        BlockHeader {
            bits: MIN_BITS,
            time,
            hash: BlockHash::from_u256(U256::zero()),
        }
    }

    /// Linear chain with uniform spacing and uniform bits
    fn uniform_chain(len: u64, spacing: i64, bits: CompactBits) -> (ChainIndex, NodeId) {
        let mut chain = ChainIndex::new();
        let mut prev = None;
        for i in 0..len {
            prev = Some(chain.push(prev, bits, i as i64 * spacing).unwrap());
        }
        (chain, prev.unwrap())
    }

    /// Linear chain with per-height bits at uniform spacing
    fn chain_with_bits(bits: &[CompactBits], spacing: i64) -> (ChainIndex, NodeId) {
        let mut chain = ChainIndex::new();
        let mut prev = None;
        for (i, &b) in bits.iter().enumerate() {
            prev = Some(chain.push(prev, b, i as i64 * spacing).unwrap());
        }
        (chain, prev.unwrap())
    }

    #[test]
    fn test_genesis_gets_pow_limit() {
        let params = Params::main();
        let chain = ChainIndex::new();
        let bits = required_work(&chain, None, &header(0), &params).unwrap();
        assert_eq!(bits, MIN_BITS);
    }

    #[test]
    fn test_no_retargeting_is_idempotent() {
        let params = Params::regtest();
        for bits in [CompactBits::new(0x207fffff), REAL_BITS, MIN_BITS] {
            let (chain, tip) = uniform_chain(100, 30, bits);
            assert_eq!(calculate_next_work(&chain, tip, &params).unwrap(), bits);
        }
    }

    #[test]
    fn test_pre_interval_floor() {
        let params = Params::main();
        // tip height 58: next block at 59 is still inside the first window
        let (chain, tip) = uniform_chain(59, 30, REAL_BITS);
        assert_eq!(calculate_next_work(&chain, tip, &params).unwrap(), MIN_BITS);

        // Timestamps are irrelevant below the interval
        let (chain, tip) = uniform_chain(59, 1, REAL_BITS);
        assert_eq!(calculate_next_work(&chain, tip, &params).unwrap(), MIN_BITS);
    }

    #[test]
    fn test_first_retarget_at_interval_boundary() {
        let params = Params::main();
        // tip height 59: the block at height 60 is the first retarget
        let (chain, tip) = uniform_chain(60, 30, REAL_BITS);
        let bits = calculate_next_work(&chain, tip, &params).unwrap();
        assert_ne!(bits, MIN_BITS);
    }

    #[test]
    fn test_retarget_exact_arithmetic() {
        // Small window with hand-computed numbers: timespan 100, interval 4.
        // Median times give a measured window of 80s; damping yields
        // 100 + (80-100)/4 = 95, inside the clamp. The target scales by
        // 95/100: 2^232 * 95/100 encodes as 0x1e00f333.
        let params = Params {
            pow_target_timespan: 100,
            pow_target_spacing: 25,
            pow_limit: Target::new(U256::MAX >> 1),
            ..Params::main()
        };
        params.validate().unwrap();
        assert_eq!(params.retarget_interval(), 4);

        let start = CompactBits::new(0x1e010000);
        let (chain, tip) = chain_with_bits(&[start; 4], 40);
        let bits = calculate_next_work(&chain, tip, &params).unwrap();
        assert_eq!(bits.value(), 0x1e00f333);
    }

    #[test]
    fn test_fast_blocks_clamped_at_max_increase() {
        let params = Params::main();
        // One-second blocks: raw window far below the clamp floor
        let (chain, tip) = uniform_chain(100, 1, REAL_BITS);
        let bits = calculate_next_work(&chain, tip, &params).unwrap();

        let old = compact::decode(REAL_BITS).target.as_u256();
        let new = compact::decode(bits).target.as_u256();
        // Difficulty rises by exactly the +8% cap: target shrinks to 92%
        assert!(new < old);
        assert!(new >= old * 919 / 1000);
        assert!(new <= old * 921 / 1000);
    }

    #[test]
    fn test_slow_blocks_clamped_at_max_decrease() {
        let params = Params::main();
        // Ten-minute blocks: raw window far above the clamp ceiling
        let (chain, tip) = uniform_chain(100, 600, REAL_BITS);
        let bits = calculate_next_work(&chain, tip, &params).unwrap();

        let old = compact::decode(REAL_BITS).target.as_u256();
        let new = compact::decode(bits).target.as_u256();
        // Difficulty drops by exactly the -16% cap: target grows to 116%
        assert!(new > old);
        assert!(new <= old * 116 / 100);
        assert!(new >= old * 1159 / 1000);
    }

    #[test]
    fn test_retarget_clamps_to_pow_limit() {
        let params = Params::main();
        // Already at minimum difficulty; slow blocks cannot ease further
        let (chain, tip) = uniform_chain(100, 600, MIN_BITS);
        let bits = calculate_next_work(&chain, tip, &params).unwrap();
        assert_eq!(bits, MIN_BITS);
    }

    #[test]
    fn test_min_difficulty_escape_valve() {
        let params = Params::test();
        let (chain, tip) = uniform_chain(100, 30, REAL_BITS);
        let tip_time = chain.time(tip);

        // Stalled for more than two spacing intervals
        let stalled = header(tip_time + 2 * params.pow_target_spacing + 1);
        let bits = required_work(&chain, Some(tip), &stalled, &params).unwrap();
        assert_eq!(bits, MIN_BITS);

        // Exactly two intervals is not a stall
        let on_time = header(tip_time + 2 * params.pow_target_spacing);
        let bits = required_work(&chain, Some(tip), &on_time, &params).unwrap();
        assert_eq!(bits, REAL_BITS);
    }

    #[test]
    fn test_min_difficulty_walk_finds_real_bits() {
        let params = Params::test();
        // Real difficulty up to height 2, then min-difficulty filler
        let bits: Vec<CompactBits> = (0..6)
            .map(|h| if h <= 2 { REAL_BITS } else { MIN_BITS })
            .collect();
        let (chain, tip) = chain_with_bits(&bits, 30);

        let candidate = header(chain.time(tip) + 30);
        let required = required_work(&chain, Some(tip), &candidate, &params).unwrap();
        assert_eq!(required, REAL_BITS);
    }

    #[test]
    fn test_min_difficulty_walk_stops_at_interval_boundary() {
        let params = Params::test();
        // All min-difficulty past genesis; heights 60 is a retarget
        // boundary, so the walk must stop there even with min bits
        let bits: Vec<CompactBits> = (0..65)
            .map(|h| if h == 0 { REAL_BITS } else { MIN_BITS })
            .collect();
        let (chain, tip) = chain_with_bits(&bits, 30);

        let candidate = header(chain.time(tip) + 30);
        let required = required_work(&chain, Some(tip), &candidate, &params).unwrap();
        assert_eq!(required, MIN_BITS);
    }

    #[test]
    fn test_min_difficulty_walk_reaches_genesis() {
        let params = Params::test();
        // No non-min-difficulty node anywhere: the walk halts at genesis
        let (chain, tip) = uniform_chain(10, 30, MIN_BITS);
        let candidate = header(chain.time(tip) + 30);
        let required = required_work(&chain, Some(tip), &candidate, &params).unwrap();
        assert_eq!(required, MIN_BITS);
    }

    #[test]
    fn test_required_work_delegates_on_main() {
        let params = Params::main();
        let (chain, tip) = uniform_chain(100, 30, REAL_BITS);
        let candidate = header(chain.time(tip) + 30);
        assert_eq!(
            required_work(&chain, Some(tip), &candidate, &params).unwrap(),
            calculate_next_work(&chain, tip, &params).unwrap()
        );
    }

    #[test]
    fn test_proof_validation_boundary() {
        let params = Params::main();
        let target = compact::decode(MIN_BITS).target;

        let exact = BlockHash::from_u256(target.as_u256());
        assert!(is_valid_proof_of_work(&exact, MIN_BITS, &params));

        let above = BlockHash::from_u256(target.as_u256() + U256::one());
        assert_matches!(
            check_proof_of_work(&above, MIN_BITS, &params),
            Err(Error::InsufficientWork { .. })
        );
    }

    #[test]
    fn test_proof_rejects_malformed_bits() {
        let params = Params::main();
        let hash = BlockHash::from_u256(U256::zero());

        // Negative mantissa
        assert_matches!(
            check_proof_of_work(&hash, CompactBits::new(0x04923456), &params),
            Err(Error::MalformedTarget { .. })
        );
        // Overflowing exponent
        assert_matches!(
            check_proof_of_work(&hash, CompactBits::new(0xff123456), &params),
            Err(Error::MalformedTarget { .. })
        );
        // Zero target
        assert_matches!(
            check_proof_of_work(&hash, CompactBits::new(0x00000000), &params),
            Err(Error::MalformedTarget { .. })
        );
        // Above the network's proof-of-work limit
        assert_matches!(
            check_proof_of_work(&hash, CompactBits::new(0x207fffff), &params),
            Err(Error::MalformedTarget { .. })
        );
        // The regtest limit is fine on regtest
        assert!(is_valid_proof_of_work(
            &hash,
            CompactBits::new(0x207fffff),
            &Params::regtest()
        ));
    }

    #[test]
    fn test_all_network_limits_self_validate() {
        // Each network's own limit bits accept a zero hash
        for network in [Network::Main, Network::Test, Network::Regtest] {
            let params = Params::for_network(network);
            let bits = compact::encode(params.pow_limit);
            let hash = BlockHash::from_u256(U256::zero());
            assert!(is_valid_proof_of_work(&hash, bits, &params));
        }
    }
}
