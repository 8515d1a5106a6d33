//! Mining parameters. Must be agreed by all participants before deployment.

use num_bigint::BigUint;

use crate::crypto::HASH_SIZE;

/// How often blocks are announced, in seconds.
pub const BLOCK_INTERVAL: u64 = 5;

/// The initial reward for successfully mining a block.
pub const INIT_REWARD: u64 = 1000;

/// How often the block reward is halved, in blocks.
pub const REWARD_UPDATE_INTERVAL: u64 = 100;

/// Expected aggregate network hashrate used to derive the initial threshold.
pub const EXPECTED_TOTAL_HASHRATE: u64 = 30;

/// How often the PoW threshold is retargeted, in blocks.
pub const THRESHOLD_UPDATE_INTERVAL: u64 = 20;

/// The PoW target: a node's block id must compare less than this.
pub type Threshold = [u8; HASH_SIZE];

/// `floor(2^(8*HASH_SIZE) / (BLOCK_INTERVAL * EXPECTED_TOTAL_HASHRATE))`.
pub fn init_threshold() -> Threshold {
    let expected_hashes_per_block = BigUint::from(BLOCK_INTERVAL * EXPECTED_TOTAL_HASHRATE);
    let space = BigUint::from(1u8) << (HASH_SIZE * 8);
    to_fixed_be(&(space / expected_hashes_per_block))
}

/// `threshold * observed / expected`, with `observed`/`expected` in seconds.
pub fn retarget(threshold: &Threshold, observed: u64, expected: u64) -> Threshold {
    let t = BigUint::from_bytes_be(threshold) * BigUint::from(observed) / BigUint::from(expected);
    to_fixed_be(&t)
}

fn to_fixed_be(n: &BigUint) -> Threshold {
    let bytes = n.to_bytes_be();
    assert!(bytes.len() <= HASH_SIZE, "threshold overflowed {HASH_SIZE} bytes");
    let mut out = [0u8; HASH_SIZE];
    out[HASH_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retarget_matches_expected_time() {
        let t = init_threshold();
        let expected = BLOCK_INTERVAL * THRESHOLD_UPDATE_INTERVAL;
        // observed == expected -> threshold unchanged
        assert_eq!(retarget(&t, expected, expected), t);
    }

    #[test]
    fn retarget_scales_linearly() {
        let t = init_threshold();
        let expected = BLOCK_INTERVAL * THRESHOLD_UPDATE_INTERVAL;
        let doubled = retarget(&t, expected * 2, expected);
        let big_t = BigUint::from_bytes_be(&t);
        let big_doubled = BigUint::from_bytes_be(&doubled);
        assert_eq!(big_doubled, big_t * 2u8);
    }
}
