//! Proof-of-work validation and difficulty retargeting.

use chain::{
    block::Header, hashing::pow_hash, parameters::genesis::genesis_block,
    parameters::Network, work::CompactDifficulty, BitcoinSerialize,
};
use primitive_types::U256;

/// Bitcoin/Litecoin-style retarget cadence: one adjustment every 2016
/// blocks.
pub const RETARGET_INTERVAL: u32 = 2016;

/// Target spacing between blocks, in seconds, used to judge whether the
/// network hashed too fast or too slow over the last interval.
pub const TARGET_SPACING_SECONDS: i64 = 30;
const TARGET_TIMESPAN_SECONDS: i64 = RETARGET_INTERVAL as i64 * TARGET_SPACING_SECONDS;

/// `true` if `header`'s scrypt proof-of-work hash, interpreted as a 256-bit
/// little-endian integer, is at or below its declared target.
pub fn meets_difficulty_target(header: &Header) -> bool {
    let target = match header.difficulty_threshold.to_target() {
        Some(target) => target,
        None => return false,
    };
    let header_bytes = header
        .bitcoin_serialize_to_vec()
        .expect("header serialization is infallible");
    let hash = pow_hash(&header_bytes);
    U256::from_little_endian(&hash) <= target
}

/// Compute the retargeted difficulty for the block starting a new interval,
/// given the first and last block's header of the interval just completed.
///
/// Clamps the observed timespan to a factor of 4 in either direction, as the
/// reference client does, to limit how far difficulty can swing in a single
/// retarget.
pub fn next_difficulty(
    previous_bits: CompactDifficulty,
    interval_start_time: chrono::DateTime<chrono::Utc>,
    interval_end_time: chrono::DateTime<chrono::Utc>,
) -> CompactDifficulty {
    let actual_timespan = (interval_end_time - interval_start_time).num_seconds();
    let clamped = actual_timespan.clamp(
        TARGET_TIMESPAN_SECONDS / 4,
        TARGET_TIMESPAN_SECONDS * 4,
    );

    let previous_target = previous_bits
        .to_target()
        .unwrap_or_else(|| U256::max_value());
    let new_target = previous_target
        .checked_mul(U256::from(clamped as u64))
        .unwrap_or_else(U256::max_value)
        / U256::from(TARGET_TIMESPAN_SECONDS as u64);

    let genesis_target = genesis_block(Network::Mainnet)
        .header
        .difficulty_threshold
        .to_target()
        .expect("genesis difficulty_threshold is a valid target");
    CompactDifficulty::from_target(new_target.min(genesis_target))
}

/// The maximum target, used as the unity point for difficulty: a chain
/// hashing at this target has "difficulty 1".
const MAX_TARGET_BITS: CompactDifficulty = CompactDifficulty(0x1d00_ffff);

/// `difficulty(bits) = target(MAX_TARGET_BITS) / target(bits)`, as a
/// floating-point ratio (targets routinely exceed `u128`, so we go
/// through `U256`'s decimal `Display` rather than a lossy truncation).
pub fn relative_difficulty(bits: CompactDifficulty) -> f64 {
    let max_target = MAX_TARGET_BITS.to_target().expect("MAX_TARGET_BITS is a valid target");
    let target = match bits.to_target() {
        Some(target) if !target.is_zero() => target,
        _ => return 0.0,
    };
    let max_target: f64 = max_target.to_string().parse().unwrap_or(f64::MAX);
    let target: f64 = target.to_string().parse().unwrap_or(f64::MAX);
    max_target / target
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn genesis_block_meets_its_own_target() {
        let block = genesis_block(Network::Mainnet);
        assert!(meets_difficulty_target(&block.header));
    }

    #[test]
    fn retarget_is_unity_for_exact_timespan() {
        let bits = CompactDifficulty(0x1f09_9996);
        let start = chrono::Utc.timestamp(0, 0);
        let end = chrono::Utc.timestamp(TARGET_TIMESPAN_SECONDS, 0);
        assert_eq!(next_difficulty(bits, start, end), bits);
    }
}
