//! Block subsidy and halving schedule.

use chain::{amount::Amount, block::Height};

use crate::parameters::subsidy::{HALVING_INTERVAL, MAX_BLOCK_SUBSIDY};

/// The coinbase subsidy due at `height`: halves every [`HALVING_INTERVAL`]
/// blocks, reaching zero after the 64th halving.
pub fn block_subsidy(height: Height) -> Amount {
    let halvings = height.0 / HALVING_INTERVAL.0;
    if halvings >= 64 {
        return Amount::zero();
    }
    Amount::from_u64(MAX_BLOCK_SUBSIDY >> halvings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_halves_on_schedule() {
        assert_eq!(block_subsidy(Height(0)).base_units(), 50 * chain::amount::COIN);
        assert_eq!(
            block_subsidy(Height(HALVING_INTERVAL.0)).base_units(),
            25 * chain::amount::COIN
        );
        assert_eq!(
            block_subsidy(Height(HALVING_INTERVAL.0 * 2)).base_units(),
            1_250_000_000
        );
    }

    #[test]
    fn subsidy_is_zero_after_64_halvings() {
        assert_eq!(block_subsidy(Height(HALVING_INTERVAL.0 * 64)).base_units(), 0);
    }
}
