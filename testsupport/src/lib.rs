//! Shared test-only helpers: tracing/error-report setup for integration
//! tests, plus generic proptest strategies reused across crates' property
//! tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber and `color-eyre` panic/error reporter for
/// a test binary. Safe to call from every test in a suite; only the first
/// call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let _ = color_eyre::install();
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub mod strategy {
    //! Proptest strategies for the wire primitives shared across crates.

    use proptest::prelude::*;

    /// Values worth exercising a compact-size-int codec against: the
    /// boundaries of each encoding width, not just uniformly random `u64`s.
    pub fn compact_int_boundary() -> impl Strategy<Value = u64> {
        prop_oneof![
            Just(0u64),
            Just(0xFC),
            Just(0xFD),
            Just(0xFFFF),
            Just(0x1_0000),
            Just(0xFFFF_FFFF),
            Just(0x1_0000_0000),
            Just(u64::MAX),
            any::<u64>(),
        ]
    }

    /// Well-formed compact-difficulty ("bits") encodings: exponent/coefficient
    /// pairs with the sign bit clear, which is the only shape
    /// `CompactDifficulty::to_target` treats as a real target.
    pub fn compact_difficulty_bits() -> impl Strategy<Value = u32> {
        (0u32..=32, 0u32..=0x007F_FFFF).prop_map(|(exponent, coefficient)| (exponent << 24) | coefficient)
    }
}
