use std::io;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{block, BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A transaction's `nLockTime` field. Values below 500,000,000 are
/// interpreted as a block height the transaction must not be mined before;
/// values at or above that threshold are a Unix timestamp instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockTime {
    Height(block::Height),
    Time(DateTime<Utc>),
}

/// The threshold, taken directly from the reference implementation, below
/// which `nLockTime` is a block height rather than a timestamp.
const LOCKTIME_THRESHOLD: u32 = 500_000_000;

impl LockTime {
    pub fn unlocked() -> LockTime {
        LockTime::Height(block::Height(0))
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        let raw = match self {
            LockTime::Height(height) => height.0,
            LockTime::Time(time) => time.timestamp() as u32,
        };
        raw.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if raw < LOCKTIME_THRESHOLD {
            Ok(LockTime::Height(block::Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}
