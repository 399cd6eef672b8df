//! Compact Timestamps
//!
//! Expirations are stored with one minute accuracy, counted from a fixed
//! nullpoint, so they fit in three bytes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use lib_types::Timestamp;

use super::codec::{write_u24, BinaryDecode, BinaryEncode, Reader, MAX_U24};
use crate::constants::BOT_MONTH;
use crate::errors::{RegistryError, RegistryResult};

/// First representable instant (~Jan 2018)
pub const COMPACT_TIMESTAMP_NULLPOINT: u64 = 1_515_000_000;

/// Accuracy of a compact timestamp, in seconds
pub const COMPACT_TIMESTAMP_ACCURACY: u64 = 60;

/// Unix seconds, rounded down to the minute and never before the nullpoint
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompactTimestamp(u64);

impl CompactTimestamp {
    /// The nullpoint itself, encoded as zero
    pub const MIN: Self = Self(COMPACT_TIMESTAMP_NULLPOINT);

    /// Last instant that still fits in three bytes
    pub const MAX: Self =
        Self(COMPACT_TIMESTAMP_NULLPOINT + MAX_U24 as u64 * COMPACT_TIMESTAMP_ACCURACY);

    /// Quantize a unix timestamp
    pub fn from_unix(ts: Timestamp) -> Self {
        let ts = ts.max(COMPACT_TIMESTAMP_NULLPOINT);
        Self(ts - ts % COMPACT_TIMESTAMP_ACCURACY)
    }

    /// Rebuild a timestamp from its encoded minute count
    pub fn from_units(units: u32) -> Self {
        Self(COMPACT_TIMESTAMP_NULLPOINT + units as u64 * COMPACT_TIMESTAMP_ACCURACY)
    }

    /// Unix seconds
    pub const fn as_unix(self) -> Timestamp {
        self.0
    }

    /// Minutes since the nullpoint
    pub fn units(self) -> u64 {
        (self.0 - COMPACT_TIMESTAMP_NULLPOINT) / COMPACT_TIMESTAMP_ACCURACY
    }

    /// Whether the timestamp can be encoded
    pub fn is_representable(self) -> bool {
        self <= Self::MAX
    }

    /// Move forward by whole bot months, `None` on overflow
    pub fn add_months(self, months: u8) -> Option<Self> {
        (months as u64)
            .checked_mul(BOT_MONTH)
            .and_then(|secs| self.0.checked_add(secs))
            .map(Self)
    }

    /// Move back by whole bot months, failing below the nullpoint
    pub fn sub_months(self, months: u8) -> RegistryResult<Self> {
        self.0
            .checked_sub(months as u64 * BOT_MONTH)
            .filter(|ts| *ts >= COMPACT_TIMESTAMP_NULLPOINT)
            .map(Self)
            .ok_or_else(|| {
                RegistryError::corruption(format!(
                    "cannot move expiration {} back by {} months",
                    self.0, months
                ))
            })
    }
}

impl Default for CompactTimestamp {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Debug for CompactTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactTimestamp({})", self.0)
    }
}

impl fmt::Display for CompactTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BinaryEncode for CompactTimestamp {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        let units = u32::try_from(self.units())
            .ok()
            .filter(|units| *units <= MAX_U24)
            .ok_or_else(|| {
                RegistryError::Encoding(format!("timestamp {} is out of the compact range", self.0))
            })?;
        write_u24(out, units)
    }
}

impl BinaryDecode for CompactTimestamp {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        Ok(Self::from_units(reader.read_u24()?))
    }
}

// JSON carries plain unix seconds
impl Serialize for CompactTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for CompactTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_unix(u64::deserialize(deserializer)?))
    }
}
