//! Key Encoding Helpers
//!
//! Key encoding is PROTOCOL. These functions define the canonical byte layout
//! for all storage keys. Never inline key construction in business logic.
//!
//! # Format Conventions
//!
//! - Bot ids are big-endian u32 (sorts numerically)
//! - Heights are big-endian u64
//! - Hashes and public keys are raw bytes (32 bytes)
//! - Composite keys use fixed-width fields (no delimiters needed)

use lib_types::{BlockHeight, PublicKey, TxHash};

use crate::types::{BotId, BotName};

// =============================================================================
// RECORD KEYS
// =============================================================================

/// Key for bot_records tree: bot_id (4 bytes BE) → record_bytes
#[inline]
pub fn record_key(id: BotId) -> [u8; 4] {
    id.value().to_be_bytes()
}

/// Value stored in the key and name indices
#[inline]
pub fn encode_bot_id(id: BotId) -> [u8; 4] {
    id.value().to_be_bytes()
}

/// Parse an index value written by `encode_bot_id`
#[inline]
pub fn decode_bot_id(bytes: &[u8]) -> Option<BotId> {
    let array: [u8; 4] = bytes.try_into().ok()?;
    Some(BotId::new(u32::from_be_bytes(array)))
}

// =============================================================================
// INDEX KEYS
// =============================================================================

/// Key for key_to_bot_id tree: public_key (32 bytes) → bot_id
#[inline]
pub fn public_key_key(key: &PublicKey) -> &[u8; 32] {
    key.as_bytes()
}

/// Key for name_to_bot_id tree: lowercase name bytes → bot_id
#[inline]
pub fn name_key(name: &BotName) -> &[u8] {
    name.as_bytes()
}

// =============================================================================
// HISTORY KEYS
// =============================================================================

/// Key for bot_transactions tree: bot_id (4 BE) + height (8 BE) + sequence (2 BE) → tx_hash
///
/// Layout: [bot_id: 4][height: 8][sequence: 2] = 14 bytes total
///
/// A prefix scan over the bot id yields its transactions oldest first.
#[inline]
pub fn history_key(id: BotId, height: BlockHeight, sequence: u16) -> [u8; 14] {
    let mut key = [0u8; 14];
    key[..4].copy_from_slice(&id.value().to_be_bytes());
    key[4..12].copy_from_slice(&height.to_be_bytes());
    key[12..].copy_from_slice(&sequence.to_be_bytes());
    key
}

/// Prefix for scanning the history of one bot
#[inline]
pub fn history_prefix(id: BotId) -> [u8; 4] {
    id.value().to_be_bytes()
}

// =============================================================================
// LEDGER KEYS
// =============================================================================

/// Key for block_times tree: height (8 bytes BE) → unix seconds (8 bytes BE)
#[inline]
pub fn block_time_key(height: BlockHeight) -> [u8; 8] {
    height.to_be_bytes()
}

/// Key for implicit_updates and name_takeovers trees: tx_hash (32 bytes)
#[inline]
pub fn transaction_key(tx: &TxHash) -> &[u8; 32] {
    tx.as_bytes()
}

// =============================================================================
// META KEYS
// =============================================================================

/// Well-known meta keys
pub mod meta {
    /// Last bot id handed out
    pub const BOT_ID_SEQUENCE: &[u8] = b"bot_id_sequence";

    /// Number of blocks recorded in the block_times tree
    pub const BLOCK_COUNT: &[u8] = b"block_count";

    /// Height of the first recorded block
    pub const BASE_HEIGHT: &[u8] = b"base_height";

    /// Store schema version
    pub const VERSION: &[u8] = b"version";

    /// Store header
    pub const HEADER: &[u8] = b"header";
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_ordering() {
        assert!(record_key(BotId::new(1)) < record_key(BotId::new(2)));
        assert!(record_key(BotId::new(255)) < record_key(BotId::new(256)));
    }

    #[test]
    fn test_history_key_ordering() {
        let id = BotId::new(7);
        let k1 = history_key(id, 10, 5);
        let k2 = history_key(id, 10, 6);
        let k3 = history_key(id, 11, 0);
        assert!(k1 < k2);
        assert!(k2 < k3);
        assert!(k3.starts_with(&history_prefix(id)));
        assert!(!history_key(BotId::new(8), 0, 0).starts_with(&history_prefix(id)));
    }

    #[test]
    fn test_block_time_key_ordering() {
        assert!(block_time_key(0) < block_time_key(1));
        assert!(block_time_key(255) < block_time_key(256));
    }

    #[test]
    fn test_bot_id_value_roundtrip() {
        let id = BotId::new(0xdead);
        assert_eq!(decode_bot_id(&encode_bot_id(id)), Some(id));
        assert_eq!(decode_bot_id(&[1, 2, 3]), None);
    }
}
