//! Bot Registry Errors

use thiserror::Error;
use lib_types::{Amount, PublicKey, TxHash};

use crate::storage::StorageError;
use crate::types::{BotId, CompactTimestamp};

/// Error during registry validation, apply or revert
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    // =========================================================================
    // Lookups
    // =========================================================================
    #[error("no bot record found for bot {0}")]
    BotNotFound(BotId),

    #[error("no bot registered for public key {0}")]
    KeyNotFound(PublicKey),

    #[error("no bot owns name {0}")]
    NameNotFound(String),

    #[error("bot {bot_id} expired at {expiration}")]
    Expired {
        bot_id: BotId,
        expiration: CompactTimestamp,
    },

    // =========================================================================
    // Validation
    // =========================================================================
    #[error("public key {0} is already registered")]
    AlreadyRegistered(PublicKey),

    #[error("name {0} is not available")]
    NameUnavailable(String),

    #[error("too many {kind}: {count} exceeds the limit of {limit}")]
    CapacityExceeded {
        kind: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("expiration would extend beyond the maximum prepaid period")]
    ExpirationOverflow,

    #[error("invalid number of months: {0}")]
    InvalidMonths(u8),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("insufficient {kind} fee: paid {paid}, required {required}")]
    InsufficientFee {
        kind: &'static str,
        paid: Amount,
        required: Amount,
    },

    #[error("record update does not change anything")]
    NoOpUpdateRejected,

    #[error("a bot needs at least one name or network address")]
    EmptyRecord,

    #[error("sender and receiver are both bot {0}")]
    SelfTransfer(BotId),

    #[error("a name transfer needs at least one name")]
    EmptyTransfer,

    #[error("duplicate {kind}: {value}")]
    DuplicateEntry { kind: &'static str, value: String },

    #[error("missing {kind}: {value}")]
    MissingEntry { kind: &'static str, value: String },

    // =========================================================================
    // Parsing and encoding
    // =========================================================================
    #[error("invalid bot name: {0}")]
    InvalidName(String),

    #[error("invalid network address: {0}")]
    InvalidAddress(String),

    #[error("invalid bot id: {0}")]
    InvalidBotId(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    // =========================================================================
    // Ledger state
    // =========================================================================
    #[error("block at height {actual} does not follow the registry, expected {expected}")]
    UnexpectedBlock { expected: u64, actual: u64 },

    #[error("transaction sequence {actual} does not follow {previous} in block {height}")]
    UnorderedSequence { height: u64, previous: u16, actual: u16 },

    #[error("transaction {0} is not recorded in the bot history")]
    MissingHistory(TxHash),

    #[error("registry corruption: {0}")]
    Corruption(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Whether this error means persisted state is inconsistent,
    /// as opposed to a transaction being rejected.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RegistryError::Corruption(_)
                | RegistryError::MissingHistory(_)
                | RegistryError::UnexpectedBlock { .. }
                | RegistryError::Storage(StorageError::CorruptedData(_))
        )
    }

    /// Whether this error is a failed lookup
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::BotNotFound(_)
                | RegistryError::KeyNotFound(_)
                | RegistryError::NameNotFound(_)
        )
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        RegistryError::Corruption(msg.into())
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_classification() {
        assert!(RegistryError::corruption("index").is_corruption());
        assert!(RegistryError::MissingHistory(TxHash::zero()).is_corruption());
        assert!(RegistryError::Storage(StorageError::CorruptedData("x".into())).is_corruption());
        assert!(!RegistryError::Storage(StorageError::NoActiveTransaction).is_corruption());
        assert!(!RegistryError::NoOpUpdateRejected.is_corruption());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(RegistryError::BotNotFound(BotId::new(3)).is_not_found());
        assert!(RegistryError::NameNotFound("alice.example".into()).is_not_found());
        assert!(!RegistryError::EmptyTransfer.is_not_found());
    }
}
