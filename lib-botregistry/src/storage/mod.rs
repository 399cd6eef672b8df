//! Registry Storage Layer
//!
//! All persistence goes through the `KvBackend` trait. Business logic never
//! talks to a backend directly; it uses the typed `RegistryStore` repository.
//!
//! # Data Model Invariants
//!
//! 1. **Writes only occur inside begin_block → commit_block** - every mutation
//!    of a block is buffered and becomes visible to other readers atomically.
//!
//! 2. **Reads inside a block see that block's writes** - a later transaction
//!    in a block observes the effects of the earlier ones.
//!
//! 3. **Rollback restores the exact pre-block state** - `rollback_block`
//!    discards everything written since `begin_block`.
//!
//! 4. **Revert restores the exact pre-apply state** - applying a block and
//!    reverting it leaves every tree byte-identical.
//!
//! # Design Principles
//!
//! - Registry code MUST NOT know which backend is used
//! - Key encoding is protocol - see `keys.rs`
//! - Values use the canonical binary encodings of `crate::types`

pub mod keys;
pub mod memory;
pub mod overlay;
pub mod sled_backend;
pub mod store;

use std::fmt;

use thiserror::Error;

pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;
pub use store::RegistryStore;

// =============================================================================
// ERRORS
// =============================================================================

/// Error raised by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("No active block transaction")]
    NoActiveTransaction,

    #[error("Block transaction already active")]
    TransactionAlreadyActive,

    #[error("Incompatible store: expected {expected}, found {found}")]
    IncompatibleStore { expected: String, found: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// TREES
// =============================================================================

/// Logical key spaces of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tree {
    /// BotId → BotRecord
    BotRecords,
    /// PublicKey → BotId
    KeyToBotId,
    /// BotName → BotId
    NameToBotId,
    /// (BotId, height, sequence) → TxHash
    BotTransactions,
    /// BlockHeight → block time
    BlockTimes,
    /// TxHash → ImplicitBotRecordUpdate
    ImplicitUpdates,
    /// TxHash → NameTakeovers
    NameTakeovers,
    /// Counters and store metadata
    Meta,
}

impl Tree {
    pub const ALL: [Tree; 8] = [
        Tree::BotRecords,
        Tree::KeyToBotId,
        Tree::NameToBotId,
        Tree::BotTransactions,
        Tree::BlockTimes,
        Tree::ImplicitUpdates,
        Tree::NameTakeovers,
        Tree::Meta,
    ];

    /// Persistent tree name. These names are protocol.
    pub const fn name(self) -> &'static str {
        match self {
            Tree::BotRecords => "bot_records",
            Tree::KeyToBotId => "key_to_bot_id",
            Tree::NameToBotId => "name_to_bot_id",
            Tree::BotTransactions => "bot_transactions",
            Tree::BlockTimes => "block_times",
            Tree::ImplicitUpdates => "implicit_updates",
            Tree::NameTakeovers => "name_takeovers",
            Tree::Meta => "meta",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// BACKEND CONTRACT
// =============================================================================

/// Ordered key-value storage with per-block write transactions.
///
/// Reads are allowed at any time. `put` and `delete` fail with
/// `NoActiveTransaction` outside `begin_block` / `commit_block`.
pub trait KvBackend: Send + Sync + fmt::Debug {
    fn get(&self, tree: Tree, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, tree: Tree, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn put(&self, tree: Tree, key: &[u8], value: &[u8]) -> StorageResult<()>;

    fn delete(&self, tree: Tree, key: &[u8]) -> StorageResult<()>;

    // =========================================================================
    // Transaction Control
    // =========================================================================

    fn begin_block(&self) -> StorageResult<()>;

    fn commit_block(&self) -> StorageResult<()>;

    fn rollback_block(&self) -> StorageResult<()>;

    fn in_transaction(&self) -> bool;
}
