//! Bot Registry
//!
//! A reversible index of named bots, maintained alongside a host chain.
//!
//! # Purpose
//!
//! Bots register a public key together with network addresses and names,
//! prepay their registration in months, and later renew, edit or hand over
//! names. The registry keeps lookups by id, key and name consistent while
//! blocks are applied, and restores the exact previous state when blocks are
//! reverted during a reorganization.
//!
//! # Transactions
//!
//! 1. **Registration**: new bot for an unregistered key
//! 2. **Record update**: renew, edit addresses and names, reactivate
//! 3. **Name transfer**: move names between two active bots
//!
//! # Usage
//!
//! ```ignore
//! use lib_botregistry::{Block, BlockTransaction, BotRegistry, RegistryConfig};
//!
//! let registry = BotRegistry::open(RegistryConfig::default())?;
//! registry.validate_transaction(&tx, block_time)?;
//! registry.apply_block(&Block::new(height, block_time, vec![BlockTransaction::new(tx)?]))?;
//! let bot = registry.get_record_by_name(&"alice.example".parse()?)?;
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod ledger;
pub mod registry;
pub mod storage;
pub mod transactions;
pub mod types;
pub mod verifier;

pub use config::{load_config, RegistryConfig};
pub use errors::{RegistryError, RegistryResult};
pub use ledger::{ImplicitBotRecordUpdate, NameTakeovers};
pub use registry::{Block, BlockTransaction, BotRegistry};
pub use storage::{KvBackend, MemoryBackend, RegistryStore, SledBackend, StorageError, Tree};
pub use transactions::{
    BotFees, BotNameTransfer, BotRecordUpdate, BotRegistration, BotTransaction, FeeSchedule,
    SignerRole, TransactionKind,
};
pub use types::{BotId, BotName, BotRecord, CompactTimestamp, NetworkAddress, SortedSet};
pub use verifier::{Ed25519Verifier, SignatureVerifier};
