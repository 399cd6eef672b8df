//! Bot Registry Engine
//!
//! Entry point for hosts: feeds blocks into the registry, reverts them on
//! reorganization, validates candidate transactions and answers queries.
//!
//! Every block is applied inside a single storage transaction. Any failure
//! rolls the whole block back, so the registry is always at a block boundary.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use lib_types::{Amount, BlockHeight, PublicKey, Timestamp, TxHash};

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::storage::{KvBackend, MemoryBackend, RegistryStore, SledBackend, StorageError};
use crate::transactions::{BotTransaction, FeeSchedule, TransactionContext, ValidationContext};
use crate::types::{BotId, BotName, BotRecord};
use crate::verifier::{Ed25519Verifier, SignatureVerifier};

// =============================================================================
// BLOCKS
// =============================================================================

/// A registry transaction as it appears in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransaction {
    /// Id under which the transaction is recorded in bot histories
    pub id: TxHash,
    /// Position in the host block; defaults to the index among the
    /// registry transactions of the block
    pub sequence: Option<u16>,
    pub transaction: BotTransaction,
}

impl BlockTransaction {
    /// Wrap a transaction, identifying it by the hash of its encoding
    pub fn new(transaction: BotTransaction) -> RegistryResult<Self> {
        Ok(Self {
            id: transaction.tx_id()?,
            sequence: None,
            transaction,
        })
    }

    /// Wrap a transaction under an id chosen by the host chain
    pub fn with_id(id: TxHash, transaction: BotTransaction) -> Self {
        Self {
            id,
            sequence: None,
            transaction,
        }
    }

    /// Record the transaction at the host's in-block position
    pub fn at_sequence(mut self, sequence: u16) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// The registry-relevant part of a host block.
///
/// The first block applied to an empty registry may have any height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    /// Registry transactions in block order
    pub transactions: Vec<BlockTransaction>,
}

impl Block {
    pub fn new(height: BlockHeight, timestamp: Timestamp, transactions: Vec<BlockTransaction>) -> Self {
        Self {
            height,
            timestamp,
            transactions,
        }
    }

    /// History sequence of every transaction, strictly increasing
    fn sequences(&self) -> RegistryResult<Vec<u16>> {
        let mut sequences: Vec<u16> = Vec::with_capacity(self.transactions.len());
        for (index, tx) in self.transactions.iter().enumerate() {
            let current = match tx.sequence {
                Some(sequence) => sequence,
                None => sequence_of(index)?,
            };
            if let Some(&previous) = sequences.last() {
                if current <= previous {
                    return Err(RegistryError::UnorderedSequence {
                        height: self.height,
                        previous,
                        actual: current,
                    });
                }
            }
            sequences.push(current);
        }
        Ok(sequences)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The bot registry
pub struct BotRegistry {
    store: RegistryStore,
    config: RegistryConfig,
    verifier: Arc<dyn SignatureVerifier>,
    fees: FeeSchedule,
}

impl std::fmt::Debug for BotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRegistry")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("fees", &self.fees)
            .finish()
    }
}

impl BotRegistry {
    /// Open the sled store described by `config`
    pub fn open(config: RegistryConfig) -> RegistryResult<Self> {
        let backend = if config.temporary {
            SledBackend::open_temporary()?
        } else {
            SledBackend::open(&config.db_path)?
        };
        let backend = backend.with_flush_on_commit(config.flush_on_commit);
        Self::with_backend(config, Arc::new(backend))
    }

    pub fn with_backend(config: RegistryConfig, backend: Arc<dyn KvBackend>) -> RegistryResult<Self> {
        let store = RegistryStore::new(backend);
        store.ensure_metadata()?;

        let tip = store.chain_tip()?;
        info!(
            temporary = config.temporary,
            tip_height = ?tip.map(|(height, _)| height),
            last_bot_id = ?store.last_bot_id()?,
            "bot registry opened"
        );

        let fees = config.fee_schedule();
        Ok(Self {
            store,
            config,
            verifier: Arc::new(Ed25519Verifier),
            fees,
        })
    }

    /// Registry in memory with test fees
    pub fn in_memory() -> RegistryResult<Self> {
        Self::with_backend(RegistryConfig::for_testing(), Arc::new(MemoryBackend::new()))
    }

    /// Replace the default ed25519 verifier
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Height and time of the latest applied block
    pub fn chain_tip(&self) -> RegistryResult<Option<(BlockHeight, Timestamp)>> {
        self.store.chain_tip()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_record_by_id(&self, id: BotId) -> RegistryResult<BotRecord> {
        self.store.require_record(id)
    }

    pub fn get_record_by_key(&self, key: &PublicKey) -> RegistryResult<BotRecord> {
        let id = self
            .store
            .get_bot_id_for_key(key)?
            .ok_or(RegistryError::KeyNotFound(*key))?;
        self.store.get_record(id)?.ok_or_else(|| {
            RegistryError::corruption(format!("public key {} maps to missing bot {}", key, id))
        })
    }

    /// Record owning `name`; a name of an expired bot resolves to `Expired`
    pub fn get_record_by_name(&self, name: &BotName) -> RegistryResult<BotRecord> {
        let id = self
            .store
            .get_bot_id_for_name(name)?
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))?;
        let record = self.store.get_record(id)?.ok_or_else(|| {
            RegistryError::corruption(format!("name {} maps to missing bot {}", name, id))
        })?;
        if record.is_expired(self.store.chain_time()?) {
            return Err(RegistryError::Expired {
                bot_id: id,
                expiration: record.expiration,
            });
        }
        Ok(record)
    }

    /// Transactions that touched a bot, oldest first
    pub fn get_transaction_history(&self, id: BotId) -> RegistryResult<Vec<TxHash>> {
        self.store.get_history(id)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check a transaction for a block at `block_time` with the configured minimum miner fee
    pub fn validate_transaction(&self, tx: &BotTransaction, block_time: Timestamp) -> RegistryResult<()> {
        self.validate_transaction_with_fee(tx, block_time, self.config.minimum_miner_fee())
    }

    pub fn validate_transaction_with_fee(
        &self,
        tx: &BotTransaction,
        block_time: Timestamp,
        minimum_miner_fee: Amount,
    ) -> RegistryResult<()> {
        let ctx = ValidationContext {
            store: &self.store,
            verifier: self.verifier.as_ref(),
            fees: &self.fees,
            block_time,
            chain_time: self.store.chain_time()?,
            minimum_miner_fee,
        };
        tx.validate(&ctx).map_err(|e| {
            debug!(kind = ?tx.kind(), error = %e, "registry transaction rejected");
            e
        })
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Apply the next block; nothing is written unless every transaction applies
    pub fn apply_block(&self, block: &Block) -> RegistryResult<()> {
        self.store.begin_block()?;
        let result = block.sequences().and_then(|sequences| {
            self.store.push_block_time(block.height, block.timestamp)?;
            block
                .transactions
                .iter()
                .zip(sequences)
                .try_for_each(|(tx, sequence)| {
                    self.apply_transaction(block.height, block.timestamp, sequence, tx)
                })
        });
        self.finish_block(result, block, "apply")
    }

    /// Revert the tip block, undoing its transactions in reverse order
    pub fn revert_block(&self, block: &Block) -> RegistryResult<()> {
        self.store.begin_block()?;
        let result = self.revert_block_body(block);
        self.finish_block(result, block, "revert")
    }

    fn revert_block_body(&self, block: &Block) -> RegistryResult<()> {
        match self.store.chain_tip()? {
            Some((height, time)) if height == block.height => {
                if time != block.timestamp {
                    return Err(RegistryError::corruption(format!(
                        "block {} was applied at time {}, revert claims {}",
                        height, time, block.timestamp
                    )));
                }
            }
            tip => {
                return Err(RegistryError::UnexpectedBlock {
                    expected: tip.map(|(height, _)| height).unwrap_or_default(),
                    actual: block.height,
                })
            }
        }

        let sequences = block.sequences()?;
        for (tx, sequence) in block.transactions.iter().zip(sequences).rev() {
            self.revert_transaction(block.height, block.timestamp, sequence, tx)?;
        }
        self.store.pop_block_time(block.height)?;
        Ok(())
    }

    fn finish_block(&self, result: RegistryResult<()>, block: &Block, action: &str) -> RegistryResult<()> {
        match result {
            Ok(()) => {
                self.store.commit_block()?;
                info!(
                    height = block.height,
                    transactions = block.transactions.len(),
                    "{} registry block", action
                );
                Ok(())
            }
            Err(e) => {
                if e.is_corruption() {
                    error!(height = block.height, error = %e, "failed to {} registry block", action);
                } else {
                    warn!(height = block.height, error = %e, "failed to {} registry block", action);
                }
                if let Err(rollback) = self.store.rollback_block() {
                    error!(height = block.height, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Apply one transaction inside the open block
    pub fn apply_transaction(
        &self,
        height: BlockHeight,
        block_time: Timestamp,
        sequence: u16,
        tx: &BlockTransaction,
    ) -> RegistryResult<()> {
        let ctx = self.context(height, block_time, sequence, tx.id)?;
        tx.transaction.apply(&ctx)
    }

    /// Revert one transaction inside the open block
    pub fn revert_transaction(
        &self,
        height: BlockHeight,
        block_time: Timestamp,
        sequence: u16,
        tx: &BlockTransaction,
    ) -> RegistryResult<()> {
        let ctx = self.context(height, block_time, sequence, tx.id)?;
        tx.transaction.revert(&ctx)
    }

    fn context(
        &self,
        height: BlockHeight,
        block_time: Timestamp,
        sequence: u16,
        tx_id: TxHash,
    ) -> RegistryResult<TransactionContext<'_>> {
        if !self.store.in_transaction() {
            return Err(StorageError::NoActiveTransaction.into());
        }
        Ok(TransactionContext {
            store: &self.store,
            height,
            block_time,
            sequence,
            tx_id,
        })
    }
}

fn sequence_of(index: usize) -> RegistryResult<u16> {
    u16::try_from(index).map_err(|_| {
        RegistryError::Encoding(format!("transaction index {} exceeds the block sequence range", index))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_blocks_advance_and_rewind_tip() {
        let registry = BotRegistry::in_memory().unwrap();
        assert_eq!(registry.chain_tip().unwrap(), None);

        let genesis = Block::new(0, 1_700_000_040, Vec::new());
        let next = Block::new(1, 1_700_000_100, Vec::new());
        registry.apply_block(&genesis).unwrap();
        registry.apply_block(&next).unwrap();
        assert_eq!(registry.chain_tip().unwrap(), Some((1, 1_700_000_100)));

        assert!(matches!(
            registry.revert_block(&genesis),
            Err(RegistryError::UnexpectedBlock { expected: 1, actual: 0 })
        ));
        registry.revert_block(&next).unwrap();
        assert_eq!(registry.chain_tip().unwrap(), Some((0, 1_700_000_040)));
    }

    #[test]
    fn test_out_of_order_block_rolls_back() {
        let registry = BotRegistry::in_memory().unwrap();
        registry.apply_block(&Block::new(0, 1_700_000_040, Vec::new())).unwrap();

        let skipped = Block::new(3, 1_700_000_100, Vec::new());
        assert!(matches!(
            registry.apply_block(&skipped),
            Err(RegistryError::UnexpectedBlock { expected: 1, actual: 3 })
        ));
        assert!(!registry.store().in_transaction());
        assert_eq!(registry.chain_tip().unwrap(), Some((0, 1_700_000_040)));
    }

    #[test]
    fn test_registry_starts_at_host_height() {
        let registry = BotRegistry::in_memory().unwrap();
        let first = Block::new(1_000, 1_700_000_040, Vec::new());
        registry.apply_block(&first).unwrap();
        registry.apply_block(&Block::new(1_001, 1_700_000_100, Vec::new())).unwrap();
        assert_eq!(registry.chain_tip().unwrap(), Some((1_001, 1_700_000_100)));

        registry.revert_block(&Block::new(1_001, 1_700_000_100, Vec::new())).unwrap();
        registry.revert_block(&first).unwrap();
        assert_eq!(registry.chain_tip().unwrap(), None);
    }

    #[test]
    fn test_unordered_sequences_rejected() {
        let registry = BotRegistry::in_memory().unwrap();
        let tx = BotTransaction::NameTransfer(crate::transactions::BotNameTransfer {
            sender: BotId::new(1),
            receiver: BotId::new(2),
            names: Default::default(),
            fees: Default::default(),
            sender_signature: Vec::new(),
            receiver_signature: Vec::new(),
        });
        let tx = BlockTransaction::new(tx).unwrap();
        let block = Block::new(
            0,
            1_700_000_040,
            vec![tx.clone().at_sequence(4), tx.at_sequence(4)],
        );
        assert!(matches!(
            registry.apply_block(&block),
            Err(RegistryError::UnorderedSequence { height: 0, previous: 4, actual: 4 })
        ));
        assert_eq!(registry.chain_tip().unwrap(), None);
    }

    #[test]
    fn test_transaction_outside_block_rejected() {
        let registry = BotRegistry::in_memory().unwrap();
        let tx = BotTransaction::NameTransfer(crate::transactions::BotNameTransfer {
            sender: BotId::new(1),
            receiver: BotId::new(2),
            names: Default::default(),
            fees: Default::default(),
            sender_signature: Vec::new(),
            receiver_signature: Vec::new(),
        });
        let tx = BlockTransaction::new(tx).unwrap();
        assert!(matches!(
            registry.apply_transaction(0, 1_700_000_040, 0, &tx),
            Err(RegistryError::Storage(StorageError::NoActiveTransaction))
        ));
    }

    #[test]
    fn test_lookups_on_empty_registry() {
        let registry = BotRegistry::in_memory().unwrap();
        assert!(registry.get_record_by_id(BotId::new(1)).unwrap_err().is_not_found());
        assert!(registry
            .get_record_by_name(&BotName::new("alice.example").unwrap())
            .unwrap_err()
            .is_not_found());
        assert!(registry
            .get_record_by_key(&PublicKey::new([1; 32]))
            .unwrap_err()
            .is_not_found());
        assert!(registry.get_transaction_history(BotId::new(1)).unwrap().is_empty());
    }
}
