//! Typed Registry Repository
//!
//! One method per index operation. Transaction variants only ever touch
//! persisted state through this type.

use std::collections::BTreeMap;
use std::sync::Arc;

use lib_types::{BlockHeight, PublicKey, Timestamp, TxHash};
use tracing::{debug, error};

use super::{keys, KvBackend, MemoryBackend, StorageError, Tree};
use crate::constants::{REGISTRY_HEADER, REGISTRY_VERSION};
use crate::errors::{RegistryError, RegistryResult};
use crate::ledger::{ImplicitBotRecordUpdate, NameTakeovers};
use crate::types::{BinaryDecode, BinaryEncode, BotId, BotName, BotRecord};

/// Raw contents of every tree, used to compare states
pub type StoreSnapshot = BTreeMap<Tree, Vec<(Vec<u8>, Vec<u8>)>>;

/// Registry view over a key-value backend
#[derive(Debug, Clone)]
pub struct RegistryStore {
    backend: Arc<dyn KvBackend>,
}

impl RegistryStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// A store backed by memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    // =========================================================================
    // Transaction Control
    // =========================================================================

    pub fn begin_block(&self) -> RegistryResult<()> {
        Ok(self.backend.begin_block()?)
    }

    pub fn commit_block(&self) -> RegistryResult<()> {
        Ok(self.backend.commit_block()?)
    }

    pub fn rollback_block(&self) -> RegistryResult<()> {
        Ok(self.backend.rollback_block()?)
    }

    pub fn in_transaction(&self) -> bool {
        self.backend.in_transaction()
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Stamp a fresh store, or check that an existing one is compatible
    pub fn ensure_metadata(&self) -> RegistryResult<()> {
        match self.backend.get(Tree::Meta, keys::meta::VERSION)? {
            Some(version) => {
                let header = self.backend.get(Tree::Meta, keys::meta::HEADER)?.unwrap_or_default();
                if version != REGISTRY_VERSION.as_bytes() || header != REGISTRY_HEADER.as_bytes() {
                    return Err(StorageError::IncompatibleStore {
                        expected: format!("{} {}", REGISTRY_HEADER, REGISTRY_VERSION),
                        found: format!(
                            "{} {}",
                            String::from_utf8_lossy(&header),
                            String::from_utf8_lossy(&version)
                        ),
                    }
                    .into());
                }
                Ok(())
            }
            None => {
                self.backend.begin_block()?;
                let written = self
                    .backend
                    .put(Tree::Meta, keys::meta::VERSION, REGISTRY_VERSION.as_bytes())
                    .and_then(|_| {
                        self.backend
                            .put(Tree::Meta, keys::meta::HEADER, REGISTRY_HEADER.as_bytes())
                    });
                if let Err(e) = written {
                    self.backend.rollback_block()?;
                    return Err(e.into());
                }
                self.backend.commit_block()?;
                debug!(version = REGISTRY_VERSION, "initialized registry store");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Bot Records
    // =========================================================================

    pub fn get_record(&self, id: BotId) -> RegistryResult<Option<BotRecord>> {
        match self.backend.get(Tree::BotRecords, &keys::record_key(id))? {
            Some(bytes) => {
                let record = BotRecord::from_bytes(&bytes).map_err(|e| {
                    corruption(format!("record of bot {} does not decode: {}", id, e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Like `get_record`, failing with `BotNotFound` when absent
    pub fn require_record(&self, id: BotId) -> RegistryResult<BotRecord> {
        self.get_record(id)?.ok_or(RegistryError::BotNotFound(id))
    }

    pub fn put_record(&self, record: &BotRecord) -> RegistryResult<()> {
        let value = record.to_bytes()?;
        Ok(self
            .backend
            .put(Tree::BotRecords, &keys::record_key(record.id), &value)?)
    }

    pub fn delete_record(&self, id: BotId) -> RegistryResult<()> {
        Ok(self.backend.delete(Tree::BotRecords, &keys::record_key(id))?)
    }

    // =========================================================================
    // Bot Id Sequence
    // =========================================================================

    /// Last bot id handed out, `None` before the first registration
    pub fn last_bot_id(&self) -> RegistryResult<Option<BotId>> {
        let last = self.read_counter(keys::meta::BOT_ID_SEQUENCE)?;
        Ok(u32::try_from(last)
            .ok()
            .filter(|id| *id > 0)
            .map(BotId::new))
    }

    /// Reserve the next bot id
    pub fn next_bot_id(&self) -> RegistryResult<BotId> {
        let last = self.read_counter(keys::meta::BOT_ID_SEQUENCE)?;
        let next = u32::try_from(last + 1)
            .map_err(|_| corruption("bot id sequence exhausted"))?;
        self.write_counter(keys::meta::BOT_ID_SEQUENCE, next as u64)?;
        Ok(BotId::new(next))
    }

    /// Return `id` to the sequence; only the most recent id can be released
    pub fn release_bot_id(&self, id: BotId) -> RegistryResult<()> {
        let last = self.read_counter(keys::meta::BOT_ID_SEQUENCE)?;
        if last != id.value() as u64 {
            return Err(corruption(format!(
                "cannot release bot id {}, last assigned id is {}",
                id, last
            )));
        }
        self.write_counter(keys::meta::BOT_ID_SEQUENCE, last - 1)
    }

    // =========================================================================
    // Public Key Index
    // =========================================================================

    pub fn get_bot_id_for_key(&self, key: &PublicKey) -> RegistryResult<Option<BotId>> {
        self.backend
            .get(Tree::KeyToBotId, keys::public_key_key(key))?
            .map(|bytes| decode_index_value(&bytes, "public key"))
            .transpose()
    }

    pub fn map_key(&self, key: &PublicKey, id: BotId) -> RegistryResult<()> {
        Ok(self.backend.put(
            Tree::KeyToBotId,
            keys::public_key_key(key),
            &keys::encode_bot_id(id),
        )?)
    }

    pub fn unmap_key(&self, key: &PublicKey) -> RegistryResult<()> {
        Ok(self.backend.delete(Tree::KeyToBotId, keys::public_key_key(key))?)
    }

    // =========================================================================
    // Name Index
    // =========================================================================

    pub fn get_bot_id_for_name(&self, name: &BotName) -> RegistryResult<Option<BotId>> {
        self.backend
            .get(Tree::NameToBotId, keys::name_key(name))?
            .map(|bytes| decode_index_value(&bytes, "name"))
            .transpose()
    }

    pub fn map_name(&self, name: &BotName, id: BotId) -> RegistryResult<()> {
        Ok(self.backend.put(
            Tree::NameToBotId,
            keys::name_key(name),
            &keys::encode_bot_id(id),
        )?)
    }

    pub fn unmap_name(&self, name: &BotName) -> RegistryResult<()> {
        Ok(self.backend.delete(Tree::NameToBotId, keys::name_key(name))?)
    }

    /// Remove the mapping only while it still points at `id`
    pub fn unmap_name_if_owned_by(&self, name: &BotName, id: BotId) -> RegistryResult<bool> {
        match self.get_bot_id_for_name(name)? {
            Some(owner) if owner == id => {
                self.unmap_name(name)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Map the name only if nobody claims it
    pub fn map_name_if_unclaimed(&self, name: &BotName, id: BotId) -> RegistryResult<bool> {
        if self.get_bot_id_for_name(name)?.is_some() {
            return Ok(false);
        }
        self.map_name(name, id)?;
        Ok(true)
    }

    /// A name is available when unmapped or mapped to a bot expired at `at`
    pub fn is_name_available(&self, name: &BotName, at: Timestamp) -> RegistryResult<bool> {
        match self.get_bot_id_for_name(name)? {
            None => Ok(true),
            Some(owner) => {
                let record = self.get_record(owner)?.ok_or_else(|| {
                    corruption(format!("name {} maps to missing bot {}", name, owner))
                })?;
                Ok(record.is_expired(at))
            }
        }
    }

    // =========================================================================
    // Transaction History
    // =========================================================================

    pub fn append_history(
        &self,
        id: BotId,
        height: BlockHeight,
        sequence: u16,
        tx: &TxHash,
    ) -> RegistryResult<()> {
        Ok(self.backend.put(
            Tree::BotTransactions,
            &keys::history_key(id, height, sequence),
            tx.as_bytes(),
        )?)
    }

    /// Remove a history entry, which must exist
    pub fn remove_history(
        &self,
        id: BotId,
        height: BlockHeight,
        sequence: u16,
        tx: &TxHash,
    ) -> RegistryResult<()> {
        let key = keys::history_key(id, height, sequence);
        if self.backend.get(Tree::BotTransactions, &key)?.is_none() {
            error!(bot_id = %id, height, sequence, tx = %tx, "history entry missing on revert");
            return Err(RegistryError::MissingHistory(*tx));
        }
        Ok(self.backend.delete(Tree::BotTransactions, &key)?)
    }

    /// Transaction ids of a bot, oldest first
    pub fn get_history(&self, id: BotId) -> RegistryResult<Vec<TxHash>> {
        self.backend
            .scan_prefix(Tree::BotTransactions, &keys::history_prefix(id))?
            .into_iter()
            .map(|(key, value)| {
                let hash: [u8; 32] = value.as_slice().try_into().map_err(|_| {
                    corruption(format!("history entry {} holds {} bytes", hex::encode(&key), value.len()))
                })?;
                Ok(TxHash::new(hash))
            })
            .collect()
    }

    // =========================================================================
    // Block Times
    // =========================================================================

    /// Number of blocks applied so far
    pub fn block_count(&self) -> RegistryResult<u64> {
        self.read_counter(keys::meta::BLOCK_COUNT)
    }

    /// Height of the first recorded block; only meaningful once a block exists
    pub fn base_height(&self) -> RegistryResult<BlockHeight> {
        self.read_counter(keys::meta::BASE_HEIGHT)
    }

    /// Height and time of the latest applied block
    pub fn chain_tip(&self) -> RegistryResult<Option<(BlockHeight, Timestamp)>> {
        let count = self.block_count()?;
        if count == 0 {
            return Ok(None);
        }
        let height = self.base_height()? + count - 1;
        let time = self
            .get_block_time(height)?
            .ok_or_else(|| corruption(format!("no block time recorded for height {}", height)))?;
        Ok(Some((height, time)))
    }

    /// Time of the latest applied block, 0 before the first block
    pub fn chain_time(&self) -> RegistryResult<Timestamp> {
        Ok(self.chain_tip()?.map(|(_, time)| time).unwrap_or(0))
    }

    pub fn get_block_time(&self, height: BlockHeight) -> RegistryResult<Option<Timestamp>> {
        self.backend
            .get(Tree::BlockTimes, &keys::block_time_key(height))?
            .map(|bytes| decode_u64(&bytes, "block time"))
            .transpose()
    }

    /// Record the time of the next block.
    ///
    /// The first block may start at any height; every later one must follow
    /// the tip.
    pub fn push_block_time(&self, height: BlockHeight, time: Timestamp) -> RegistryResult<()> {
        let count = self.block_count()?;
        if count == 0 {
            self.write_counter(keys::meta::BASE_HEIGHT, height)?;
        } else {
            let expected = self.base_height()? + count;
            if height != expected {
                return Err(RegistryError::UnexpectedBlock {
                    expected,
                    actual: height,
                });
            }
        }
        self.backend.put(
            Tree::BlockTimes,
            &keys::block_time_key(height),
            &time.to_be_bytes(),
        )?;
        self.write_counter(keys::meta::BLOCK_COUNT, count + 1)
    }

    /// Drop the time of the tip block; `height` must be the tip
    pub fn pop_block_time(&self, height: BlockHeight) -> RegistryResult<Timestamp> {
        let tip = match self.chain_tip()? {
            Some((tip, _)) if tip == height => tip,
            tip => {
                return Err(RegistryError::UnexpectedBlock {
                    expected: tip.map(|(tip, _)| tip).unwrap_or_default(),
                    actual: height,
                })
            }
        };
        let time = self
            .get_block_time(tip)?
            .ok_or_else(|| corruption(format!("no block time recorded for height {}", tip)))?;
        self.backend
            .delete(Tree::BlockTimes, &keys::block_time_key(tip))?;

        let count = self.block_count()? - 1;
        self.write_counter(keys::meta::BLOCK_COUNT, count)?;
        if count == 0 {
            self.write_counter(keys::meta::BASE_HEIGHT, 0)?;
        }
        Ok(time)
    }

    // =========================================================================
    // Undo Ledger
    // =========================================================================

    pub fn put_implicit_update(
        &self,
        tx: &TxHash,
        update: &ImplicitBotRecordUpdate,
    ) -> RegistryResult<()> {
        let value = update.to_bytes()?;
        Ok(self
            .backend
            .put(Tree::ImplicitUpdates, keys::transaction_key(tx), &value)?)
    }

    pub fn get_implicit_update(&self, tx: &TxHash) -> RegistryResult<Option<ImplicitBotRecordUpdate>> {
        self.backend
            .get(Tree::ImplicitUpdates, keys::transaction_key(tx))?
            .map(|bytes| {
                ImplicitBotRecordUpdate::from_bytes(&bytes).map_err(|e| {
                    corruption(format!("implicit update of {} does not decode: {}", tx, e))
                })
            })
            .transpose()
    }

    pub fn delete_implicit_update(&self, tx: &TxHash) -> RegistryResult<()> {
        Ok(self
            .backend
            .delete(Tree::ImplicitUpdates, keys::transaction_key(tx))?)
    }

    /// Remember overwritten name mappings; nothing is stored when empty
    pub fn put_name_takeovers(&self, tx: &TxHash, takeovers: &NameTakeovers) -> RegistryResult<()> {
        if takeovers.is_empty() {
            return Ok(());
        }
        let value = takeovers.to_bytes()?;
        Ok(self
            .backend
            .put(Tree::NameTakeovers, keys::transaction_key(tx), &value)?)
    }

    pub fn get_name_takeovers(&self, tx: &TxHash) -> RegistryResult<NameTakeovers> {
        match self.backend.get(Tree::NameTakeovers, keys::transaction_key(tx))? {
            Some(bytes) => NameTakeovers::from_bytes(&bytes).map_err(|e| {
                corruption(format!("name takeovers of {} do not decode: {}", tx, e))
            }),
            None => Ok(NameTakeovers::new()),
        }
    }

    pub fn delete_name_takeovers(&self, tx: &TxHash) -> RegistryResult<()> {
        Ok(self
            .backend
            .delete(Tree::NameTakeovers, keys::transaction_key(tx))?)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Raw contents of every tree
    pub fn snapshot(&self) -> RegistryResult<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::new();
        for tree in Tree::ALL {
            let entries = self.backend.scan_prefix(tree, &[])?;
            if !entries.is_empty() {
                snapshot.insert(tree, entries);
            }
        }
        Ok(snapshot)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn read_counter(&self, key: &[u8]) -> RegistryResult<u64> {
        match self.backend.get(Tree::Meta, key)? {
            Some(bytes) => decode_u64(&bytes, "counter"),
            None => Ok(0),
        }
    }

    /// Zero counters are deleted so an undone counter leaves no trace
    fn write_counter(&self, key: &[u8], value: u64) -> RegistryResult<()> {
        if value == 0 {
            Ok(self.backend.delete(Tree::Meta, key)?)
        } else {
            Ok(self.backend.put(Tree::Meta, key, &value.to_be_bytes())?)
        }
    }
}

fn corruption(msg: impl Into<String>) -> RegistryError {
    let err = RegistryError::corruption(msg);
    error!(error = %err, "registry store is inconsistent");
    err
}

fn decode_index_value(bytes: &[u8], index: &str) -> RegistryResult<BotId> {
    keys::decode_bot_id(bytes)
        .ok_or_else(|| corruption(format!("{} index value has {} bytes", index, bytes.len())))
}

fn decode_u64(bytes: &[u8], what: &str) -> RegistryResult<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| corruption(format!("{} has {} bytes", what, bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompactTimestamp;

    fn in_block<T>(store: &RegistryStore, f: impl FnOnce() -> RegistryResult<T>) -> T {
        store.begin_block().unwrap();
        let out = f().unwrap();
        store.commit_block().unwrap();
        out
    }

    fn name(s: &str) -> BotName {
        BotName::new(s).unwrap()
    }

    #[test]
    fn test_bot_id_sequence() {
        let store = RegistryStore::in_memory();
        assert_eq!(store.last_bot_id().unwrap(), None);

        let first = in_block(&store, || store.next_bot_id());
        let second = in_block(&store, || store.next_bot_id());
        assert_eq!(first, BotId::new(1));
        assert_eq!(second, BotId::new(2));

        store.begin_block().unwrap();
        assert!(store.release_bot_id(first).unwrap_err().is_corruption());
        store.release_bot_id(second).unwrap();
        store.release_bot_id(first).unwrap();
        store.commit_block().unwrap();

        assert_eq!(store.last_bot_id().unwrap(), None);
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_conditional_name_mapping() {
        let store = RegistryStore::in_memory();
        let alice = name("alice.example");
        store.begin_block().unwrap();

        assert!(store.map_name_if_unclaimed(&alice, BotId::new(1)).unwrap());
        assert!(!store.map_name_if_unclaimed(&alice, BotId::new(2)).unwrap());
        assert!(!store.unmap_name_if_owned_by(&alice, BotId::new(2)).unwrap());
        assert_eq!(store.get_bot_id_for_name(&alice).unwrap(), Some(BotId::new(1)));

        assert!(store.unmap_name_if_owned_by(&alice, BotId::new(1)).unwrap());
        assert_eq!(store.get_bot_id_for_name(&alice).unwrap(), None);
        assert!(!store.unmap_name_if_owned_by(&alice, BotId::new(1)).unwrap());
    }

    #[test]
    fn test_name_availability_follows_expiration() {
        let store = RegistryStore::in_memory();
        let alice = name("alice.example");
        let mut record = BotRecord::new(BotId::new(1), PublicKey::new([1u8; 32]));
        record.expiration = CompactTimestamp::from_unix(1_700_000_040);
        let exp = record.expiration.as_unix();

        in_block(&store, || {
            store.put_record(&record)?;
            store.map_name(&alice, record.id)
        });

        assert!(!store.is_name_available(&alice, exp - 1).unwrap());
        assert!(store.is_name_available(&alice, exp).unwrap());
        assert!(store.is_name_available(&name("bobby.example"), 0).unwrap());
    }

    #[test]
    fn test_dangling_name_is_corruption() {
        let store = RegistryStore::in_memory();
        let alice = name("alice.example");
        in_block(&store, || store.map_name(&alice, BotId::new(9)));

        let err = store.is_name_available(&alice, 0).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_history_is_ordered() {
        let store = RegistryStore::in_memory();
        let id = BotId::new(3);
        let (a, b, c) = (TxHash::new([1; 32]), TxHash::new([2; 32]), TxHash::new([3; 32]));
        in_block(&store, || {
            store.append_history(id, 5, 1, &c)?;
            store.append_history(id, 2, 0, &a)?;
            store.append_history(id, 5, 0, &b)?;
            store.append_history(BotId::new(4), 1, 0, &a)
        });

        assert_eq!(store.get_history(id).unwrap(), vec![a, b, c]);
    }

    #[test]
    fn test_removing_missing_history_fails() {
        let store = RegistryStore::in_memory();
        store.begin_block().unwrap();
        let err = store
            .remove_history(BotId::new(1), 0, 0, &TxHash::new([7; 32]))
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingHistory(TxHash::new([7; 32])));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_block_time_sequence() {
        let store = RegistryStore::in_memory();
        assert_eq!(store.chain_time().unwrap(), 0);

        store.begin_block().unwrap();
        store.push_block_time(0, 100).unwrap();
        assert!(matches!(
            store.push_block_time(2, 160),
            Err(RegistryError::UnexpectedBlock { expected: 1, actual: 2 })
        ));
        store.push_block_time(1, 160).unwrap();
        store.commit_block().unwrap();

        assert_eq!(store.chain_tip().unwrap(), Some((1, 160)));

        store.begin_block().unwrap();
        assert!(store.pop_block_time(0).is_err());
        assert_eq!(store.pop_block_time(1).unwrap(), 160);
        assert_eq!(store.pop_block_time(0).unwrap(), 100);
        assert!(store.pop_block_time(0).is_err());
        store.commit_block().unwrap();

        assert_eq!(store.chain_tip().unwrap(), None);
    }

    #[test]
    fn test_first_block_sets_base_height() {
        let store = RegistryStore::in_memory();
        store.ensure_metadata().unwrap();
        let before = store.snapshot().unwrap();

        store.begin_block().unwrap();
        store.push_block_time(500, 100).unwrap();
        assert!(matches!(
            store.push_block_time(502, 160),
            Err(RegistryError::UnexpectedBlock { expected: 501, actual: 502 })
        ));
        store.push_block_time(501, 160).unwrap();
        store.commit_block().unwrap();
        assert_eq!(store.chain_tip().unwrap(), Some((501, 160)));

        store.begin_block().unwrap();
        assert!(store.pop_block_time(500).is_err());
        assert_eq!(store.pop_block_time(501).unwrap(), 160);
        assert_eq!(store.pop_block_time(500).unwrap(), 100);
        store.commit_block().unwrap();

        assert_eq!(store.chain_tip().unwrap(), None);
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_ensure_metadata_is_idempotent() {
        let store = RegistryStore::in_memory();
        store.ensure_metadata().unwrap();
        store.ensure_metadata().unwrap();
        assert_eq!(store.snapshot().unwrap()[&Tree::Meta].len(), 2);
    }

    #[test]
    fn test_incompatible_store_rejected() {
        let store = RegistryStore::in_memory();
        in_block(&store, || {
            Ok(store
                .backend
                .put(Tree::Meta, keys::meta::VERSION, b"0.9.0.0")?)
        });
        assert!(matches!(
            store.ensure_metadata(),
            Err(RegistryError::Storage(StorageError::IncompatibleStore { .. }))
        ));
    }
}
