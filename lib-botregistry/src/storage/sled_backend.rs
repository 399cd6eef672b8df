//! Sled-based KvBackend Implementation
//!
//! Do not rely on sled-specific features beyond basic KV + batches.

use std::path::Path;

use sled::{Batch, Db};
use tracing::debug;

use super::overlay::PendingBlock;
use super::{KvBackend, StorageError, StorageResult, Tree};

fn db_err(e: sled::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Sled-based implementation of KvBackend
pub struct SledBackend {
    db: Db,

    // Trees (opened once, reused), indexed by `Tree::index`
    trees: Vec<sled::Tree>,

    flush_on_commit: bool,

    // Transaction state
    pending: PendingBlock,
}

impl std::fmt::Debug for SledBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledBackend")
            .field("tx_active", &self.pending.is_active())
            .field("flush_on_commit", &self.flush_on_commit)
            .finish_non_exhaustive()
    }
}

impl SledBackend {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path).map_err(db_err)?;
        Self::from_db(db)
    }

    /// Open a store that is deleted when dropped
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(db_err)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let trees = Tree::ALL
            .iter()
            .map(|tree| db.open_tree(tree.name()).map_err(db_err))
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Self {
            db,
            trees,
            flush_on_commit: false,
            pending: PendingBlock::default(),
        })
    }

    /// Flush to disk after every committed block
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush().map_err(db_err)?;
        Ok(())
    }

    fn tree(&self, tree: Tree) -> &sled::Tree {
        &self.trees[tree.index()]
    }
}

impl KvBackend for SledBackend {
    fn get(&self, tree: Tree, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(tree, key) {
            return Ok(pending);
        }
        self.tree(tree)
            .get(key)
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(db_err)
    }

    fn scan_prefix(&self, tree: Tree, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let committed = self
            .tree(tree)
            .scan_prefix(prefix)
            .map(|entry| entry.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(self.pending.merge_prefix(tree, prefix, committed))
    }

    fn put(&self, tree: Tree, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.pending.put(tree, key, value)
    }

    fn delete(&self, tree: Tree, key: &[u8]) -> StorageResult<()> {
        self.pending.delete(tree, key)
    }

    // =========================================================================
    // Transaction Control
    // =========================================================================

    fn begin_block(&self) -> StorageResult<()> {
        self.pending.begin()
    }

    fn commit_block(&self) -> StorageResult<()> {
        let overlay = self.pending.take()?;

        // Batches are atomic per tree, not across trees.
        for (tree, writes) in overlay.into_trees() {
            let mut batch = Batch::default();
            let count = writes.len();
            for (key, value) in writes {
                match value {
                    Some(value) => batch.insert(key, value),
                    None => batch.remove(key),
                }
            }
            self.tree(tree).apply_batch(batch).map_err(db_err)?;
            debug!(tree = %tree, writes = count, "applied batch");
        }

        if self.flush_on_commit {
            self.flush()?;
        }
        Ok(())
    }

    fn rollback_block(&self) -> StorageResult<()> {
        self.pending.discard()
    }

    fn in_transaction(&self) -> bool {
        self.pending.is_active()
    }
}

// =============================================================================
// TESTS
// =============================================================================
