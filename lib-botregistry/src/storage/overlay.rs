//! Pending Block Writes
//!
//! Both backends buffer a block's writes here until `commit_block`.
//! Reads consult the buffer first, so later transactions in a block see the
//! effects of earlier ones.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{StorageError, StorageResult, Tree};

/// Writes of one tree; `None` marks a deletion
pub type TreeWrites = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Buffered changes for atomic commit
#[derive(Debug, Default)]
pub struct WriteOverlay {
    trees: BTreeMap<Tree, TreeWrites>,
}

impl WriteOverlay {
    fn put(&mut self, tree: Tree, key: &[u8], value: &[u8]) {
        self.trees
            .entry(tree)
            .or_default()
            .insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, tree: Tree, key: &[u8]) {
        self.trees.entry(tree).or_default().insert(key.to_vec(), None);
    }

    /// `None` if the key was not touched in this block
    fn get(&self, tree: Tree, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.trees.get(&tree)?.get(key).cloned()
    }

    fn merge_prefix(
        &self,
        tree: Tree,
        prefix: &[u8],
        committed: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let writes = match self.trees.get(&tree) {
            Some(writes) => writes,
            None => return committed,
        };
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = committed.into_iter().collect();
        for (key, value) in writes
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    /// Consume the overlay, yielding the writes of every touched tree
    pub fn into_trees(self) -> impl Iterator<Item = (Tree, TreeWrites)> {
        self.trees.into_iter()
    }
}

/// Transaction state shared by the backends
#[derive(Debug, Default)]
pub struct PendingBlock {
    active: AtomicBool,
    overlay: Mutex<Option<WriteOverlay>>,
}

impl PendingBlock {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn begin(&self) -> StorageResult<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(StorageError::TransactionAlreadyActive);
        }
        *self.overlay.lock() = Some(WriteOverlay::default());
        Ok(())
    }

    /// Take the buffered writes and end the transaction
    pub fn take(&self) -> StorageResult<WriteOverlay> {
        let overlay = self
            .overlay
            .lock()
            .take()
            .ok_or(StorageError::NoActiveTransaction)?;
        self.active.store(false, Ordering::SeqCst);
        Ok(overlay)
    }

    /// Drop the buffered writes and end the transaction
    pub fn discard(&self) -> StorageResult<()> {
        self.take().map(drop)
    }

    pub fn put(&self, tree: Tree, key: &[u8], value: &[u8]) -> StorageResult<()> {
        match self.overlay.lock().as_mut() {
            Some(overlay) => {
                overlay.put(tree, key, value);
                Ok(())
            }
            None => Err(StorageError::NoActiveTransaction),
        }
    }

    pub fn delete(&self, tree: Tree, key: &[u8]) -> StorageResult<()> {
        match self.overlay.lock().as_mut() {
            Some(overlay) => {
                overlay.delete(tree, key);
                Ok(())
            }
            None => Err(StorageError::NoActiveTransaction),
        }
    }

    pub fn get(&self, tree: Tree, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.overlay.lock().as_ref()?.get(tree, key)
    }

    pub fn merge_prefix(
        &self,
        tree: Tree,
        prefix: &[u8],
        committed: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        match self.overlay.lock().as_ref() {
            Some(overlay) => overlay.merge_prefix(tree, prefix, committed),
            None => committed,
        }
    }
}
