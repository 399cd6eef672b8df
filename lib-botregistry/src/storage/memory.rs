//! In-memory KvBackend, for tests and light hosts

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::overlay::PendingBlock;
use super::{KvBackend, StorageResult, Tree};

type TreeData = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered maps guarded by a lock, with the same block semantics as sled
#[derive(Debug, Default)]
pub struct MemoryBackend {
    trees: RwLock<BTreeMap<Tree, TreeData>>,
    pending: PendingBlock,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, tree: Tree, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(tree, key) {
            return Ok(pending);
        }
        Ok(self
            .trees
            .read()
            .get(&tree)
            .and_then(|data| data.get(key))
            .cloned())
    }

    fn scan_prefix(&self, tree: Tree, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let committed = match self.trees.read().get(&tree) {
            Some(data) => data
                .range(prefix.to_vec()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        };
        Ok(self.pending.merge_prefix(tree, prefix, committed))
    }

    fn put(&self, tree: Tree, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.pending.put(tree, key, value)
    }

    fn delete(&self, tree: Tree, key: &[u8]) -> StorageResult<()> {
        self.pending.delete(tree, key)
    }

    fn begin_block(&self) -> StorageResult<()> {
        self.pending.begin()
    }

    fn commit_block(&self) -> StorageResult<()> {
        let overlay = self.pending.take()?;
        let mut trees = self.trees.write();
        for (tree, writes) in overlay.into_trees() {
            let data = trees.entry(tree).or_default();
            for (key, value) in writes {
                match value {
                    Some(value) => {
                        data.insert(key, value);
                    }
                    None => {
                        data.remove(&key);
                    }
                }
            }
            if data.is_empty() {
                trees.remove(&tree);
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_and_rollback() {
        let store = MemoryBackend::new();
        store.begin_block().unwrap();
        store.put(Tree::NameToBotId, b"alice", &[0, 0, 0, 1]).unwrap();
        store.commit_block().unwrap();

        store.begin_block().unwrap();
        store.delete(Tree::NameToBotId, b"alice").unwrap();
        assert_eq!(store.get(Tree::NameToBotId, b"alice").unwrap(), None);
        store.rollback_block().unwrap();

        assert_eq!(
            store.get(Tree::NameToBotId, b"alice").unwrap(),
            Some(vec![0, 0, 0, 1])
        );
    }

    #[test]
    fn test_scan_prefix_is_ordered() {
        let store = MemoryBackend::new();
        store.begin_block().unwrap();
        store.put(Tree::Meta, b"b", b"2").unwrap();
        store.put(Tree::Meta, b"a", b"1").unwrap();
        store.put(Tree::Meta, b"ab", b"3").unwrap();
        store.commit_block().unwrap();

        let keys: Vec<Vec<u8>> = store
            .scan_prefix(Tree::Meta, b"a")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"ab".to_vec()]);
    }
}
