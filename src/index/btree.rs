//! Ordered index backed by a `BTreeMap`.

use super::{IndexIterator, Indexer, SnapshotIterator};
use crate::config::IteratorOptions;
use crate::data::LogRecordPos;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// `BTreeMap` index guarded by a reader/writer lock.
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        self.tree.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.write().remove(key)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn list_keys(&self) -> Vec<Vec<u8>> {
        self.tree.read().keys().cloned().collect()
    }

    fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
        let tree = self.tree.read();
        let items = tree
            .range(options.prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&options.prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Box::new(SnapshotIterator::new(items, options.reverse))
    }
}
