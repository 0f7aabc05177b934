//! Hash table index.
//!
//! Point operations are O(1). The table has no order of its own, so
//! iteration and key listing sort a snapshot to match the ordered backends.

use super::{IndexIterator, Indexer, SnapshotIterator};
use crate::config::IteratorOptions;
use crate::data::LogRecordPos;
use parking_lot::RwLock;
use std::collections::HashMap;

/// `HashMap` index guarded by a reader/writer lock.
#[derive(Default)]
pub struct HashIndex {
    table: RwLock<HashMap<Vec<u8>, LogRecordPos>>,
}

impl HashIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for HashIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        self.table.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.table.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.table.write().remove(key)
    }

    fn size(&self) -> usize {
        self.table.read().len()
    }

    fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<_> = self.table.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
        let mut items: Vec<_> = self
            .table
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(&options.prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        items.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Box::new(SnapshotIterator::new(items, options.reverse))
    }
}
