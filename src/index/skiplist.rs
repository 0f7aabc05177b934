//! Ordered index backed by a lock-free skip list.

use super::{IndexIterator, Indexer, SnapshotIterator};
use crate::config::IteratorOptions;
use crate::data::LogRecordPos;
use crossbeam_skiplist::SkipMap;

/// Index over `crossbeam_skiplist::SkipMap`.
///
/// Readers never block; concurrent writers to the same key are ordered by
/// the storage core, which updates the index under its write lock.
#[derive(Default)]
pub struct SkipListIndex {
    map: SkipMap<Vec<u8>, LogRecordPos>,
}

impl SkipListIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for SkipListIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        let previous = self.map.get(&key).map(|entry| *entry.value());
        self.map.insert(key, pos);
        previous
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.map.get(key).map(|entry| *entry.value())
    }

    fn delete(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.map.remove(key).map(|entry| *entry.value())
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn list_keys(&self) -> Vec<Vec<u8>> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
        let items = self
            .map
            .range(options.prefix.clone()..)
            .take_while(|entry| entry.key().starts_with(&options.prefix))
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        Box::new(SnapshotIterator::new(items, options.reverse))
    }
}
