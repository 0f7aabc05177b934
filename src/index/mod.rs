//! In-memory index from user keys to record positions.
//!
//! The index holds one entry per live key and is rebuilt at startup, either
//! by replaying the data files or by loading the hint file left by a merge.
//! Every backend treats keys as opaque bytes compared lexicographically and
//! is internally synchronized, so the storage core can share it across
//! threads without holding its own lock for lookups.

pub mod btree;
pub mod hash;
pub mod skiplist;

pub use btree::BTreeIndex;
pub use hash::HashIndex;
pub use skiplist::SkipListIndex;

use crate::config::{IndexType, IteratorOptions};
use crate::data::LogRecordPos;

/// Common contract of every index backend.
pub trait Indexer: Send + Sync {
    /// Insert or replace the position of `key`, returning the previous one.
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos>;

    /// Look up the position of `key`.
    fn get(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Remove `key`, returning the position it had.
    fn delete(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Number of keys in the index.
    fn size(&self) -> usize;

    /// All keys in ascending order.
    fn list_keys(&self) -> Vec<Vec<u8>>;

    /// Iterator over a point-in-time snapshot of the index.
    fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator>;
}

/// Ordered cursor over index entries.
pub trait IndexIterator: Send + Sync {
    /// Go back to the first entry.
    fn rewind(&mut self);

    /// Position at the first entry >= `key` (<= `key` when reversed).
    fn seek(&mut self, key: &[u8]);

    /// Yield the next entry.
    fn next(&mut self) -> Option<(&[u8], &LogRecordPos)>;
}

/// Build the index backend selected in the options.
pub fn new_indexer(index_type: IndexType) -> Box<dyn Indexer> {
    match index_type {
        IndexType::BTree => Box::new(BTreeIndex::new()),
        IndexType::SkipList => Box::new(SkipListIndex::new()),
        IndexType::Hash => Box::new(HashIndex::new()),
    }
}

/// Iterator over entries copied out of a backend in ascending key order.
pub(crate) struct SnapshotIterator {
    items: Vec<(Vec<u8>, LogRecordPos)>,
    curr_index: usize,
    reverse: bool,
}

impl SnapshotIterator {
    /// `items` must be sorted ascending and already filtered by prefix.
    pub(crate) fn new(mut items: Vec<(Vec<u8>, LogRecordPos)>, reverse: bool) -> Self {
        if reverse {
            items.reverse();
        }
        Self { items, curr_index: 0, reverse }
    }
}

impl IndexIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.curr_index = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.curr_index = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) -> Option<(&[u8], &LogRecordPos)> {
        let (key, pos) = self.items.get(self.curr_index)?;
        self.curr_index += 1;
        Some((key.as_slice(), pos))
    }
}
