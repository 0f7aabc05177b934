//! Configuration options for the CaskDb storage engine.

use serde::{Deserialize, Serialize};

/// Configuration options for opening a database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Create the database directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Error if the database directory already exists.
    /// Default: false
    pub error_if_exists: bool,

    /// Size threshold at which the active data file is rotated (in bytes).
    /// Default: 256MB
    pub data_file_size: u64,

    /// Sync the active data file after every write.
    /// Default: false
    pub sync_writes: bool,

    /// Sync once this many bytes have been written since the last sync.
    /// Set to 0 to disable.
    /// Default: 0
    pub bytes_per_sync: usize,

    /// In-memory index backend.
    /// Default: IndexType::BTree
    pub index_type: IndexType,

    /// Ratio of reclaimable bytes to total disk size at which
    /// `DB::maybe_merge` starts a merge.
    /// Default: 0.5
    pub merge_ratio: f32,

    /// Maximum number of records a write batch may hold.
    /// Default: 10000
    pub max_batch_num: usize,

    /// Sync the active data file when a write batch commits.
    /// Default: true
    pub batch_sync: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            data_file_size: 256 * 1024 * 1024, // 256MB
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BTree,
            merge_ratio: 0.5,
            max_batch_num: 10000,
            batch_sync: true,
        }
    }
}

/// In-memory index backends supported by CaskDb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexType {
    /// Ordered map guarded by a reader/writer lock.
    #[default]
    BTree,

    /// Lock-free concurrent skip list.
    SkipList,

    /// Hash table; iteration sorts a snapshot of the keys.
    Hash,
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Sets whether to create the database if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the data file rotation threshold.
    pub fn data_file_size(mut self, size: u64) -> Self {
        self.data_file_size = size;
        self
    }

    /// Enables or disables syncing after every write.
    pub fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets the number of unsynced bytes that triggers a sync.
    pub fn bytes_per_sync(mut self, bytes: usize) -> Self {
        self.bytes_per_sync = bytes;
        self
    }

    /// Sets the index backend.
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    /// Sets the merge trigger ratio.
    pub fn merge_ratio(mut self, ratio: f32) -> Self {
        self.merge_ratio = ratio;
        self
    }

    /// Sets the maximum number of records in a write batch.
    pub fn max_batch_num(mut self, num: usize) -> Self {
        self.max_batch_num = num;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.data_file_size == 0 {
            return Err(crate::Error::invalid_argument("data_file_size must be > 0"));
        }
        if self.max_batch_num == 0 {
            return Err(crate::Error::invalid_argument("max_batch_num must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.merge_ratio) {
            return Err(crate::Error::invalid_argument("merge_ratio must be between 0 and 1"));
        }
        Ok(())
    }
}

/// Options for iterating over the database.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only visit keys starting with this prefix. Empty means all keys.
    pub prefix: Vec<u8>,

    /// Visit keys in descending order.
    pub reverse: bool,
}

impl IteratorOptions {
    /// Restricts iteration to keys with the given prefix.
    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    /// Sets descending iteration.
    pub fn reverse(mut self, value: bool) -> Self {
        self.reverse = value;
        self
    }
}

/// Options for a single write batch.
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of records the batch may hold.
    pub max_batch_num: usize,

    /// Sync the data file when the batch commits.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self { max_batch_num: 10000, sync_writes: true }
    }
}

impl From<&Options> for WriteBatchOptions {
    fn from(options: &Options) -> Self {
        Self { max_batch_num: options.max_batch_num, sync_writes: options.batch_sync }
    }
}
