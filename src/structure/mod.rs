//! Hash, set, list and sorted-set types over the flat key space.
//!
//! Each composite value keeps a meta record under its user key. Elements
//! live under internal keys that embed the meta's version, so replacing a
//! value only needs a new meta: the old elements become unreachable and a
//! later merge drops them.
//!
//! Every mutation and the matching meta update go into one write batch.

pub mod hash;
pub mod list;
pub mod set;
pub mod string;
pub mod zset;

use crate::config::WriteBatchOptions;
use crate::error::{Error, Result};
use crate::util::coding::put_varint;
use crate::util::now_nanos;
use crate::{WriteBatch, DB};
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// First head/tail position of a new list; pushes grow in both directions.
pub(crate) const INITIAL_LIST_MARK: u64 = u64::MAX / 2;

/// Type of the value stored under a user key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Plain byte string
    String = 1,
    /// Field -> value map
    Hash = 2,
    /// Unordered member set
    Set = 3,
    /// Double-ended list
    List = 4,
    /// Members ordered by score
    ZSet = 5,
}

impl DataType {
    /// Decode a type tag.
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(DataType::String),
            2 => Ok(DataType::Hash),
            3 => Ok(DataType::Set),
            4 => Ok(DataType::List),
            5 => Ok(DataType::ZSet),
            _ => Err(Error::corruption(format!("Unknown data type tag: {}", tag))),
        }
    }

    /// Lowercase name, as reported by `TYPE`.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Hash => "hash",
            DataType::Set => "set",
            DataType::List => "list",
            DataType::ZSet => "zset",
        }
    }
}

/// Namespaces of internal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum KeyKind {
    HashField = 1,
    SetMember = 2,
    ListElement = 3,
    ZSetMember = 4,
    ZSetScore = 5,
}

/// Metadata of a composite value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Meta {
    pub(crate) data_type: DataType,
    pub(crate) version: i64,
    pub(crate) size: u32,
    pub(crate) head: u64,
    pub(crate) tail: u64,
    pub(crate) expire: i64,
}

impl Meta {
    fn new(data_type: DataType, version: i64) -> Self {
        let (head, tail) = match data_type {
            DataType::List => (INITIAL_LIST_MARK, INITIAL_LIST_MARK),
            _ => (0, 0),
        };
        Self { data_type, version, size: 0, head, tail, expire: 0 }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![self.data_type as u8];
        buf.extend(bincode::serialize(self)?);
        Ok(buf)
    }

    fn decode(data_type: DataType, body: &[u8]) -> Result<Self> {
        let meta: Meta = bincode::deserialize(body)?;
        if meta.data_type != data_type {
            return Err(Error::corruption("Meta record type tag disagrees with its body"));
        }
        Ok(meta)
    }
}

/// A decoded user-key value.
pub(crate) enum Stored {
    Str { expire: i64, value: Vec<u8> },
    Composite(Meta),
}

impl Stored {
    fn decode(raw: &[u8]) -> Result<Self> {
        let (&tag, body) =
            raw.split_first().ok_or_else(|| Error::corruption("Empty value record"))?;
        match DataType::from_u8(tag)? {
            DataType::String => {
                let (expire, value) = body
                    .split_first_chunk::<8>()
                    .ok_or_else(|| Error::corruption("Truncated string value"))?;
                Ok(Stored::Str { expire: i64::from_le_bytes(*expire), value: value.to_vec() })
            }
            data_type => Ok(Stored::Composite(Meta::decode(data_type, body)?)),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            Stored::Str { .. } => DataType::String,
            Stored::Composite(meta) => meta.data_type,
        }
    }

    fn expire(&self) -> i64 {
        match self {
            Stored::Str { expire, .. } => *expire,
            Stored::Composite(meta) => meta.expire,
        }
    }

    fn is_expired(&self) -> bool {
        is_expired(self.expire())
    }
}

pub(crate) fn encode_string(expire: i64, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + value.len());
    buf.push(DataType::String as u8);
    buf.extend_from_slice(&expire.to_le_bytes());
    buf.extend_from_slice(value);
    buf
}

fn is_expired(expire: i64) -> bool {
    expire > 0 && expire <= now_nanos()
}

/// `[kind] ++ varint(len key) ++ key ++ version BE ++ sub`
pub(crate) fn internal_key(kind: KeyKind, key: &[u8], version: i64, sub: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + 5 + key.len() + 8 + sub.len());
    buf.put_u8(kind as u8);
    put_varint(&mut buf, key.len() as u64);
    buf.put_slice(key);
    buf.put_u64(version as u64);
    buf.put_slice(sub);
    buf.to_vec()
}

/// Redis-like data structures stored in a [`DB`].
///
/// # Example
///
/// ```rust,no_run
/// use caskdb::{DB, Options, Structure};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), caskdb::Error> {
/// let db = Arc::new(DB::open("./data", Options::default())?);
/// let structure = Structure::new(db);
///
/// structure.hset(b"user:1", b"name", b"alice")?;
/// structure.rpush(b"queue", b"job-1")?;
/// structure.zadd(b"scores", 42.0, b"alice")?;
/// # Ok(())
/// # }
/// ```
pub struct Structure {
    db: Arc<DB>,
    write_lock: Mutex<()>,
    last_version: AtomicI64,
}

impl Structure {
    /// Wraps a database.
    pub fn new(db: Arc<DB>) -> Self {
        Self { db, write_lock: Mutex::new(()), last_version: AtomicI64::new(0) }
    }

    /// The underlying database.
    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }

    /// Current time in nanoseconds, bumped past every version handed out
    /// before and past `floor`.
    fn next_version(&self, floor: i64) -> i64 {
        let candidate = now_nanos().max(floor + 1);
        let previous = self
            .last_version
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or(candidate);
        candidate.max(previous + 1)
    }

    pub(crate) fn read_stored(&self, key: &[u8]) -> Result<Option<Stored>> {
        match self.db.get(key)? {
            Some(raw) => Ok(Some(Stored::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Meta of a live value of `data_type`, or `None` if the key is missing
    /// or expired.
    pub(crate) fn live_meta(&self, key: &[u8], data_type: DataType) -> Result<Option<Meta>> {
        match self.read_stored(key)? {
            None => Ok(None),
            Some(stored) if stored.is_expired() => Ok(None),
            Some(Stored::Composite(meta)) if meta.data_type == data_type => Ok(Some(meta)),
            Some(stored) => Err(wrong_type(data_type, stored.data_type())),
        }
    }

    /// Like [`Self::live_meta`], but a missing or expired key gets a fresh
    /// meta with a new version.
    pub(crate) fn find_meta(&self, key: &[u8], data_type: DataType) -> Result<Meta> {
        let floor = match self.read_stored(key)? {
            None => 0,
            Some(stored) if stored.is_expired() => match stored {
                Stored::Composite(meta) => meta.version,
                Stored::Str { .. } => 0,
            },
            Some(Stored::Composite(meta)) if meta.data_type == data_type => return Ok(meta),
            Some(stored) => return Err(wrong_type(data_type, stored.data_type())),
        };
        Ok(Meta::new(data_type, self.next_version(floor)))
    }

    pub(crate) fn new_batch(&self) -> Result<WriteBatch<'_>> {
        self.db.new_write_batch(WriteBatchOptions::from(self.db.options()))
    }

    /// Stages the meta update; an emptied value loses its meta entirely.
    pub(crate) fn stage_meta(&self, batch: &WriteBatch<'_>, key: &[u8], meta: &Meta) -> Result<()> {
        if meta.size == 0 {
            batch.delete(key)
        } else {
            batch.put(key, &meta.encode()?)
        }
    }

    /// Keys and values under `prefix`, with the prefix stripped from each key.
    pub(crate) fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for entry in self.db.iter(crate::IteratorOptions::default().prefix(prefix)) {
            let (key, value) = entry?;
            entries.push((key[prefix.len()..].to_vec(), value));
        }
        Ok(entries)
    }
}

fn wrong_type(expected: DataType, actual: DataType) -> Error {
    Error::WrongType { expected: expected.name(), actual: actual.name() }
}
