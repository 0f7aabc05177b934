//! Log record format implementation.
//!
//! Each record consists of:
//! - Checksum (4 bytes): CRC32 of everything that follows it
//! - Type (1 byte): Normal, Deleted or BatchFinished
//! - Key length (varint)
//! - Value length (varint)
//! - Key (variable)
//! - Value (variable)

use crate::error::{Error, Result};
use crate::util::coding::{get_varint, get_varint32, put_varint, MAX_VARINT32_LEN};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

/// Size of the fixed part of the header (checksum + type)
pub const FIXED_HEADER_SIZE: usize = 5;

/// Largest possible header: checksum, type and two varint32 lengths
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = FIXED_HEADER_SIZE + MAX_VARINT32_LEN * 2;

/// Sequence number carried by writes that are not part of a batch
pub const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// Key of the record that closes a committed write batch
pub const BATCH_FINISHED_KEY: &[u8] = b"batch.finished";

/// Record types stored in data files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live key-value pair
    Normal = 1,
    /// A tombstone
    Deleted = 2,
    /// Marks every record of its batch as committed
    BatchFinished = 3,
}

impl LogRecordType {
    /// Convert from u8 to LogRecordType
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(LogRecordType::Normal),
            2 => Ok(LogRecordType::Deleted),
            3 => Ok(LogRecordType::BatchFinished),
            _ => Err(Error::Corruption(format!("Invalid log record type: {}", value))),
        }
    }
}

/// A single entry of the append-only log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Key as stored on disk (sequence prefix included)
    pub key: Vec<u8>,
    /// Value payload
    pub value: Vec<u8>,
    /// Type of the record
    pub rec_type: LogRecordType,
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordHeader {
    /// Stored checksum
    pub crc: u32,
    /// Raw type byte
    pub rec_type: u8,
    /// Length of the key
    pub key_size: u32,
    /// Length of the value
    pub value_size: u32,
}

impl LogRecordHeader {
    /// A pre-allocated but never written tail reads back as all zeroes.
    pub fn is_end_of_log(&self) -> bool {
        self.crc == 0 && self.rec_type == 0 && self.key_size == 0 && self.value_size == 0
    }
}

/// Outcome of decoding a record from a byte slice.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, checksum-verified record and the number of bytes it used
    Record(LogRecord, usize),
    /// The slice starts with an all-zero header
    EndOfLog,
    /// The slice holds fewer bytes than the header declares
    Incomplete,
}

/// Location of a record on disk. This is the only value stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogRecordPos {
    /// Data file that holds the record
    pub file_id: u32,
    /// Byte offset of the record inside the file
    pub offset: u64,
    /// Encoded length of the record
    pub size: u32,
}

impl LogRecord {
    /// Create a new record
    pub fn new(key: Vec<u8>, value: Vec<u8>, rec_type: LogRecordType) -> Self {
        Self { key, value, rec_type }
    }

    /// Create a normal key-value record
    pub fn normal(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self::new(key, value, LogRecordType::Normal)
    }

    /// Create a tombstone
    pub fn deleted(key: Vec<u8>) -> Self {
        Self::new(key, Vec::new(), LogRecordType::Deleted)
    }

    /// Encode the record into bytes
    ///
    /// Format: [crc: u32][type: u8][key_len: varint][value_len: varint][key][value]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());

        // Reserve space for checksum (will be filled later)
        buf.put_u32_le(0);
        buf.put_u8(self.rec_type as u8);
        put_varint(&mut buf, self.key.len() as u64);
        put_varint(&mut buf, self.value.len() as u64);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        let checksum = Self::calculate_checksum(&buf[4..]);
        let mut result = buf.to_vec();
        result[0..4].copy_from_slice(&checksum.to_le_bytes());

        result
    }

    /// Decode a record from the start of `data`.
    ///
    /// Returns `Err` when the checksum disagrees or the type byte is unknown.
    pub fn decode(data: &[u8]) -> Result<Decoded> {
        let (header, header_size) = match decode_header(data) {
            Some(decoded) => decoded,
            None => return Ok(Decoded::Incomplete),
        };

        if header.is_end_of_log() {
            return Ok(Decoded::EndOfLog);
        }

        let rec_type = LogRecordType::from_u8(header.rec_type)?;
        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let total = header_size + key_size + value_size;
        if data.len() < total {
            return Ok(Decoded::Incomplete);
        }

        let actual = Self::calculate_checksum(&data[4..total]);
        if actual != header.crc {
            return Err(Error::ChecksumMismatch { expected: header.crc, actual });
        }

        let key = data[header_size..header_size + key_size].to_vec();
        let value = data[header_size + key_size..total].to_vec();

        Ok(Decoded::Record(LogRecord { key, value, rec_type }, total))
    }

    /// Calculate CRC32 checksum over the bytes following the checksum field
    fn calculate_checksum(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Get the total size of the encoded record
    pub fn encoded_size(&self) -> usize {
        FIXED_HEADER_SIZE
            + crate::util::coding::varint_length(self.key.len() as u64)
            + crate::util::coding::varint_length(self.value.len() as u64)
            + self.key.len()
            + self.value.len()
    }
}

/// Decode a record header, returning it with its encoded length.
///
/// Returns None if `data` is too short to hold a header.
pub fn decode_header(mut data: &[u8]) -> Option<(LogRecordHeader, usize)> {
    let available = data.len();
    if available < FIXED_HEADER_SIZE {
        return None;
    }

    let crc = data.get_u32_le();
    let rec_type = data.get_u8();
    let key_size = get_varint32(&mut data)?;
    let value_size = get_varint32(&mut data)?;

    Some((LogRecordHeader { crc, rec_type, key_size, value_size }, available - data.len()))
}

impl LogRecordPos {
    /// Encode the position for the hint file
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, self.file_id as u64);
        put_varint(&mut buf, self.offset);
        put_varint(&mut buf, self.size as u64);
        buf.to_vec()
    }

    /// Decode a position written by [`LogRecordPos::encode`]
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let file_id = get_varint32(&mut data);
        let offset = get_varint(&mut data);
        let size = get_varint32(&mut data);
        match (file_id, offset, size) {
            (Some(file_id), Some(offset), Some(size)) => Ok(Self { file_id, offset, size }),
            _ => Err(Error::corruption("Malformed record position")),
        }
    }
}

/// Prefix a user key with the sequence number of the write that stores it.
pub fn encode_log_record_key(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(key.len() + 4);
    put_varint(&mut buf, seq_no);
    buf.put_slice(key);
    buf.to_vec()
}

/// Split an on-disk key into the user key and its sequence number.
pub fn parse_log_record_key(data: &[u8]) -> Result<(Vec<u8>, u64)> {
    let mut buf = data;
    let seq_no = get_varint(&mut buf)
        .ok_or_else(|| Error::corruption("Missing sequence number in record key"))?;
    Ok((buf.to_vec(), seq_no))
}
