//! Hash type: field -> value maps.

use super::{internal_key, DataType, KeyKind, Structure};
use crate::error::Result;

impl Structure {
    /// Sets `field` to `value`. Returns true if the field is new.
    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut meta = self.find_meta(key, DataType::Hash)?;
        let field_key = internal_key(KeyKind::HashField, key, meta.version, field);
        let is_new = self.db.get(&field_key)?.is_none();

        let batch = self.new_batch()?;
        if is_new {
            meta.size += 1;
            batch.put(key, &meta.encode()?)?;
        }
        batch.put(&field_key, value)?;
        batch.commit()?;

        Ok(is_new)
    }

    /// Reads a field.
    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.live_meta(key, DataType::Hash)? {
            Some(meta) => self.db.get(&internal_key(KeyKind::HashField, key, meta.version, field)),
            None => Ok(None),
        }
    }

    /// Removes a field. Returns true if it existed.
    pub fn hdel(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut meta = match self.live_meta(key, DataType::Hash)? {
            Some(meta) => meta,
            None => return Ok(false),
        };
        let field_key = internal_key(KeyKind::HashField, key, meta.version, field);
        if self.db.get(&field_key)?.is_none() {
            return Ok(false);
        }

        let batch = self.new_batch()?;
        meta.size -= 1;
        self.stage_meta(&batch, key, &meta)?;
        batch.delete(&field_key)?;
        batch.commit()?;

        Ok(true)
    }

    /// Returns whether `field` is set.
    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        Ok(self.hget(key, field)?.is_some())
    }

    /// Number of fields.
    pub fn hlen(&self, key: &[u8]) -> Result<u32> {
        Ok(self.live_meta(key, DataType::Hash)?.map_or(0, |meta| meta.size))
    }

    /// All fields and values, ordered by field.
    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match self.live_meta(key, DataType::Hash)? {
            Some(meta) => {
                self.scan_prefix(&internal_key(KeyKind::HashField, key, meta.version, b""))
            }
            None => Ok(Vec::new()),
        }
    }
}
