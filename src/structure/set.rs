//! Set type.

use super::{internal_key, DataType, KeyKind, Structure};
use crate::error::Result;

impl Structure {
    /// Adds a member. Returns true if it was not already present.
    pub fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut meta = self.find_meta(key, DataType::Set)?;
        let member_key = internal_key(KeyKind::SetMember, key, meta.version, member);
        if self.db.get(&member_key)?.is_some() {
            return Ok(false);
        }

        let batch = self.new_batch()?;
        meta.size += 1;
        batch.put(key, &meta.encode()?)?;
        batch.put(&member_key, &[])?;
        batch.commit()?;

        Ok(true)
    }

    /// Removes a member. Returns true if it was present.
    pub fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let Some(mut meta) = self.live_meta(key, DataType::Set)? else {
            return Ok(false);
        };
        let member_key = internal_key(KeyKind::SetMember, key, meta.version, member);
        if self.db.get(&member_key)?.is_none() {
            return Ok(false);
        }

        let batch = self.new_batch()?;
        meta.size -= 1;
        self.stage_meta(&batch, key, &meta)?;
        batch.delete(&member_key)?;
        batch.commit()?;

        Ok(true)
    }

    /// Returns whether `member` is in the set.
    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        match self.live_meta(key, DataType::Set)? {
            Some(meta) => Ok(self
                .db
                .get(&internal_key(KeyKind::SetMember, key, meta.version, member))?
                .is_some()),
            None => Ok(false),
        }
    }

    /// Number of members.
    pub fn scard(&self, key: &[u8]) -> Result<u32> {
        Ok(self.live_meta(key, DataType::Set)?.map_or(0, |meta| meta.size))
    }

    /// All members in byte order.
    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let Some(meta) = self.live_meta(key, DataType::Set)? else {
            return Ok(Vec::new());
        };
        let prefix = internal_key(KeyKind::SetMember, key, meta.version, b"");
        Ok(self.scan_prefix(&prefix)?.into_iter().map(|(member, _)| member).collect())
    }
}
