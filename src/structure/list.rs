//! List type.
//!
//! Elements sit at consecutive indices in `head..tail`. Pushes and pops move
//! one end of the range; nothing is ever shifted.

use super::{internal_key, DataType, KeyKind, Meta, Structure};
use crate::error::{Error, Result};

fn element_key(key: &[u8], meta: &Meta, index: u64) -> Vec<u8> {
    internal_key(KeyKind::ListElement, key, meta.version, &index.to_be_bytes())
}

impl Structure {
    /// Pushes onto the head. Returns the new length.
    pub fn lpush(&self, key: &[u8], value: &[u8]) -> Result<u32> {
        self.push(key, value, true)
    }

    /// Pushes onto the tail. Returns the new length.
    pub fn rpush(&self, key: &[u8], value: &[u8]) -> Result<u32> {
        self.push(key, value, false)
    }

    /// Pops from the head.
    pub fn lpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.pop(key, true)
    }

    /// Pops from the tail.
    pub fn rpop(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.pop(key, false)
    }

    /// Number of elements.
    pub fn llen(&self, key: &[u8]) -> Result<u32> {
        Ok(self.live_meta(key, DataType::List)?.map_or(0, |meta| meta.size))
    }

    /// Element at `index`; negative indices count from the tail.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
        let Some(meta) = self.live_meta(key, DataType::List)? else {
            return Ok(None);
        };

        let len = meta.size as i64;
        let offset = if index < 0 { len + index } else { index };
        if offset < 0 || offset >= len {
            return Ok(None);
        }
        self.db.get(&element_key(key, &meta, meta.head + offset as u64))
    }

    fn push(&self, key: &[u8], value: &[u8], left: bool) -> Result<u32> {
        let _guard = self.write_lock.lock();
        let mut meta = self.find_meta(key, DataType::List)?;

        let index = if left { meta.head - 1 } else { meta.tail };
        let batch = self.new_batch()?;
        batch.put(&element_key(key, &meta, index), value)?;

        meta.size += 1;
        if left {
            meta.head -= 1;
        } else {
            meta.tail += 1;
        }
        batch.put(key, &meta.encode()?)?;
        batch.commit()?;

        Ok(meta.size)
    }

    fn pop(&self, key: &[u8], left: bool) -> Result<Option<Vec<u8>>> {
        let _guard = self.write_lock.lock();
        let Some(mut meta) = self.live_meta(key, DataType::List)? else {
            return Ok(None);
        };

        let index = if left { meta.head } else { meta.tail - 1 };
        let element = element_key(key, &meta, index);
        let value = self.db.get(&element)?.ok_or_else(|| {
            Error::corruption(format!("List element {} missing for live meta", index))
        })?;

        let batch = self.new_batch()?;
        batch.delete(&element)?;
        meta.size -= 1;
        if left {
            meta.head += 1;
        } else {
            meta.tail -= 1;
        }
        self.stage_meta(&batch, key, &meta)?;
        batch.commit()?;

        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::open_structure;

    #[test]
    fn test_push_pop_both_ends() {
        let (_dir, s) = open_structure();

        assert_eq!(s.rpush(b"l", b"b").unwrap(), 1);
        assert_eq!(s.rpush(b"l", b"c").unwrap(), 2);
        assert_eq!(s.lpush(b"l", b"a").unwrap(), 3);
        assert_eq!(s.llen(b"l").unwrap(), 3);

        assert_eq!(s.lpop(b"l").unwrap(), Some(b"a".to_vec()));
        assert_eq!(s.rpop(b"l").unwrap(), Some(b"c".to_vec()));
        assert_eq!(s.rpop(b"l").unwrap(), Some(b"b".to_vec()));
        assert_eq!(s.rpop(b"l").unwrap(), None);
        assert_eq!(s.llen(b"l").unwrap(), 0);
        assert_eq!(s.key_type(b"l").unwrap(), None);
    }

    #[test]
    fn test_lindex() {
        let (_dir, s) = open_structure();
        for v in ["x", "y", "z"] {
            s.rpush(b"l", v.as_bytes()).unwrap();
        }

        assert_eq!(s.lindex(b"l", 0).unwrap(), Some(b"x".to_vec()));
        assert_eq!(s.lindex(b"l", 2).unwrap(), Some(b"z".to_vec()));
        assert_eq!(s.lindex(b"l", -1).unwrap(), Some(b"z".to_vec()));
        assert_eq!(s.lindex(b"l", -3).unwrap(), Some(b"x".to_vec()));
        assert_eq!(s.lindex(b"l", 3).unwrap(), None);
        assert_eq!(s.lindex(b"l", -4).unwrap(), None);
        assert_eq!(s.lindex(b"missing", 0).unwrap(), None);
    }

    #[test]
    fn test_list_as_queue() {
        let (_dir, s) = open_structure();
        for i in 0..50 {
            s.lpush(b"q", format!("job{}", i).as_bytes()).unwrap();
        }
        for i in 0..50 {
            assert_eq!(s.rpop(b"q").unwrap(), Some(format!("job{}", i).into_bytes()));
        }
        assert_eq!(s.rpop(b"q").unwrap(), None);
    }
}
