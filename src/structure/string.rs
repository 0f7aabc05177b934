//! String values and key-level commands (expiry, deletion, type).

use super::{encode_string, is_expired, DataType, Stored, Structure};
use crate::error::Result;
use crate::util::now_nanos;
use std::time::Duration;

/// `ttl` result for a key that doesn't exist.
pub const TTL_MISSING: i64 = -2;

/// `ttl` result for a key without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

fn deadline(ttl: Duration) -> i64 {
    now_nanos().saturating_add(i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX))
}

impl Structure {
    /// Stores a string, replacing whatever the key held.
    ///
    /// With `ttl` the key expires after that duration.
    pub fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let expire = ttl.map_or(0, deadline);
        self.db.put(key, &encode_string(expire, value))
    }

    /// Reads a string value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.read_stored(key)? {
            Some(stored) if stored.is_expired() => Ok(None),
            Some(Stored::Str { value, .. }) => Ok(Some(value)),
            Some(stored) => Err(super::wrong_type(DataType::String, stored.data_type())),
            None => Ok(None),
        }
    }

    /// Removes a key of any type. Returns whether a live value was removed.
    pub fn del(&self, key: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        match self.read_stored(key)? {
            Some(stored) => {
                self.db.delete(key)?;
                Ok(!stored.is_expired())
            }
            None => Ok(false),
        }
    }

    /// Returns whether the key holds a live value.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.key_type(key)?.is_some())
    }

    /// Type of the live value under `key`.
    pub fn key_type(&self, key: &[u8]) -> Result<Option<DataType>> {
        match self.read_stored(key)? {
            Some(stored) if !stored.is_expired() => Ok(Some(stored.data_type())),
            _ => Ok(None),
        }
    }

    /// Sets the key to expire after `ttl`. Returns false if it doesn't exist.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.rewrite_expire(key, deadline(ttl)).map(|old| old.is_some())
    }

    /// Clears the key's expiry. Returns true if it had one.
    pub fn persist(&self, key: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.rewrite_expire(key, 0).map(|old| old.is_some_and(|expire| expire > 0))
    }

    /// Remaining time to live in milliseconds, [`TTL_PERSISTENT`] for a key
    /// without expiry or [`TTL_MISSING`] for a missing key.
    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        match self.read_stored(key)? {
            Some(stored) if !stored.is_expired() => match stored.expire() {
                0 => Ok(TTL_PERSISTENT),
                expire => Ok((expire - now_nanos()).max(0) / 1_000_000),
            },
            _ => Ok(TTL_MISSING),
        }
    }

    /// Rewrites the expiry of a live key, returning the previous one.
    fn rewrite_expire(&self, key: &[u8], expire: i64) -> Result<Option<i64>> {
        let stored = match self.read_stored(key)? {
            Some(stored) if !is_expired(stored.expire()) => stored,
            _ => return Ok(None),
        };

        let previous = stored.expire();
        match stored {
            Stored::Str { value, .. } => self.db.put(key, &encode_string(expire, &value))?,
            Stored::Composite(mut meta) => {
                meta.expire = expire;
                self.db.put(key, &meta.encode()?)?;
            }
        }
        Ok(Some(previous))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::open_structure;
    use super::*;
    use crate::Error;
    use std::thread;

    #[test]
    fn test_set_get_del() {
        let (_dir, s) = open_structure();

        s.set(b"k", b"v", None).unwrap();
        assert_eq!(s.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(s.key_type(b"k").unwrap(), Some(DataType::String));

        assert!(s.del(b"k").unwrap());
        assert!(!s.del(b"k").unwrap());
        assert_eq!(s.get(b"k").unwrap(), None);
        assert!(!s.exists(b"k").unwrap());
    }

    #[test]
    fn test_set_replaces_other_types() {
        let (_dir, s) = open_structure();
        s.hset(b"k", b"f", b"v").unwrap();
        assert!(matches!(s.get(b"k"), Err(Error::WrongType { .. })));

        s.set(b"k", b"plain", None).unwrap();
        assert_eq!(s.get(b"k").unwrap(), Some(b"plain".to_vec()));
    }

    #[test]
    fn test_string_expiry() {
        let (_dir, s) = open_structure();

        s.set(b"short", b"v", Some(Duration::from_millis(20))).unwrap();
        s.set(b"long", b"v", Some(Duration::from_secs(3600))).unwrap();
        assert_eq!(s.get(b"short").unwrap(), Some(b"v".to_vec()));

        thread::sleep(Duration::from_millis(40));
        assert_eq!(s.get(b"short").unwrap(), None);
        assert_eq!(s.ttl(b"short").unwrap(), TTL_MISSING);
        assert_eq!(s.get(b"long").unwrap(), Some(b"v".to_vec()));
        assert!(s.ttl(b"long").unwrap() > 3_500_000);
    }

    #[test]
    fn test_expire_and_persist() {
        let (_dir, s) = open_structure();
        assert!(!s.expire(b"missing", Duration::from_secs(1)).unwrap());

        s.set(b"k", b"v", None).unwrap();
        assert_eq!(s.ttl(b"k").unwrap(), TTL_PERSISTENT);
        assert!(!s.persist(b"k").unwrap());

        assert!(s.expire(b"k", Duration::from_secs(60)).unwrap());
        let ttl = s.ttl(b"k").unwrap();
        assert!(ttl > 0 && ttl <= 60_000);

        assert!(s.persist(b"k").unwrap());
        assert_eq!(s.ttl(b"k").unwrap(), TTL_PERSISTENT);
        assert_eq!(s.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_expire_composite_value() {
        let (_dir, s) = open_structure();
        s.sadd(b"set", b"a").unwrap();

        assert!(s.expire(b"set", Duration::from_millis(20)).unwrap());
        assert!(s.sismember(b"set", b"a").unwrap());

        thread::sleep(Duration::from_millis(40));
        assert!(!s.sismember(b"set", b"a").unwrap());
        assert_eq!(s.scard(b"set").unwrap(), 0);

        // An expired value is recreated from scratch
        assert!(s.sadd(b"set", b"b").unwrap());
        assert_eq!(s.smembers(b"set").unwrap(), vec![b"b".to_vec()]);
        assert_eq!(s.ttl(b"set").unwrap(), TTL_PERSISTENT);
    }
}
