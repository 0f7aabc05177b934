//! Sorted-set type.
//!
//! Each member is stored twice: member -> score for lookups, and an empty
//! value under `score ++ member` so members can be walked in score order.

use super::{internal_key, DataType, KeyKind, Structure};
use crate::error::{Error, Result};
use crate::util::coding::{decode_f64_ordered, encode_f64_ordered};

fn score_key(key: &[u8], version: i64, score: f64, member: &[u8]) -> Vec<u8> {
    let mut sub = Vec::with_capacity(8 + member.len());
    sub.extend_from_slice(&encode_f64_ordered(score));
    sub.extend_from_slice(member);
    internal_key(KeyKind::ZSetScore, key, version, &sub)
}

fn decode_score(raw: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| Error::corruption(format!("Score of {} bytes", raw.len())))?;
    Ok(f64::from_be_bytes(bytes))
}

impl Structure {
    /// Adds a member or updates its score. Returns true if the member is new.
    pub fn zadd(&self, key: &[u8], score: f64, member: &[u8]) -> Result<bool> {
        if score.is_nan() {
            return Err(Error::invalid_argument("score is not a number"));
        }
        // -0.0 would sort below 0.0 in the score keys
        let score = if score == 0.0 { 0.0 } else { score };

        let _guard = self.write_lock.lock();
        let mut meta = self.find_meta(key, DataType::ZSet)?;
        let member_key = internal_key(KeyKind::ZSetMember, key, meta.version, member);
        let old_score = match self.db.get(&member_key)? {
            Some(raw) => Some(decode_score(&raw)?),
            None => None,
        };
        if old_score == Some(score) {
            return Ok(false);
        }

        let batch = self.new_batch()?;
        match old_score {
            Some(old) => batch.delete(&score_key(key, meta.version, old, member))?,
            None => {
                meta.size += 1;
                batch.put(key, &meta.encode()?)?;
            }
        }
        batch.put(&member_key, &score.to_be_bytes())?;
        batch.put(&score_key(key, meta.version, score, member), &[])?;
        batch.commit()?;

        Ok(old_score.is_none())
    }

    /// Score of `member`.
    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        let Some(meta) = self.live_meta(key, DataType::ZSet)? else {
            return Ok(None);
        };
        match self.db.get(&internal_key(KeyKind::ZSetMember, key, meta.version, member))? {
            Some(raw) => Ok(Some(decode_score(&raw)?)),
            None => Ok(None),
        }
    }

    /// Removes a member. Returns true if it was present.
    pub fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let Some(mut meta) = self.live_meta(key, DataType::ZSet)? else {
            return Ok(false);
        };
        let member_key = internal_key(KeyKind::ZSetMember, key, meta.version, member);
        let score = match self.db.get(&member_key)? {
            Some(raw) => decode_score(&raw)?,
            None => return Ok(false),
        };

        let batch = self.new_batch()?;
        meta.size -= 1;
        self.stage_meta(&batch, key, &meta)?;
        batch.delete(&member_key)?;
        batch.delete(&score_key(key, meta.version, score, member))?;
        batch.commit()?;

        Ok(true)
    }

    /// Number of members.
    pub fn zcard(&self, key: &[u8]) -> Result<u32> {
        Ok(self.live_meta(key, DataType::ZSet)?.map_or(0, |meta| meta.size))
    }

    /// Members with `min <= score <= max`, lowest score first. Ties are
    /// ordered by member bytes.
    pub fn zrange_by_score(&self, key: &[u8], min: f64, max: f64) -> Result<Vec<(Vec<u8>, f64)>> {
        let Some(meta) = self.live_meta(key, DataType::ZSet)? else {
            return Ok(Vec::new());
        };

        let prefix = internal_key(KeyKind::ZSetScore, key, meta.version, b"");
        let mut start = prefix.clone();
        start.extend_from_slice(&encode_f64_ordered(min));

        let mut iter = self.db.iter(crate::IteratorOptions::default().prefix(&prefix));
        iter.seek(&start);

        let mut members = Vec::new();
        for entry in iter {
            let (internal, _) = entry?;
            let sub = &internal[prefix.len()..];
            let (score_bytes, member) = sub
                .split_first_chunk::<8>()
                .ok_or_else(|| Error::corruption("Truncated sorted-set score key"))?;
            let score = decode_f64_ordered(*score_bytes);
            if score > max {
                break;
            }
            members.push((member.to_vec(), score));
        }
        Ok(members)
    }
}
