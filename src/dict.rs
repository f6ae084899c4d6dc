// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Out-of-core mutable mapping.
//!
//! Entries are kept in `(hash(key), key)` order across segments, so a lookup
//! dispatches to exactly one segment via binary search over the per-segment
//! minimum pairs. The hash is the xxh3-64 digest of the key's canonical
//! encoding, which makes it stable across processes and restarts.

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    config::resolve_chunk,
    engine::{Engine, EngineIter, SegmentPolicy},
    store::Store,
    Config,
};
use std::cmp::Ordering;
use std::marker::PhantomData;
use xxhash_rust::xxh3::xxh3_64;

/// Default target segment size for dictionaries.
pub const DEFAULT_CHUNK: usize = 4_096;

/// One key-value pair, tagged with the stable key hash it is ordered by.
#[derive(Clone, Debug)]
pub(crate) struct Entry<K, V> {
    pub hash: u64,
    pub key: K,
    pub value: V,
}

impl<K: Encode, V: Encode> Encode for Entry<K, V> {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.hash.encode_into(writer)?;
        self.key.encode_into(writer)?;
        self.value.encode_into(writer)
    }
}

impl<K: Decode, V: Decode> Decode for Entry<K, V> {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let hash = u64::decode_from(reader)?;
        let key = K::decode_from(reader)?;
        let value = V::decode_from(reader)?;
        Ok(Self { hash, key, value })
    }
}

/// Summary key of a dict segment: its smallest `(hash, key)` pair.
#[derive(Clone, Debug)]
pub(crate) struct HashedKey<K> {
    pub hash: u64,
    pub key: K,
}

impl<K: Encode> Encode for HashedKey<K> {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.hash.encode_into(writer)?;
        self.key.encode_into(writer)
    }
}

impl<K: Decode> Decode for HashedKey<K> {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let hash = u64::decode_from(reader)?;
        let key = K::decode_from(reader)?;
        Ok(Self { hash, key })
    }
}

pub(crate) struct DictPolicy<K, V>(PhantomData<(K, V)>);

impl<K, V> SegmentPolicy for DictPolicy<K, V>
where
    K: Encode + Decode + Clone + Ord,
    V: Encode + Decode + Clone,
{
    type Item = Entry<K, V>;
    type Min = HashedKey<K>;

    const KEEPS_MINS: bool = true;

    fn min_of(first: &Self::Item) -> Self::Min {
        HashedKey {
            hash: first.hash,
            key: first.key.clone(),
        }
    }
}

/// A mutable mapping partitioned into on-disk segments keyed by
/// `(hash(k), k)` order.
///
/// At most one entry per key; lookups, insertions and deletions touch a
/// single segment plus the in-memory dispatch vector.
pub struct BigDict<K, V>
where
    K: Encode + Decode + Clone + Ord,
    V: Encode + Decode + Clone,
{
    engine: Engine<DictPolicy<K, V>>,
}

fn hash_key<K: Encode>(key: &K) -> crate::Result<u64> {
    Ok(xxh3_64(&key.encode_to_vec()?))
}

impl<K, V> BigDict<K, V>
where
    K: Encode + Decode + Clone + Ord,
    V: Encode + Decode + Clone,
{
    /// Opens (or creates) a dict at the given root folder.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open<P: AsRef<std::path::Path>>(root: P) -> crate::Result<Self> {
        Config::new(root).open_dict()
    }

    pub(crate) fn open_with(config: Config) -> crate::Result<Self> {
        config.validate()?;

        if config.roots.len() != 1 {
            return Err(crate::Error::Config("striping is a BigList feature"));
        }

        // NOTE: Checked above
        #[allow(clippy::expect_used)]
        let root = config.roots.first().expect("should have a root");
        std::fs::create_dir_all(root)?;

        let store = Store::new(vec![root.clone()]);
        let chunk = resolve_chunk(&store, DEFAULT_CHUNK, config.chunk_size)?;

        Ok(Self {
            engine: Engine::open(store, chunk, config.cache_capacity)?,
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.len() == 0
    }

    /// Index of the unique segment that may hold `(hash, key)`, or `None` if
    /// the pair precedes every segment minimum.
    fn dispatch(&self, hash: u64, key: &K) -> Option<usize> {
        let mins = &self.engine.mins;

        let mut lo = 0;
        let mut hi = mins.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let min = &mins[mid];

            let le = match min.hash.cmp(&hash).then_with(|| min.key.cmp(key)) {
                Ordering::Greater => false,
                _ => true,
            };

            if le {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        lo.checked_sub(1)
    }

    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn get(&mut self, key: &K) -> crate::Result<Option<V>> {
        if self.engine.len() == 0 {
            return Ok(None);
        }

        let hash = hash_key(key)?;
        let Some(idx) = self.dispatch(hash, key) else {
            return Ok(None);
        };

        let seg = self.engine.seg_mut(idx)?;
        match seg.binary_search_by(|e| e.hash.cmp(&hash).then_with(|| e.key.cmp(key))) {
            Ok(pos) => Ok(Some(seg[pos].value.clone())),
            Err(_) => Ok(None),
        }
    }

    /// Whether `key` is present.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn contains_key(&mut self, key: &K) -> crate::Result<bool> {
        if self.engine.len() == 0 {
            return Ok(false);
        }

        let hash = hash_key(key)?;
        let Some(idx) = self.dispatch(hash, key) else {
            return Ok(false);
        };

        let seg = self.engine.seg_mut(idx)?;
        Ok(seg
            .binary_search_by(|e| e.hash.cmp(&hash).then_with(|| e.key.cmp(key)))
            .is_ok())
    }

    /// Inserts or replaces, returning the previous value if the key was
    /// present.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn insert(&mut self, key: K, value: V) -> crate::Result<Option<V>> {
        let hash = hash_key(&key)?;

        if self.engine.len() == 0 {
            self.engine.mint_segment(0, vec![Entry { hash, key, value }])?;
            return Ok(None);
        }

        let idx = self.dispatch(hash, &key).unwrap_or(0);

        enum Outcome<V> {
            Replaced(V),
            Inserted(usize),
        }

        let outcome = {
            let seg = self.engine.seg_mut(idx)?;
            match seg.binary_search_by(|e| e.hash.cmp(&hash).then_with(|| e.key.cmp(&key))) {
                Ok(pos) => {
                    let old = std::mem::replace(&mut seg[pos].value, value);
                    Outcome::Replaced(old)
                }
                Err(pos) => {
                    seg.insert(pos, Entry { hash, key, value });
                    Outcome::Inserted(pos)
                }
            }
        };

        match outcome {
            Outcome::Replaced(old) => Ok(Some(old)),
            Outcome::Inserted(pos) => {
                self.engine.update_len(idx, 1);
                if pos == 0 {
                    self.engine.refresh_min(idx)?;
                }
                self.engine.rebalance(idx)?;
                Ok(None)
            }
        }
    }

    /// Removes the entry under `key`, returning its value.
    ///
    /// # Errors
    ///
    /// Will return `Err(KeyNotFound)` if the key is absent, or `Err` on IO
    /// errors.
    pub fn remove(&mut self, key: &K) -> crate::Result<V> {
        if self.engine.len() == 0 {
            return Err(crate::Error::KeyNotFound);
        }

        let hash = hash_key(key)?;
        let Some(idx) = self.dispatch(hash, key) else {
            return Err(crate::Error::KeyNotFound);
        };

        let (value, pos) = {
            let seg = self.engine.seg_mut(idx)?;
            match seg.binary_search_by(|e| e.hash.cmp(&hash).then_with(|| e.key.cmp(key))) {
                Ok(pos) => (seg.remove(pos).value, pos),
                Err(_) => return Err(crate::Error::KeyNotFound),
            }
        };

        self.engine.update_len(idx, -1);

        if self.engine.lens[idx] == 0 {
            self.engine.delete_segment(idx)?;
        } else {
            if pos == 0 {
                self.engine.refresh_min(idx)?;
            }
            self.engine.rebalance(idx)?;
        }

        Ok(value)
    }

    /// Iterates over all `(key, value)` pairs, segment by segment.
    ///
    /// Entries come in `(hash(k), k)` order, which is stable but otherwise
    /// arbitrary from the caller's point of view.
    pub fn iter(&mut self) -> impl Iterator<Item = crate::Result<(K, V)>> + '_ {
        let stop = self.engine.len();
        EngineIter::new(&mut self.engine, 0, stop).map(|r| r.map(|e| (e.key, e.value)))
    }

    /// Iterates over all keys.
    pub fn keys(&mut self) -> impl Iterator<Item = crate::Result<K>> + '_ {
        let stop = self.engine.len();
        EngineIter::new(&mut self.engine, 0, stop).map(|r| r.map(|e| e.key))
    }

    /// Iterates over all values.
    pub fn values(&mut self) -> impl Iterator<Item = crate::Result<V>> + '_ {
        let stop = self.engine.len();
        EngineIter::new(&mut self.engine, 0, stop).map(|r| r.map(|e| e.value))
    }

    /// Removes all entries. Segment ids are not reused.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn clear(&mut self) -> crate::Result<()> {
        self.engine.clear()
    }

    /// Flushes resident segments and persists metadata.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn commit(&mut self) -> crate::Result<()> {
        self.engine.commit()
    }

    #[doc(hidden)]
    #[must_use]
    pub fn segment_lens(&self) -> &[usize] {
        &self.engine.lens
    }
}

impl<K, V> Drop for BigDict<K, V>
where
    K: Encode + Decode + Clone + Ord,
    V: Encode + Decode + Clone,
{
    fn drop(&mut self) {
        if let Err(e) = self.engine.commit() {
            log::error!("failed to flush dict on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn dict_key_hash_is_stable() -> crate::Result<()> {
        let a = hash_key(&String::from("hello"))?;
        let b = hash_key(&String::from("hello"))?;
        let c = hash_key(&String::from("world"))?;

        assert_eq!(a, b);
        assert_ne!(a, c);

        Ok(())
    }

    #[test]
    fn dict_segments_stay_ordered_by_hashed_key() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut dict = crate::Config::new(dir.path())
            .chunk_size(8)
            .open_dict::<i64, i64>()?;

        for i in 0..200 {
            dict.insert(i, i)?;
        }

        // Mins strictly increase across segments
        assert!(dict
            .engine
            .mins
            .windows(2)
            .all(|w| (w[0].hash, &w[0].key) < (w[1].hash, &w[1].key)));

        // Every entry lands in the segment its dispatch names
        for i in 0..200 {
            assert_eq!(Some(i), dict.get(&i)?);
        }

        Ok(())
    }

    #[test]
    fn dict_min_tracks_smallest_pair() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut dict = crate::Config::new(dir.path())
            .chunk_size(8)
            .open_dict::<i64, i64>()?;

        for i in 0..50 {
            dict.insert(i, i)?;
        }

        // Remove the global minimum; the first segment's min must follow
        let first_min = dict.engine.mins[0].clone();
        dict.remove(&first_min.key)?;

        let new_min = dict.engine.mins[0].clone();
        assert!(
            (first_min.hash, &first_min.key) < (new_min.hash, &new_min.key),
            "min should move forward after deleting it",
        );

        Ok(())
    }
}
