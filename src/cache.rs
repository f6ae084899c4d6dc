// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Bounded LRU over resident segments.
//!
//! A resident segment is the authoritative copy; the on-disk blob may be
//! stale until eviction or flush. Eviction writes back unconditionally —
//! there is no dirty bit.

use crate::store::{SegmentRef, Store};
use rustc_hash::FxHashMap;

pub const DEFAULT_CAPACITY: usize = 4;

pub struct SegmentCache<T> {
    capacity: usize,
    items: FxHashMap<SegmentRef, Vec<T>>,

    /// LRU order, least recently used first. At most `capacity` entries, so
    /// linear scans are fine.
    order: Vec<SegmentRef>,
}

impl<T: crate::coding::Encode + crate::coding::Decode> SegmentCache<T> {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 2);

        Self {
            capacity,
            items: FxHashMap::default(),
            order: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn mark_used(&mut self, segment: SegmentRef) {
        if let Some(pos) = self.order.iter().position(|x| *x == segment) {
            self.order.remove(pos);
        }
        self.order.push(segment);
    }

    fn evict_if_full(&mut self, store: &Store) -> crate::Result<()> {
        while self.items.len() >= self.capacity {
            let victim = self.order.remove(0);

            // NOTE: order and items are kept in lockstep
            #[allow(clippy::expect_used)]
            let items = self
                .items
                .remove(&victim)
                .expect("evicted segment should be resident");

            log::trace!("evicting segment {victim}, writing back {} items", items.len());
            store.write_segment(victim, &items)?;
        }

        Ok(())
    }

    /// Returns a mutable handle to the segment, loading it on miss and
    /// evicting the least recently used resident segment if at capacity.
    pub fn touch(&mut self, store: &Store, segment: SegmentRef) -> crate::Result<&mut Vec<T>> {
        if self.items.contains_key(&segment) {
            self.mark_used(segment);
        } else {
            self.evict_if_full(store)?;
            let items = store.read_segment(segment)?;
            self.items.insert(segment, items);
            self.order.push(segment);
        }

        // NOTE: Just inserted or proven resident above
        #[allow(clippy::expect_used)]
        Ok(self
            .items
            .get_mut(&segment)
            .expect("segment should be resident"))
    }

    /// Places a segment into the cache as most recently used, evicting as
    /// needed. The previous resident copy (if any) is replaced.
    pub fn insert(
        &mut self,
        store: &Store,
        segment: SegmentRef,
        items: Vec<T>,
    ) -> crate::Result<()> {
        if self.items.contains_key(&segment) {
            self.items.insert(segment, items);
            self.mark_used(segment);
        } else {
            self.evict_if_full(store)?;
            self.items.insert(segment, items);
            self.order.push(segment);
        }

        Ok(())
    }

    /// Removes the segment from the cache and returns its in-memory
    /// representation *without* writing it back, loading from disk if it is
    /// not resident. Used when a segment is merged away or rewritten.
    pub fn take(&mut self, store: &Store, segment: SegmentRef) -> crate::Result<Vec<T>> {
        if let Some(pos) = self.order.iter().position(|x| *x == segment) {
            self.order.remove(pos);
        }

        if let Some(items) = self.items.remove(&segment) {
            Ok(items)
        } else {
            store.read_segment(segment)
        }
    }

    /// Drops the segment without write-back (it has been deleted).
    pub fn remove(&mut self, segment: SegmentRef) {
        if let Some(pos) = self.order.iter().position(|x| *x == segment) {
            self.order.remove(pos);
        }
        self.items.remove(&segment);
    }

    /// Writes back every resident segment. Segments stay resident.
    pub fn flush_all(&mut self, store: &Store) -> crate::Result<()> {
        for segment in &self.order {
            // NOTE: order and items are kept in lockstep
            #[allow(clippy::expect_used)]
            let items = self
                .items
                .get(segment)
                .expect("resident segment should exist");

            store.write_segment(*segment, items)?;
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn fixture(dir: &std::path::Path, n: u64) -> crate::Result<Store> {
        let store = Store::new(vec![dir.into()]);
        for id in 0..n {
            let base = i64::try_from(id).unwrap() * 100;
            store.write_segment(SegmentRef::new(0, id), &[base, base + 1])?;
        }
        Ok(store)
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn cache_eviction_writes_back() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = fixture(dir.path(), 6)?;
        let mut cache = SegmentCache::<i64>::new(4);

        // Mutate segment 0 in cache only
        cache.touch(&store, SegmentRef::new(0, 0))?.push(42);

        // Fill the cache past capacity; segment 0 gets evicted + written back
        for id in 1..=4 {
            cache.touch(&store, SegmentRef::new(0, id))?;
        }
        assert_eq!(4, cache.len());

        let on_disk: Vec<i64> = store.read_segment(SegmentRef::new(0, 0))?;
        assert_eq!(vec![0, 1, 42], on_disk);

        // And touching it again reloads the written-back copy
        assert_eq!(
            &vec![0, 1, 42],
            cache.touch(&store, SegmentRef::new(0, 0))?,
        );

        Ok(())
    }

    #[test]
    fn cache_lru_order() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = fixture(dir.path(), 5)?;
        let mut cache = SegmentCache::<i64>::new(2);

        cache.touch(&store, SegmentRef::new(0, 0))?;
        cache.touch(&store, SegmentRef::new(0, 1))?;

        // Re-touch 0, making 1 the eviction victim
        cache.touch(&store, SegmentRef::new(0, 0))?.push(-1);
        cache.touch(&store, SegmentRef::new(0, 2))?;

        // 0 must still be resident with its mutation intact
        assert_eq!(
            &vec![0, 1, -1],
            cache.touch(&store, SegmentRef::new(0, 0))?,
        );

        Ok(())
    }

    #[test]
    fn cache_take_skips_write_back() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = fixture(dir.path(), 2)?;
        let mut cache = SegmentCache::<i64>::new(4);

        cache.touch(&store, SegmentRef::new(0, 0))?.push(7);
        let taken = cache.take(&store, SegmentRef::new(0, 0))?;
        assert_eq!(vec![0, 1, 7], taken);
        assert_eq!(0, cache.len());

        // Disk copy untouched
        let on_disk: Vec<i64> = store.read_segment(SegmentRef::new(0, 0))?;
        assert_eq!(vec![0, 1], on_disk);

        // take() on a non-resident segment falls back to disk
        let taken = cache.take(&store, SegmentRef::new(0, 1))?;
        assert_eq!(vec![100, 101], taken);

        Ok(())
    }

    #[test]
    fn cache_flush_all() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = fixture(dir.path(), 3)?;
        let mut cache = SegmentCache::<i64>::new(4);

        for id in 0..3 {
            cache.touch(&store, SegmentRef::new(0, id))?.push(9);
        }
        cache.flush_all(&store)?;

        for id in 0..3 {
            let base = i64::try_from(id).unwrap() * 100;
            let on_disk: Vec<i64> = store.read_segment(SegmentRef::new(0, id))?;
            assert_eq!(vec![base, base + 1, 9], on_disk);
        }

        Ok(())
    }
}
