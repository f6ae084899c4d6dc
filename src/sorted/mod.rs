// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Out-of-core ordered sequence.
//!
//! Dispatch goes through the per-segment minimums: a binary search over
//! `mins` names the unique segment whose range covers a value, then a bisect
//! inside that segment finds the position. Duplicates are allowed and keep
//! insertion stability (new equal elements go after existing ones).

pub mod memlist;

use crate::{
    coding::{Decode, Encode},
    config::resolve_chunk,
    engine::{Engine, EngineIter, EngineRevIter, SegmentPolicy},
    store::Store,
    Config,
};
use std::marker::PhantomData;

/// Default target segment size for sorted lists.
pub const DEFAULT_CHUNK: usize = 1_024;

/// Which rank a value search resolves to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bias {
    /// Smallest rank `r` with `self[r] >= v`.
    Left,

    /// Smallest rank `r` with `self[r] > v`.
    Right,

    /// The rank of an element equal to `v`; fails with
    /// [`crate::Error::ValueNotFound`] if there is none.
    Exact,
}

pub(crate) struct SortedPolicy<T>(PhantomData<T>);

impl<T: Encode + Decode + Clone + Ord> SegmentPolicy for SortedPolicy<T> {
    type Item = T;
    type Min = T;

    const KEEPS_MINS: bool = true;

    fn min_of(first: &T) -> T {
        first.clone()
    }
}

/// A totally ordered mutable sequence partitioned into on-disk segments.
pub struct SortedList<T: Encode + Decode + Clone + Ord> {
    engine: Engine<SortedPolicy<T>>,
}

impl<T: Encode + Decode + Clone + Ord> SortedList<T> {
    /// Opens (or creates) a sorted list at the given root folder.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open<P: AsRef<std::path::Path>>(root: P) -> crate::Result<Self> {
        Config::new(root).open_sorted_list()
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

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.len() == 0
    }

    /// Segment whose range covers `value` (for lookup/removal).
    ///
    /// The caller guarantees the container is non-empty and
    /// `value >= mins[0]`.
    fn dispatch(&self, value: &T) -> usize {
        let m = self.engine.segment_count();
        let mins = &self.engine.mins;

        if m == 1 || *value >= mins[m - 1] {
            m - 1
        } else {
            mins[1..m - 1].partition_point(|min| min <= value)
        }
    }

    /// Inserts `value`, keeping order. Duplicates are allowed; equal
    /// elements keep insertion order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn add(&mut self, value: T) -> crate::Result<()> {
        if self.engine.len() == 0 {
            return self.engine.mint_segment(0, vec![value]);
        }

        let mut idx = if value < self.engine.mins[0] {
            0
        } else {
            self.dispatch(&value)
        };

        // Split an oversized receiver first; the insert then goes into
        // whichever half brackets the value
        if self.engine.lens[idx] >= 2 * self.engine.chunk {
            self.engine.split_in_half(idx)?;
            if value >= self.engine.mins[idx + 1] {
                idx += 1;
            }
        }

        let pos = {
            let seg = self.engine.seg_mut(idx)?;
            let pos = seg.partition_point(|e| *e <= value);
            seg.insert(pos, value);
            pos
        };

        self.engine.update_len(idx, 1);
        if pos == 0 {
            self.engine.refresh_min(idx)?;
        }

        Ok(())
    }

    /// Removes one occurrence of `value` if present. Returns whether
    /// something was removed; absence is not an error.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn discard(&mut self, value: &T) -> crate::Result<bool> {
        if self.engine.len() == 0 || *value < self.engine.mins[0] {
            return Ok(false);
        }

        let idx = self.dispatch(value);

        let pos = {
            let seg = self.engine.seg_mut(idx)?;
            let pos = seg.partition_point(|e| e <= value);
            if pos == 0 || seg[pos - 1] != *value {
                return Ok(false);
            }
            seg.remove(pos - 1);
            pos - 1
        };

        self.engine.update_len(idx, -1);
        self.shrink_after_remove(idx, pos)?;

        Ok(true)
    }

    /// Whether an element equal to `value` is present.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn contains(&mut self, value: &T) -> crate::Result<bool> {
        if self.engine.len() == 0 || *value < self.engine.mins[0] {
            return Ok(false);
        }

        let idx = self.dispatch(value);
        let seg = self.engine.seg_mut(idx)?;
        let pos = seg.partition_point(|e| e <= value);

        Ok(pos > 0 && seg[pos - 1] == *value)
    }

    /// Returns the element at `rank`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the rank is out of range or an IO error occurs.
    pub fn get(&mut self, rank: usize) -> crate::Result<T> {
        if rank >= self.engine.len() {
            return Err(crate::Error::IndexOutOfRange);
        }

        let (i, j) = self.coords(rank);
        Ok(self.engine.seg_mut(i)?[j].clone())
    }

    /// Removes and returns the element at `rank`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the rank is out of range or an IO error occurs.
    pub fn remove_at(&mut self, rank: usize) -> crate::Result<T> {
        if rank >= self.engine.len() {
            return Err(crate::Error::IndexOutOfRange);
        }

        let (i, j) = self.coords(rank);
        let value = self.engine.seg_mut(i)?.remove(j);
        self.engine.update_len(i, -1);
        self.shrink_after_remove(i, j)?;

        Ok(value)
    }

    fn coords(&mut self, rank: usize) -> (usize, usize) {
        debug_assert!(rank < self.engine.len());

        let n = self.engine.len();
        let last = self.engine.lens[self.engine.segment_count() - 1];

        if rank < self.engine.lens[0] {
            (0, rank)
        } else if rank + last >= n {
            (self.engine.segment_count() - 1, rank + last - n)
        } else {
            self.engine.locate(rank)
        }
    }

    /// Post-removal bookkeeping: drops an emptied segment, fixes the summary
    /// key, and merges an undersized segment with the smaller neighbour
    /// (re-splitting if the merge overshoots the size bound).
    fn shrink_after_remove(&mut self, idx: usize, pos: usize) -> crate::Result<()> {
        if self.engine.lens[idx] == 0 {
            return self.engine.delete_segment(idx);
        }

        let m = self.engine.segment_count();

        if m == 1 || self.engine.lens[idx] > self.engine.chunk / 2 {
            if pos == 0 {
                self.engine.refresh_min(idx)?;
            }
            return Ok(());
        }

        if pos == 0 {
            self.engine.refresh_min(idx)?;
        }

        let target = if idx > 0
            && (idx + 1 == m || self.engine.lens[idx - 1] < self.engine.lens[idx + 1])
        {
            // Merge into the left neighbour
            let items = self.engine.pop_segment(idx)?;
            let count = items.len() as i64;
            self.engine.seg_mut(idx - 1)?.extend(items);
            self.engine.update_len(idx - 1, count);
            idx - 1
        } else {
            // Pull the right neighbour in
            let items = self.engine.pop_segment(idx + 1)?;
            let count = items.len() as i64;
            self.engine.seg_mut(idx)?.extend(items);
            self.engine.update_len(idx, count);
            idx
        };

        if self.engine.lens[target] > 2 * self.engine.chunk {
            self.engine.split_in_half(target)?;
        }

        Ok(())
    }

    /// Resolves `value` to a rank.
    ///
    /// # Errors
    ///
    /// Will return `Err(ValueNotFound)` for [`Bias::Exact`] when no equal
    /// element exists, or `Err` on IO errors.
    pub fn index_of(&mut self, value: &T, bias: Bias) -> crate::Result<usize> {
        match bias {
            Bias::Left => self.rank_of(value, false),
            Bias::Right => self.rank_of(value, true),
            Bias::Exact => {
                let rank = self.rank_of(value, false)?;
                if rank < self.engine.len() && self.get(rank)? == *value {
                    Ok(rank)
                } else {
                    Err(crate::Error::ValueNotFound)
                }
            }
        }
    }

    /// Smallest rank whose element is `>= value` (or `> value` with
    /// `strict`). `len()` if every element precedes the value.
    fn rank_of(&mut self, value: &T, strict: bool) -> crate::Result<usize> {
        if self.engine.len() == 0 {
            return Ok(0);
        }

        let first_ge = if strict {
            self.engine.mins.partition_point(|min| min <= value)
        } else {
            self.engine.mins.partition_point(|min| min < value)
        };
        let seg_idx = first_ge.saturating_sub(1);

        let pos = {
            let seg = self.engine.seg_mut(seg_idx)?;
            if strict {
                seg.partition_point(|e| e <= value)
            } else {
                seg.partition_point(|e| e < value)
            }
        };

        Ok(self.engine.prefix(seg_idx) + pos)
    }

    /// The smallest element, if any.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn first(&mut self) -> crate::Result<Option<T>> {
        if self.engine.len() == 0 {
            return Ok(None);
        }
        Ok(self.engine.seg_mut(0)?.first().cloned())
    }

    /// The largest element, if any.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn last(&mut self) -> crate::Result<Option<T>> {
        let m = self.engine.segment_count();
        if m == 0 {
            return Ok(None);
        }
        Ok(self.engine.seg_mut(m - 1)?.last().cloned())
    }

    /// Adds all elements of the iterable.
    ///
    /// Small additions (below an eighth of the current length) degrade to
    /// repeated [`SortedList::add`]; larger ones are sorted and merged with
    /// the existing data, re-segmenting the result in one pass.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) -> crate::Result<()> {
        let mut incoming: Vec<T> = iter.into_iter().collect();
        if incoming.is_empty() {
            return Ok(());
        }

        if incoming.len() < self.engine.len() / 8 {
            for value in incoming {
                self.add(value)?;
            }
            return Ok(());
        }

        incoming.sort();

        let mut existing = Vec::with_capacity(self.engine.len());
        while self.engine.segment_count() > 0 {
            existing.extend(self.engine.pop_segment(0)?);
        }

        let merged = merge_sorted(existing, incoming);
        self.rebuild_from_sorted(merged)
    }

    /// Re-segments globally sorted data into fresh chunks.
    fn rebuild_from_sorted(&mut self, data: Vec<T>) -> crate::Result<()> {
        debug_assert_eq!(0, self.engine.segment_count());

        let chunk = self.engine.chunk;
        let mut chunks: Vec<Vec<T>> = Vec::with_capacity(data.len() / chunk + 1);

        let mut iter = data.into_iter();
        loop {
            let batch: Vec<T> = iter.by_ref().take(chunk).collect();
            if batch.is_empty() {
                break;
            }
            chunks.push(batch);
        }

        // A short tail is folded into its neighbour
        if chunks.len() > 1 && chunks.last().is_some_and(|tail| tail.len() < chunk / 2) {
            if let Some(tail) = chunks.pop() {
                if let Some(prev) = chunks.last_mut() {
                    prev.extend(tail);
                }
            }
        }

        for items in chunks {
            let m = self.engine.segment_count();
            self.engine.mint_segment(m, items)?;
        }

        Ok(())
    }

    /// Removes all elements. Segment ids are not reused.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn clear(&mut self) -> crate::Result<()> {
        self.engine.clear()
    }

    /// Iterates over all elements in order.
    pub fn iter(&mut self) -> impl Iterator<Item = crate::Result<T>> + '_ {
        let stop = self.engine.len();
        EngineIter::new(&mut self.engine, 0, stop)
    }

    /// Iterates over all elements in reverse order.
    pub fn iter_rev(&mut self) -> impl Iterator<Item = crate::Result<T>> + '_ {
        EngineRevIter::new(&mut self.engine)
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

impl<T: Encode + Decode + Clone + Ord> Drop for SortedList<T> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.commit() {
            log::error!("failed to flush sorted list on drop: {e}");
        }
    }
}

fn merge_sorted<T: Ord>(a: Vec<T>, b: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    let mut next_a = a.next();
    let mut next_b = b.next();

    loop {
        match (next_a.take(), next_b.take()) {
            (Some(x), Some(y)) => {
                // Existing elements first on ties, keeping stability
                if x <= y {
                    out.push(x);
                    next_a = a.next();
                    next_b = Some(y);
                } else {
                    out.push(y);
                    next_a = Some(x);
                    next_b = b.next();
                }
            }
            (Some(x), None) => {
                out.push(x);
                out.extend(a);
                break;
            }
            (None, Some(y)) => {
                out.push(y);
                out.extend(b);
                break;
            }
            (None, None) => break,
        }
    }

    out
}
