// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod extend;

pub use extend::ExtendJob;

use crate::{
    coding::{Decode, Encode},
    config::resolve_chunk,
    engine::{Engine, EngineIter, EngineRevIter, SegmentPolicy},
    store::{Store, LIST_FOLDER, PATHS_FILE},
    Config,
};
use std::marker::PhantomData;
use std::path::PathBuf;

/// Default target segment size for lists.
pub const DEFAULT_CHUNK: usize = 8_192;

pub(crate) struct ListPolicy<T>(PhantomData<T>);

impl<T: Encode + Decode + Clone> SegmentPolicy for ListPolicy<T> {
    type Item = T;
    type Min = ();

    const KEEPS_MINS: bool = false;

    fn min_of(_: &T) -> Self::Min {}
}

/// A random-access mutable sequence partitioned into on-disk segments.
///
/// Positional access, insertion and deletion are `O(log N)` in the segment
/// index plus `O(CHUNK)` inside the touched segment, for `N` far exceeding
/// RAM. At most a handful of segments is resident at any time.
///
/// The directory is exclusively owned by one instance; opening the same root
/// twice concurrently is not detected.
pub struct BigList<T: Encode + Decode + Clone> {
    pub(crate) engine: Engine<ListPolicy<T>>,
}

impl<T: Encode + Decode + Clone> BigList<T> {
    /// Opens (or creates) a list at the given root folder.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open<P: AsRef<std::path::Path>>(root: P) -> crate::Result<Self> {
        Config::new(root).open_list()
    }

    /// Opens (or creates) a list striped over several root folders.
    ///
    /// Every root records the full root set; reopening with a different set
    /// fails with [`crate::Error::InconsistentRootSet`]. The order of the
    /// given roots does not matter after creation.
    pub fn open_striped<P: AsRef<std::path::Path>, I: IntoIterator<Item = P>>(
        roots: I,
    ) -> crate::Result<Self> {
        Config::striped(roots).open_list()
    }

    pub(crate) fn open_with(config: Config) -> crate::Result<Self> {
        config.validate()?;

        let data_dirs = resolve_roots(&config.roots)?;
        let store = Store::new(data_dirs);
        let chunk = resolve_chunk(&store, DEFAULT_CHUNK, config.chunk_size)?;

        Ok(Self {
            engine: Engine::open(store, chunk, config.cache_capacity)?,
        })
    }

    /// Number of items in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.len() == 0
    }

    /// Maps a rank to `(segment, offset)`, dispatching to the first or last
    /// segment without consulting the Fenwick tree when possible.
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

    /// Returns the item at `rank`.
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

    /// Replaces the item at `rank`, returning the previous one.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the rank is out of range or an IO error occurs.
    pub fn set(&mut self, rank: usize, value: T) -> crate::Result<T> {
        if rank >= self.engine.len() {
            return Err(crate::Error::IndexOutOfRange);
        }

        let (i, j) = self.coords(rank);
        let slot = &mut self.engine.seg_mut(i)?[j];
        Ok(std::mem::replace(slot, value))
    }

    /// Appends an item.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn push(&mut self, value: T) -> crate::Result<()> {
        if self.engine.len() == 0 {
            return self.engine.mint_segment(0, vec![value]);
        }

        let tail = self.engine.segment_count() - 1;
        self.engine.seg_mut(tail)?.push(value);
        self.engine.update_len(tail, 1);
        self.engine.rebalance(tail)
    }

    /// Inserts an item before `rank`. Ranks past the end are clamped, so
    /// `insert(usize::MAX, v)` appends.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn insert(&mut self, rank: usize, value: T) -> crate::Result<()> {
        let n = self.engine.len();
        if rank >= n {
            return self.push(value);
        }

        let (i, j) = if rank <= self.engine.lens[0] {
            (0, rank)
        } else {
            let last = self.engine.lens[self.engine.segment_count() - 1];
            if rank + last >= n {
                (self.engine.segment_count() - 1, rank + last - n)
            } else {
                self.engine.locate(rank)
            }
        };

        self.engine.seg_mut(i)?.insert(j, value);
        self.engine.update_len(i, 1);
        self.engine.rebalance(i)
    }

    /// Removes and returns the item at `rank`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the rank is out of range or an IO error occurs.
    pub fn remove(&mut self, rank: usize) -> crate::Result<T> {
        if rank >= self.engine.len() {
            return Err(crate::Error::IndexOutOfRange);
        }

        let (i, j) = self.coords(rank);
        let value = self.engine.seg_mut(i)?.remove(j);
        self.engine.update_len(i, -1);

        if self.engine.lens[i] == 0 {
            self.engine.delete_segment(i)?;
        } else {
            self.engine.rebalance(i)?;
        }

        Ok(value)
    }

    /// Deletes the ranks `start, start + |step|, …` below `stop`.
    ///
    /// Contiguous spans (`|step| == 1`) drop whole segments first and then
    /// trim the edges; other strides degrade to element-wise deletion in
    /// reverse order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `step` is zero or an IO error occurs.
    pub fn delete_range(&mut self, start: usize, stop: usize, step: isize) -> crate::Result<()> {
        if step == 0 {
            return Err(crate::Error::Unsupported("step must be non-zero"));
        }

        let stop = stop.min(self.engine.len());
        let start = start.min(stop);
        let step = step.unsigned_abs();

        if step == 1 {
            return self.delete_span(start, stop);
        }

        let ranks: Vec<usize> = (start..stop).step_by(step).collect();
        for rank in ranks.into_iter().rev() {
            self.remove(rank)?;
        }

        Ok(())
    }

    fn delete_span(&mut self, start: usize, stop: usize) -> crate::Result<()> {
        let n = self.engine.len();
        let mut size = stop - start;

        if size == 0 {
            return Ok(());
        }
        if size == n {
            return self.clear();
        }

        if start == 0 {
            // Drop whole segments off the front, then trim the new head
            while self.engine.segment_count() > 0 && size >= self.engine.lens[0] {
                size -= self.engine.lens[0];
                self.engine.delete_segment(0)?;
            }
            if size > 0 {
                self.engine.seg_mut(0)?.drain(0..size);
                self.engine.update_len(0, -(size as i64));
            }
            self.rebalance_span(0)
        } else if stop == n {
            // Symmetric, off the back
            while self.engine.segment_count() > 0 {
                let tail = self.engine.segment_count() - 1;
                if size < self.engine.lens[tail] {
                    break;
                }
                size -= self.engine.lens[tail];
                self.engine.delete_segment(tail)?;
            }
            if size > 0 {
                let tail = self.engine.segment_count() - 1;
                let keep = self.engine.lens[tail] - size;
                self.engine.seg_mut(tail)?.truncate(keep);
                self.engine.update_len(tail, -(size as i64));
            }
            self.rebalance_span(self.engine.segment_count().saturating_sub(1))
        } else {
            let (i0, j0) = self.engine.locate(start);
            let (i1, j1) = self.engine.locate(stop);

            if i0 == i1 || (i0 + 1 == i1 && j1 == 0) {
                // Whole span inside one segment
                self.engine.seg_mut(i0)?.drain(j0..j0 + size);
                self.engine.update_len(i0, -(size as i64));

                if self.engine.lens[i0] == 0 {
                    self.engine.delete_segment(i0)?;
                }

                return self.rebalance_span(i0);
            }

            // Drop fully covered interior segments
            for idx in ((i0 + 1)..i1).rev() {
                self.engine.delete_segment(idx)?;
            }

            // Trim the tail of the left edge
            let tail_cut = self.engine.lens[i0] - j0;
            self.engine.seg_mut(i0)?.truncate(j0);
            self.engine.update_len(i0, -(tail_cut as i64));

            // Trim the head of the right edge (now adjacent)
            if j1 > 0 {
                self.engine.seg_mut(i0 + 1)?.drain(0..j1);
                self.engine.update_len(i0 + 1, -(j1 as i64));
            }

            let mut anchor = i0;
            if self.engine.lens[i0] == 0 {
                self.engine.delete_segment(i0)?;
                anchor = i0.min(self.engine.segment_count().saturating_sub(1));
            }

            self.rebalance_span(anchor)
        }
    }

    /// Rebalances around `idx`, giving the right-hand neighbour a second
    /// look; structural deletes can leave two adjacent short segments.
    fn rebalance_span(&mut self, idx: usize) -> crate::Result<()> {
        let m = self.engine.segment_count();
        if m == 0 {
            return Ok(());
        }

        let idx = idx.min(m - 1);
        self.engine.rebalance(idx)?;

        let m = self.engine.segment_count();
        if m > 0 {
            let next = (idx + 1).min(m - 1);
            if self.engine.len_out_of_bounds(next) {
                self.engine.rebalance(next)?;
            }
            let idx = idx.min(self.engine.segment_count() - 1);
            if self.engine.len_out_of_bounds(idx) {
                self.engine.rebalance(idx)?;
            }
        }

        Ok(())
    }

    /// Appends all items of the iterable.
    ///
    /// The partial tail segment is filled first; the rest is materialized
    /// into fresh bulk-sized segments appended at the end, patching the
    /// Fenwick tree incrementally.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) -> crate::Result<()> {
        let mut job = ExtendJob::new(self, iter.into_iter());
        while job.step()? {}
        job.finish()
    }

    /// Starts a cooperative bulk import.
    ///
    /// Each [`ExtendJob::step`] performs at most one segment write, so an
    /// external scheduler can interleave other work during multi-gigabyte
    /// imports. Dropping the job mid-way finalises the tail (best effort).
    pub fn begin_extend<I: Iterator<Item = T>>(&mut self, source: I) -> ExtendJob<'_, T, I> {
        ExtendJob::new(self, source)
    }

    /// Reverses the list in place: every segment is reversed, then the
    /// segment order itself.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn reverse(&mut self) -> crate::Result<()> {
        for i in 0..self.engine.segment_count() {
            self.engine.seg_mut(i)?.reverse();
        }

        self.engine.segments.reverse();
        self.engine.lens.reverse();
        self.engine.fenwick = None;

        Ok(())
    }

    /// Removes all items. Segment ids are not reused.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn clear(&mut self) -> crate::Result<()> {
        self.engine.clear()
    }

    /// Iterates over all items in order.
    pub fn iter(&mut self) -> impl Iterator<Item = crate::Result<T>> + '_ {
        let stop = self.engine.len();
        EngineIter::new(&mut self.engine, 0, stop)
    }

    /// Iterates over the items in `start..stop`.
    pub fn iter_range(
        &mut self,
        start: usize,
        stop: usize,
    ) -> impl Iterator<Item = crate::Result<T>> + '_ {
        EngineIter::new(&mut self.engine, start, stop)
    }

    /// Iterates over all items in reverse order.
    pub fn iter_rev(&mut self) -> impl Iterator<Item = crate::Result<T>> + '_ {
        EngineRevIter::new(&mut self.engine)
    }

    /// Iterates over the ranks `start, start + |step|, …` below `stop`; a
    /// negative step visits the same ranks in reverse.
    pub fn iter_slice(
        &mut self,
        start: usize,
        stop: usize,
        step: isize,
    ) -> SliceIter<'_, T> {
        let stop = stop.min(self.engine.len());
        let start = start.min(stop);
        let stride = step.unsigned_abs().max(1);
        let count = (stop - start).div_ceil(stride);

        SliceIter {
            list: self,
            start,
            stride,
            forward: step >= 0,
            next: 0,
            count,
        }
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

    #[doc(hidden)]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.engine.chunk
    }
}

impl<T: Encode + Decode + Clone> Drop for BigList<T> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.commit() {
            log::error!("failed to flush list on drop: {e}");
        }
    }
}

/// Strided iterator; each item is an independent positional read.
pub struct SliceIter<'a, T: Encode + Decode + Clone> {
    list: &'a mut BigList<T>,
    start: usize,
    stride: usize,
    forward: bool,
    next: usize,
    count: usize,
}

impl<T: Encode + Decode + Clone> Iterator for SliceIter<'_, T> {
    type Item = crate::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }

        let k = if self.forward {
            self.next
        } else {
            self.count - 1 - self.next
        };
        self.next += 1;

        Some(self.list.get(self.start + k * self.stride))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.next;
        (left, Some(left))
    }
}

/// Resolves the data directories of a (possibly striped) list root set in
/// canonical order, creating them and validating the recorded root set.
fn resolve_roots(roots: &[PathBuf]) -> crate::Result<Vec<PathBuf>> {
    let data_dirs: Vec<PathBuf> = roots.iter().map(|r| r.join(LIST_FOLDER)).collect();

    for dir in &data_dirs {
        std::fs::create_dir_all(dir)?;
    }

    let given: Vec<String> = roots
        .iter()
        .map(|r| r.to_string_lossy().into_owned())
        .collect();

    // Every root that already has a paths file must agree on the set
    let mut recorded: Option<Vec<String>> = None;
    for dir in &data_dirs {
        if let Some(stored) = Store::read_meta_in::<Vec<String>>(dir, PATHS_FILE)? {
            match &recorded {
                Some(existing) if *existing != stored => {
                    return Err(crate::Error::InconsistentRootSet);
                }
                Some(_) => {}
                None => recorded = Some(stored),
            }
        }
    }

    let canonical = match recorded {
        Some(stored) => {
            let mut a = stored.clone();
            let mut b = given.clone();
            a.sort_unstable();
            b.sort_unstable();

            if a != b {
                log::warn!("root set mismatch: recorded {stored:?}, given {given:?}");
                return Err(crate::Error::InconsistentRootSet);
            }

            stored
        }
        None => given,
    };

    // Single-root containers do not record a root set at all; the check
    // above still rejects opening one root out of a striped set
    if roots.len() == 1 {
        return Ok(data_dirs);
    }

    // Bootstrap any root that does not carry the record yet
    for dir in &data_dirs {
        if Store::read_meta_in::<Vec<String>>(dir, PATHS_FILE)?.is_none() {
            Store::write_meta_in(dir, PATHS_FILE, &canonical)?;
        }
    }

    Ok(canonical
        .into_iter()
        .map(|r| PathBuf::from(r).join(LIST_FOLDER))
        .collect())
}
