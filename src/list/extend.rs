// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::BigList;
use crate::coding::{Decode, Encode};

/// Cooperative bulk append.
///
/// Pulled from the source one bulk segment at a time: every [`ExtendJob::step`]
/// performs at most one segment write and one cheap Fenwick tail patch, then
/// returns control to the caller. This keeps an external scheduler responsive
/// during very large imports; there is no concurrent access to the list.
///
/// Cancellation: dropping the job without calling [`ExtendJob::finish`] still
/// finalises the tail (best effort, logged on failure), so the items already
/// pulled from the source remain reachable and the metadata stays coherent.
pub struct ExtendJob<'a, T: Encode + Decode + Clone, I: Iterator<Item = T>> {
    list: &'a mut BigList<T>,
    source: std::iter::Fuse<I>,
    filled_tail: bool,
    finished: bool,
}

impl<'a, T: Encode + Decode + Clone, I: Iterator<Item = T>> ExtendJob<'a, T, I> {
    pub(crate) fn new(list: &'a mut BigList<T>, source: I) -> Self {
        Self {
            list,
            source: source.fuse(),
            filled_tail: false,
            finished: false,
        }
    }

    /// Performs one unit of work. Returns `false` once the source is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn step(&mut self) -> crate::Result<bool> {
        if self.finished {
            return Ok(false);
        }

        let target = self.list.engine.chunk_extended();

        if !self.filled_tail {
            self.filled_tail = true;

            let m = self.list.engine.segment_count();
            if m > 0 && self.list.engine.lens[m - 1] < target {
                // Fill the partial tail segment in place first
                let need = target - self.list.engine.lens[m - 1];
                let batch: Vec<T> = self.source.by_ref().take(need).collect();
                let taken = batch.len();

                self.list.engine.seg_mut(m - 1)?.extend(batch);
                self.list.engine.update_len(m - 1, taken as i64);

                return Ok(taken == need);
            }
        }

        let batch: Vec<T> = self.source.by_ref().take(target).collect();
        if batch.is_empty() {
            return Ok(false);
        }

        let full = batch.len() == target;
        let m = self.list.engine.segment_count();
        self.list.engine.mint_segment(m, batch)?;

        Ok(full)
    }

    /// Drains the remaining source and finalises the tail.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn finish(mut self) -> crate::Result<()> {
        while self.step()? {}
        self.finished = true;
        self.finalize_tail()
    }

    fn finalize_tail(&mut self) -> crate::Result<()> {
        let m = self.list.engine.segment_count();
        if m > 0 {
            self.list.engine.rebalance(m - 1)?;
        }
        Ok(())
    }
}

impl<T: Encode + Decode + Clone, I: Iterator<Item = T>> Drop for ExtendJob<'_, T, I> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Err(e) = self.finalize_tail() {
                log::warn!("failed to finalise cancelled bulk extend: {e}");
            }
        }
    }
}
