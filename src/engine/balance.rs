// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment balancing.
//!
//! After a local mutation of segment `i`, the engine looks at a window of
//! neighbouring segments and splits, merges or redistributes so that every
//! segment length ends up within `[CHUNK/2, 2·CHUNK]` again (for two or more
//! segments). All moves operate on concatenations that are already in
//! container order, so no element crosses a split boundary out of order.

use super::{Engine, SegmentPolicy};

impl<P: SegmentPolicy> Engine<P> {
    /// True if segment sizes may violate the size invariant around `idx`.
    pub(crate) fn len_out_of_bounds(&self, idx: usize) -> bool {
        if self.segments.len() < 2 {
            return false;
        }
        let len = self.lens[idx];
        len < self.chunk / 2 || len > 2 * self.chunk
    }

    /// Restores the size invariant around segment `idx`.
    pub fn rebalance(&mut self, idx: usize) -> crate::Result<()> {
        let m = self.segments.len();

        if m == 0 {
            return Ok(());
        }

        if m == 1 {
            if self.lens[0] > 2 * self.chunk {
                self.split_in_half(0)?;
            }
            return Ok(());
        }

        let idx = idx.min(m - 1);

        if idx == 0 {
            self.balance_edge(0)
        } else if idx == m - 1 {
            self.balance_edge(m - 2)
        } else {
            self.balance_interior(idx)
        }
    }

    /// Splits segment `idx` into two roughly equal halves, minting a new
    /// segment for the upper half.
    pub(crate) fn split_in_half(&mut self, idx: usize) -> crate::Result<()> {
        let mut front = self.load_seg(idx)?;
        let back = front.split_off(front.len() / 2);

        let delta = front.len() as i64 - self.lens[idx] as i64;
        self.store_seg(idx, front)?;
        self.update_len(idx, delta);

        self.mint_segment(idx + 1, back)
    }

    /// Balances the boundary pair `(a, a + 1)`.
    fn balance_edge(&mut self, a: usize) -> crate::Result<()> {
        let b = a + 1;
        let chunk = self.chunk;
        let (la, lb) = (self.lens[a], self.lens[b]);
        let sum = la + lb;

        if sum < chunk {
            // Merge the pair into one segment
            let items = self.pop_segment(b)?;
            let count = items.len() as i64;
            self.seg_mut(a)?.extend(items);
            self.update_len(a, count);
        } else if sum > 4 * chunk {
            // Three-way split, introducing one new segment
            let mut combined = self.load_seg(a)?;
            let mut upper = self.load_seg(b)?;
            combined.append(&mut upper);

            let rest = combined.split_off(2 * combined.len() / 3);
            let mid = combined.split_off(combined.len() / 2);

            let delta_a = combined.len() as i64 - la as i64;
            let delta_b = mid.len() as i64 - lb as i64;
            self.store_seg(a, combined)?;
            self.store_seg(b, mid)?;
            self.update_len(a, delta_a);
            self.update_len(b, delta_b);
            self.refresh_min(b)?;

            self.mint_segment(b + 1, rest)?;
        } else if la > chunk / 2
            && la < 2 * chunk
            && lb > chunk / 2
            && lb < 2 * chunk
            && sum > 3 * chunk / 2
            && sum < 3 * chunk
        {
            // Within bounds
        } else {
            let diff = la.abs_diff(lb) / 2;
            if diff == 0 {
                return Ok(());
            }

            if la > lb {
                // Move the tail of a to the front of b
                let mut front = self.load_seg(a)?;
                let moved = front.split_off(la - diff);
                let mut back = self.load_seg(b)?;
                back.splice(0..0, moved);

                self.store_seg(a, front)?;
                self.store_seg(b, back)?;
                self.update_len(a, -(diff as i64));
                self.update_len(b, diff as i64);
            } else {
                // Move the front of b to the tail of a
                let mut back = self.load_seg(b)?;
                let moved: Vec<P::Item> = back.drain(0..diff).collect();
                let mut front = self.load_seg(a)?;
                front.extend(moved);

                self.store_seg(a, front)?;
                self.store_seg(b, back)?;
                self.update_len(a, diff as i64);
                self.update_len(b, -(diff as i64));
            }

            self.refresh_min(b)?;
        }

        Ok(())
    }

    /// Balances the interior window `(idx - 1, idx, idx + 1)`.
    fn balance_interior(&mut self, idx: usize) -> crate::Result<()> {
        let (a, b, c) = (idx - 1, idx, idx + 1);
        let chunk = self.chunk;
        let (la, lb, lc) = (self.lens[a], self.lens[b], self.lens[c]);
        let sum = la + lb + lc;

        if sum < 3 * chunk / 2 {
            // Merge three into two halves
            let mut combined = self.load_seg(a)?;
            let mut mid = self.load_seg(b)?;
            combined.append(&mut mid);
            combined.extend(self.pop_segment(c)?);

            let back = combined.split_off(combined.len() / 2);

            let delta_a = combined.len() as i64 - la as i64;
            let delta_b = back.len() as i64 - lb as i64;
            self.store_seg(a, combined)?;
            self.store_seg(b, back)?;
            self.update_len(a, delta_a);
            self.update_len(b, delta_b);
            self.refresh_min(b)?;
        } else if sum > 6 * chunk {
            // Four-way split, introducing one new segment
            let mut combined = self.load_seg(a)?;
            let mut mid = self.load_seg(b)?;
            let mut upper = self.load_seg(c)?;
            combined.append(&mut mid);
            combined.append(&mut upper);

            let rest = combined.split_off(3 * combined.len() / 4);
            let third = combined.split_off(combined.len() * 2 / 3);
            let second = combined.split_off(combined.len() / 2);

            let delta_a = combined.len() as i64 - la as i64;
            let delta_b = second.len() as i64 - lb as i64;
            let delta_c = third.len() as i64 - lc as i64;
            self.store_seg(a, combined)?;
            self.store_seg(b, second)?;
            self.store_seg(c, third)?;
            self.update_len(a, delta_a);
            self.update_len(b, delta_b);
            self.update_len(c, delta_c);
            self.refresh_min(b)?;
            self.refresh_min(c)?;

            self.mint_segment(c + 1, rest)?;
        } else if [la, lb, lc]
            .iter()
            .all(|&len| len > 3 * chunk / 4 && len < 3 * chunk / 2)
        {
            // Within bounds
        } else {
            // Redistribute into thirds
            let mut combined = self.load_seg(a)?;
            let mut mid = self.load_seg(b)?;
            let mut upper = self.load_seg(c)?;
            combined.append(&mut mid);
            combined.append(&mut upper);

            let third = combined.split_off(2 * combined.len() / 3);
            let second = combined.split_off(combined.len() / 2);

            let delta_a = combined.len() as i64 - la as i64;
            let delta_b = second.len() as i64 - lb as i64;
            let delta_c = third.len() as i64 - lc as i64;
            self.store_seg(a, combined)?;
            self.store_seg(b, second)?;
            self.store_seg(c, third)?;
            self.update_len(a, delta_a);
            self.update_len(b, delta_b);
            self.update_len(c, delta_c);
            self.refresh_min(b)?;
            self.refresh_min(c)?;
        }

        Ok(())
    }
}
