// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Engine, SegmentPolicy};

/// Forward iterator over a rank range, walking segments in order.
///
/// Segments are materialized one at a time through the cache, so at most one
/// segment's worth of items is buffered.
pub struct EngineIter<'a, P: SegmentPolicy> {
    engine: &'a mut Engine<P>,
    next_seg: usize,
    skip: usize,
    remaining: usize,
    buf: std::vec::IntoIter<P::Item>,
}

impl<'a, P: SegmentPolicy> EngineIter<'a, P> {
    pub fn new(engine: &'a mut Engine<P>, start: usize, stop: usize) -> Self {
        let stop = stop.min(engine.len());
        let start = start.min(stop);

        let (next_seg, skip) = if start < engine.len() {
            engine.locate(start)
        } else {
            (engine.segment_count(), 0)
        };

        Self {
            engine,
            next_seg,
            skip,
            remaining: stop - start,
            buf: Vec::new().into_iter(),
        }
    }
}

impl<P: SegmentPolicy> Iterator for EngineIter<'_, P> {
    type Item = crate::Result<P::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(item) = self.buf.next() {
                self.remaining -= 1;
                return Some(Ok(item));
            }

            if self.next_seg >= self.engine.segment_count() {
                self.remaining = 0;
                return None;
            }

            match self.engine.clone_seg(self.next_seg) {
                Ok(items) => {
                    let mut buf = items.into_iter();
                    for _ in 0..self.skip {
                        buf.next();
                    }
                    self.skip = 0;
                    self.buf = buf;
                    self.next_seg += 1;
                }
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Reverse iterator over the whole container, walking segments back to front.
pub struct EngineRevIter<'a, P: SegmentPolicy> {
    engine: &'a mut Engine<P>,
    next_seg: usize,
    remaining: usize,
    buf: std::vec::IntoIter<P::Item>,
}

impl<'a, P: SegmentPolicy> EngineRevIter<'a, P> {
    pub fn new(engine: &'a mut Engine<P>) -> Self {
        let next_seg = engine.segment_count();
        let remaining = engine.len();

        Self {
            engine,
            next_seg,
            remaining,
            buf: Vec::new().into_iter(),
        }
    }
}

impl<P: SegmentPolicy> Iterator for EngineRevIter<'_, P> {
    type Item = crate::Result<P::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(item) = self.buf.next() {
                self.remaining -= 1;
                return Some(Ok(item));
            }

            if self.next_seg == 0 {
                self.remaining = 0;
                return None;
            }

            self.next_seg -= 1;

            match self.engine.clone_seg(self.next_seg) {
                Ok(mut items) => {
                    items.reverse();
                    self.buf = items.into_iter();
                }
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
