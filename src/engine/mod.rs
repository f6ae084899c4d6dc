// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared engine of the chunk-segmented containers.
//!
//! Owns the metadata vectors (`segments`, `lens`, `mins`), the segment
//! cache, the lazily rebuilt Fenwick index and the id allocator. Containers
//! layer their dispatch and ordering rules on top.

mod balance;
mod iter;

pub use iter::{EngineIter, EngineRevIter};

use crate::{
    cache::SegmentCache,
    coding::{Decode, Encode},
    fenwick::Fenwick,
    id::IdCounter,
    store::{SegmentRef, Store, FILENAMES_FILE, LENS_FILE, MINS_FILE},
};

/// Container-specific part of the engine: the element type and the summary
/// key (`min`) maintained per segment.
pub trait SegmentPolicy {
    type Item: Encode + Decode + Clone;
    type Min: Encode + Decode + Clone;

    /// Whether `mins` is maintained and persisted for this container.
    const KEEPS_MINS: bool;

    /// Summary key of a segment, derived from its first item.
    fn min_of(first: &Self::Item) -> Self::Min;
}

pub struct Engine<P: SegmentPolicy> {
    pub(crate) store: Store,
    pub(crate) counter: IdCounter,
    pub(crate) cache: SegmentCache<P::Item>,

    /// Identity of each segment, in container order.
    pub(crate) segments: Vec<SegmentRef>,

    /// Length of each segment. Kept in lockstep with `segments` (and `mins`
    /// for mins-keeping containers); a mismatch on open is a corrupt root.
    pub(crate) lens: Vec<usize>,

    /// Summary key of each segment (empty unless `P::KEEPS_MINS`).
    pub(crate) mins: Vec<P::Min>,

    /// Positional index; `None` marks it for lazy rebuild.
    pub(crate) fenwick: Option<Fenwick>,

    /// Total item count, cached.
    pub(crate) len: usize,

    /// Target segment size.
    pub(crate) chunk: usize,

    stripe_cursor: u16,
    stripe_run: u64,
}

impl<P: SegmentPolicy> Engine<P> {
    pub fn open(store: Store, chunk: usize, cache_capacity: usize) -> crate::Result<Self> {
        let counter = IdCounter::open(store.primary())?;

        let segments: Vec<SegmentRef> = store.read_meta(FILENAMES_FILE, vec![])?;
        let lens: Vec<u64> = store.read_meta(LENS_FILE, vec![])?;

        let mins: Vec<P::Min> = if P::KEEPS_MINS {
            store.read_meta(MINS_FILE, vec![])?
        } else {
            Vec::new()
        };

        if segments.len() != lens.len() {
            return Err(crate::Error::Corrupt("filenames and lens disagree"));
        }
        if P::KEEPS_MINS && mins.len() != segments.len() {
            return Err(crate::Error::Corrupt("mins and filenames disagree"));
        }
        if lens.iter().any(|&x| x == 0) {
            return Err(crate::Error::Corrupt("empty segment in lens"));
        }

        let lens: Vec<usize> = lens.into_iter().map(|x| x as usize).collect();
        let len = lens.iter().sum();

        log::debug!(
            "opened container at {:?}: {} segments, {len} items, chunk size {chunk}",
            store.primary(),
            segments.len(),
        );

        Ok(Self {
            store,
            counter,
            cache: SegmentCache::new(cache_capacity),
            segments,
            lens,
            mins,
            fenwick: None,
            len,
            chunk,
            stripe_cursor: 0,
            stripe_run: 0,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Target size of freshly emitted bulk segments, roughly `3/2 · CHUNK`.
    #[must_use]
    pub fn chunk_extended(&self) -> usize {
        self.chunk + self.chunk / 2
    }

    /// Mutable handle to segment `idx`, via the cache.
    pub fn seg_mut(&mut self, idx: usize) -> crate::Result<&mut Vec<P::Item>> {
        let segment = self.segments[idx];
        self.cache.touch(&self.store, segment)
    }

    /// Clones the content of segment `idx` (for iteration).
    pub fn clone_seg(&mut self, idx: usize) -> crate::Result<Vec<P::Item>> {
        Ok(self.seg_mut(idx)?.clone())
    }

    /// Takes segment `idx` out of the cache (loading it if necessary)
    /// without touching metadata. The caller puts it (or a replacement)
    /// back via [`Engine::store_seg`] before anything else can load it.
    pub(crate) fn load_seg(&mut self, idx: usize) -> crate::Result<Vec<P::Item>> {
        let segment = self.segments[idx];
        self.cache.take(&self.store, segment)
    }

    pub(crate) fn store_seg(&mut self, idx: usize, items: Vec<P::Item>) -> crate::Result<()> {
        let segment = self.segments[idx];
        self.cache.insert(&self.store, segment, items)
    }

    fn fenwick(&mut self) -> &Fenwick {
        if self.fenwick.is_none() {
            log::trace!("rebuilding fenwick tree over {} segments", self.lens.len());
            self.fenwick = Some(Fenwick::from_lens(&self.lens));
        }

        // NOTE: Built above
        #[allow(clippy::expect_used)]
        self.fenwick.as_ref().expect("fenwick tree should be built")
    }

    /// Maps a global rank to `(segment, offset)`.
    ///
    /// The caller guarantees `rank < len`.
    pub fn locate(&mut self, rank: usize) -> (usize, usize) {
        debug_assert!(rank < self.len);
        self.fenwick().locate(rank)
    }

    /// Sum of the lengths of segments `0..idx`.
    pub fn prefix(&mut self, idx: usize) -> usize {
        self.fenwick().prefix(idx)
    }

    /// Applies a length delta to segment `idx`, keeping the cached total and
    /// the Fenwick tree in sync.
    pub fn update_len(&mut self, idx: usize, delta: i64) {
        if delta == 0 {
            return;
        }

        #[allow(clippy::cast_sign_loss)]
        {
            self.lens[idx] = (self.lens[idx] as i64 + delta) as usize;
            self.len = (self.len as i64 + delta) as usize;
        }

        if let Some(fenwick) = &mut self.fenwick {
            fenwick.update(idx, delta);
        }
    }

    /// Creates a new segment at position `pos` holding `items`, allocating a
    /// fresh id (flushed before the id becomes visible) and reserving its
    /// file on disk. Increases the total length by `items.len()`.
    pub fn mint_segment(&mut self, pos: usize, items: Vec<P::Item>) -> crate::Result<()> {
        let id = self.counter.next()?;
        let segment = SegmentRef::new(self.pick_root(), id);

        self.store.write_segment::<P::Item>(segment, &[])?;

        let count = items.len();

        if P::KEEPS_MINS {
            // NOTE: Mins-keeping containers never mint empty segments
            #[allow(clippy::expect_used)]
            let min = P::min_of(items.first().expect("minted segment should not be empty"));
            self.mins.insert(pos, min);
        }

        self.segments.insert(pos, segment);
        self.lens.insert(pos, count);
        self.len += count;

        match &mut self.fenwick {
            Some(fenwick) if pos == fenwick.segment_count() => fenwick.append(count),
            _ => self.fenwick = None,
        }

        self.cache.insert(&self.store, segment, items)?;

        log::trace!("minted segment {segment} at position {pos} with {count} items");
        Ok(())
    }

    /// Removes segment `idx` entirely, returning its items without writing
    /// them back. Decreases the total length accordingly.
    pub fn pop_segment(&mut self, idx: usize) -> crate::Result<Vec<P::Item>> {
        let segment = self.segments.remove(idx);
        let count = self.lens.remove(idx);
        if P::KEEPS_MINS {
            self.mins.remove(idx);
        }
        self.len -= count;

        match &mut self.fenwick {
            Some(fenwick) if idx + 1 == fenwick.segment_count() => fenwick.pop(),
            _ => self.fenwick = None,
        }

        let items = self.cache.take(&self.store, segment)?;
        self.store.delete_segment(segment)?;

        log::trace!("removed segment {segment} at position {idx} ({count} items)");
        Ok(items)
    }

    /// Removes segment `idx` and drops its content.
    pub fn delete_segment(&mut self, idx: usize) -> crate::Result<()> {
        let segment = self.segments.remove(idx);
        let count = self.lens.remove(idx);
        if P::KEEPS_MINS {
            self.mins.remove(idx);
        }
        self.len -= count;

        match &mut self.fenwick {
            Some(fenwick) if idx + 1 == fenwick.segment_count() => fenwick.pop(),
            _ => self.fenwick = None,
        }

        self.cache.remove(segment);
        self.store.delete_segment(segment)?;

        log::trace!("deleted segment {segment} at position {idx} ({count} items)");
        Ok(())
    }

    /// Recomputes the summary key of segment `idx` from its first item.
    pub fn refresh_min(&mut self, idx: usize) -> crate::Result<()> {
        if !P::KEEPS_MINS {
            return Ok(());
        }

        let min = self.seg_mut(idx)?.first().map(P::min_of);
        if let Some(min) = min {
            self.mins[idx] = min;
        }

        Ok(())
    }

    /// Flushes all resident segments and persists the metadata vectors.
    pub fn commit(&mut self) -> crate::Result<()> {
        self.cache.flush_all(&self.store)?;

        self.store.write_meta(FILENAMES_FILE, &self.segments)?;

        let lens: Vec<u64> = self.lens.iter().map(|&x| x as u64).collect();
        self.store.write_meta(LENS_FILE, &lens)?;

        if P::KEEPS_MINS {
            self.store.write_meta(MINS_FILE, &self.mins)?;
        }

        log::debug!(
            "committed container at {:?}: {} segments, {} items",
            self.store.primary(),
            self.segments.len(),
            self.len,
        );

        Ok(())
    }

    /// Deletes every segment and persists empty metadata. The id counter
    /// keeps its value; ids are never reused.
    pub fn clear(&mut self) -> crate::Result<()> {
        let segments = std::mem::take(&mut self.segments);
        for segment in segments {
            self.store.delete_segment(segment)?;
        }

        self.cache.clear();
        self.lens.clear();
        self.mins.clear();
        self.fenwick = None;
        self.len = 0;
        self.stripe_cursor = 0;
        self.stripe_run = 0;

        self.commit()
    }

    fn pick_root(&mut self) -> u16 {
        let roots = self.store.root_count();
        if roots <= 1 {
            return 0;
        }

        // Round-robin with a growth schedule: stay on the current root while
        // run² ≤ m, so early segments alternate quickly and later ones come
        // in longer runs.
        let m = self.segments.len() as u64;
        if self.stripe_run * self.stripe_run > m {
            self.stripe_cursor = (self.stripe_cursor + 1) % roots as u16;
            self.stripe_run = 0;
        }
        self.stripe_run += 1;

        self.stripe_cursor
    }
}
