// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    cache::DEFAULT_CAPACITY,
    store::{Store, CONFIG_FILE},
    BigDict, BigList, SortedList,
};
use std::path::{Path, PathBuf};

/// Open-time options shared by all containers.
///
/// ```no_run
/// use big_collections::Config;
///
/// let list = Config::new("/data/numbers")
///     .chunk_size(4096)
///     .open_list::<i64>()?;
/// #
/// # Ok::<(), big_collections::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) roots: Vec<PathBuf>,

    /// Target segment size; only applied when the container is created.
    pub(crate) chunk_size: Option<usize>,

    /// Capacity of the resident segment cache.
    pub(crate) cache_capacity: usize,
}

impl Config {
    /// Creates a config for a single-root container.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            roots: vec![root.as_ref().into()],
            chunk_size: None,
            cache_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Creates a config striped over multiple roots (BigList only).
    pub fn striped<P: AsRef<Path>, I: IntoIterator<Item = P>>(roots: I) -> Self {
        Self {
            roots: roots.into_iter().map(|p| p.as_ref().into()).collect(),
            chunk_size: None,
            cache_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Overrides the target segment size (min 4).
    ///
    /// Applied only when the container is created; reopening an existing
    /// container keeps its persisted chunk size.
    #[must_use]
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Overrides the segment cache capacity (min 2, default 4).
    #[must_use]
    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.cache_capacity = n;
        self
    }

    /// Opens a [`BigList`] with this configuration.
    pub fn open_list<T: crate::coding::Encode + crate::coding::Decode + Clone>(
        self,
    ) -> crate::Result<BigList<T>> {
        BigList::open_with(self)
    }

    /// Opens a [`BigDict`] with this configuration.
    pub fn open_dict<K, V>(self) -> crate::Result<BigDict<K, V>>
    where
        K: crate::coding::Encode + crate::coding::Decode + Clone + Ord,
        V: crate::coding::Encode + crate::coding::Decode + Clone,
    {
        BigDict::open_with(self)
    }

    /// Opens a [`SortedList`] with this configuration.
    pub fn open_sorted_list<T>(self) -> crate::Result<SortedList<T>>
    where
        T: crate::coding::Encode + crate::coding::Decode + Clone + Ord,
    {
        SortedList::open_with(self)
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.roots.is_empty() {
            return Err(crate::Error::Config("at least one root is required"));
        }
        if let Some(n) = self.chunk_size {
            if n < 4 {
                return Err(crate::Error::Config("chunk_size must be at least 4"));
            }
        }
        if self.cache_capacity < 2 {
            return Err(crate::Error::Config("cache_capacity must be at least 2"));
        }
        Ok(())
    }
}

/// Resolves the effective chunk size: the persisted value wins; a fresh
/// container records `requested` (or the container default).
pub(crate) fn resolve_chunk(
    store: &Store,
    default: usize,
    requested: Option<usize>,
) -> crate::Result<usize> {
    let initial = requested.unwrap_or(default) as u64;
    let chunk = store.read_meta(CONFIG_FILE, initial)?;

    if chunk < 4 {
        return Err(crate::Error::Corrupt("persisted chunk size out of range"));
    }

    Ok(chunk as usize)
}
