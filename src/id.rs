// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, Encode},
    store::{read_file_header, replace_file, write_file_header, COUNTER_FILE},
};
use std::path::{Path, PathBuf};

/// Unique segment identifier within one container.
///
/// Minted ids are monotone and never reused, even across restarts and
/// `clear()`.
pub type SegmentId = u64;

/// Persisted monotone id allocator.
///
/// The counter file always holds the *next* id that will be handed out. It is
/// flushed before the freshly minted id becomes visible anywhere else, so a
/// crash between mint and use can at worst leak an id, never duplicate one.
pub struct IdCounter {
    path: PathBuf,
    next: SegmentId,
}

impl IdCounter {
    pub fn open(folder: &Path) -> crate::Result<Self> {
        let path = folder.join(COUNTER_FILE);

        let next = if path.try_exists()? {
            let bytes = std::fs::read(&path)?;
            let mut reader = &bytes[..];
            read_file_header(&mut reader)?;

            SegmentId::decode_from(&mut reader)?
        } else {
            let counter = Self { path, next: 0 };
            counter.persist()?;
            return Ok(counter);
        };

        Ok(Self { path, next })
    }

    /// Mints a fresh id, flushing the counter file first.
    pub fn next(&mut self) -> crate::Result<SegmentId> {
        let id = self.next;
        self.next += 1;
        self.persist()?;
        Ok(id)
    }

    #[must_use]
    pub fn peek(&self) -> SegmentId {
        self.next
    }

    fn persist(&self) -> crate::Result<()> {
        let mut bytes = vec![];
        write_file_header(&mut bytes)?;
        self.next.encode_into(&mut bytes)?;
        replace_file(&self.path, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn id_counter_monotone() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut counter = IdCounter::open(dir.path())?;
        assert_eq!(0, counter.next()?);
        assert_eq!(1, counter.next()?);
        assert_eq!(2, counter.next()?);

        Ok(())
    }

    #[test]
    fn id_counter_survives_reopen() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        {
            let mut counter = IdCounter::open(dir.path())?;
            for _ in 0..5 {
                counter.next()?;
            }
        }

        {
            let mut counter = IdCounter::open(dir.path())?;
            assert_eq!(5, counter.next()?);
        }

        Ok(())
    }
}
