// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Directory schema and codec.
//!
//! A container root holds fixed-name metadata files (`config`, `counter`,
//! `filenames`, `lens`, `mins`, `paths`) plus one `<id>.seg` file per
//! segment. Every persisted file opens with a magic tag and the on-disk
//! format version; metadata rewrites are atomic swaps, segment files are
//! written whole.

use crate::{
    coding::{Decode, DecodeError, Encode},
    id::SegmentId,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

pub const CONFIG_FILE: &str = "config";
pub const COUNTER_FILE: &str = "counter";
pub const FILENAMES_FILE: &str = "filenames";
pub const LENS_FILE: &str = "lens";
pub const MINS_FILE: &str = "mins";
pub const PATHS_FILE: &str = "paths";

pub const SEGMENT_EXT: &str = "seg";
pub const LIST_FOLDER: &str = "list";

const MAGIC_BYTES: [u8; 3] = *b"BGC";
const FORMAT_VERSION: u16 = 0;
const HEADER_LEN: usize = MAGIC_BYTES.len() + 2;

/// Stamps the magic tag and format version onto a fresh file buffer.
pub(crate) fn write_file_header<W: std::io::Write>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(&MAGIC_BYTES)?;
    writer.write_all(&FORMAT_VERSION.to_be_bytes())
}

/// Consumes and validates the header, rejecting foreign files and formats
/// newer than this build understands.
pub(crate) fn read_file_header<R: std::io::Read>(reader: &mut R) -> crate::Result<()> {
    let mut buf = [0; HEADER_LEN];
    reader.read_exact(&mut buf)?;

    if buf[..MAGIC_BYTES.len()] != MAGIC_BYTES {
        return Err(crate::Error::Corrupt("not a big-collections file"));
    }

    let version = u16::from_be_bytes([buf[3], buf[4]]);
    if version != FORMAT_VERSION {
        return Err(crate::Error::Corrupt("unsupported on-disk format version"));
    }

    Ok(())
}

/// Swaps new content over `path`: the bytes land in a sibling temp file
/// first, which is then renamed into place and synced.
pub(crate) fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let folder = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(folder)?;
    tmp.write_all(content)?;
    let file = tmp.persist(path)?;

    // Windows cannot sync a freshly renamed handle; best-effort durability
    // tolerates that
    #[cfg(not(target_os = "windows"))]
    file.sync_all()?;

    #[cfg(target_os = "windows")]
    drop(file);

    Ok(())
}

/// Identity of a segment: which root it lives in, and its minted id.
///
/// `root` indexes the canonical root order recorded in the `paths` file.
/// Single-root containers always use root 0.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct SegmentRef {
    pub root: u16,
    pub id: SegmentId,
}

impl SegmentRef {
    pub fn new(root: u16, id: SegmentId) -> Self {
        Self { root, id }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{SEGMENT_EXT}", self.id)
    }
}

impl std::fmt::Display for SegmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.root, self.id)
    }
}

impl Encode for SegmentRef {
    fn encode_into<W: std::io::Write>(
        &self,
        writer: &mut W,
    ) -> Result<(), crate::coding::EncodeError> {
        u64::from(self.root).encode_into(writer)?;
        self.id.encode_into(writer)
    }
}

impl Decode for SegmentRef {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let root = u64::decode_from(reader)?;
        let id = SegmentId::decode_from(reader)?;

        Ok(Self {
            root: u16::try_from(root).map_err(|_| DecodeError::InvalidHeader)?,
            id,
        })
    }
}

const COMPRESSION_NONE: u8 = 0;

#[cfg(feature = "lz4")]
const COMPRESSION_LZ4: u8 = 1;

/// Resolves paths inside a container's root (or striped roots) and owns the
/// segment + metadata codec.
pub struct Store {
    roots: Vec<PathBuf>,
}

impl Store {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        debug_assert!(!roots.is_empty());
        Self { roots }
    }

    /// The primary root, which carries the metadata files.
    #[must_use]
    pub fn primary(&self) -> &Path {
        // NOTE: Checked in the constructor
        #[allow(clippy::expect_used)]
        self.roots.first().expect("store should have a root")
    }

    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn segment_path(&self, segment: SegmentRef) -> PathBuf {
        let root: &Path = self
            .roots
            .get(usize::from(segment.root))
            .map_or_else(|| self.primary(), PathBuf::as_path);

        root.join(segment.file_name())
    }

    pub fn write_segment<T: Encode>(&self, segment: SegmentRef, items: &[T]) -> crate::Result<()> {
        let mut payload = vec![];
        (items.len() as u64).encode_into(&mut payload)?;
        for item in items {
            item.encode_into(&mut payload)?;
        }
        let checksum = xxh3_64(&payload);

        let mut bytes = vec![];
        write_file_header(&mut bytes)?;

        #[cfg(feature = "lz4")]
        {
            bytes.write_u8(COMPRESSION_LZ4)?;
            bytes.extend(lz4_flex::compress_prepend_size(&payload));
        }

        #[cfg(not(feature = "lz4"))]
        {
            bytes.write_u8(COMPRESSION_NONE)?;
            bytes.extend(&payload);
        }

        bytes.write_u64::<LittleEndian>(checksum)?;

        log::trace!(
            "writing segment {segment} with {} items ({}B)",
            items.len(),
            bytes.len(),
        );

        std::fs::write(self.segment_path(segment), bytes)?;

        Ok(())
    }

    pub fn read_segment<T: Decode>(&self, segment: SegmentRef) -> crate::Result<Vec<T>> {
        let bytes = std::fs::read(self.segment_path(segment))?;

        if bytes.len() < HEADER_LEN + 1 + 8 {
            return Err(crate::Error::Corrupt("truncated segment file"));
        }

        let mut reader = &bytes[..];
        read_file_header(&mut reader)?;

        let compression = reader.read_u8()?;

        let (body, mut trailer) = reader.split_at(reader.len() - 8);
        let checksum = trailer.read_u64::<LittleEndian>()?;

        let payload = match compression {
            COMPRESSION_NONE => body.to_vec(),

            #[cfg(feature = "lz4")]
            COMPRESSION_LZ4 => lz4_flex::decompress_size_prepended(body)
                .map_err(|_| crate::Error::Corrupt("segment decompression failed"))?,

            _ => return Err(crate::Error::Corrupt("unknown segment compression")),
        };

        if xxh3_64(&payload) != checksum {
            return Err(crate::Error::Corrupt("segment checksum mismatch"));
        }

        let mut reader = &payload[..];
        let item_count = u64::decode_from(&mut reader)? as usize;

        let mut items = Vec::with_capacity(item_count.min(1 << 16));
        for _ in 0..item_count {
            items.push(T::decode_from(&mut reader)?);
        }

        log::trace!("read segment {segment} with {item_count} items");

        Ok(items)
    }

    pub fn delete_segment(&self, segment: SegmentRef) -> crate::Result<()> {
        log::trace!("deleting segment {segment}");
        std::fs::remove_file(self.segment_path(segment))?;
        Ok(())
    }

    /// Reads a metadata file, bootstrapping it with `default` if absent.
    ///
    /// This is the only way metadata files come into existence.
    pub fn read_meta<T: Encode + Decode>(&self, name: &str, default: T) -> crate::Result<T> {
        let path = self.primary().join(name);

        if path.try_exists()? {
            let bytes = std::fs::read(&path)?;
            let mut reader = &bytes[..];
            read_file_header(&mut reader)?;

            Ok(T::decode_from(&mut reader)?)
        } else {
            self.write_meta(name, &default)?;
            Ok(default)
        }
    }

    /// Atomically rewrites a metadata file.
    pub fn write_meta<T: Encode>(&self, name: &str, value: &T) -> crate::Result<()> {
        Self::write_meta_in(self.primary(), name, value)
    }

    /// Reads a metadata file in an arbitrary folder, returning `None` if the
    /// file does not exist. Used for per-root files (`paths`).
    pub fn read_meta_in<T: Decode>(folder: &Path, name: &str) -> crate::Result<Option<T>> {
        let path = folder.join(name);

        if !path.try_exists()? {
            return Ok(None);
        }

        let bytes = std::fs::read(&path)?;
        let mut reader = &bytes[..];
        read_file_header(&mut reader)?;

        Ok(Some(T::decode_from(&mut reader)?))
    }

    /// Atomically rewrites a metadata file in an arbitrary folder.
    pub fn write_meta_in<T: Encode>(folder: &Path, name: &str, value: &T) -> crate::Result<()> {
        let mut bytes = vec![];
        write_file_header(&mut bytes)?;
        value.encode_into(&mut bytes)?;
        replace_file(&folder.join(name), &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn store_segment_roundtrip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(vec![dir.path().into()]);

        let segment = SegmentRef::new(0, 7);
        let items: Vec<i64> = (0..100).collect();

        store.write_segment(segment, &items)?;
        let read: Vec<i64> = store.read_segment(segment)?;
        assert_eq!(items, read);

        store.delete_segment(segment)?;
        assert!(!store.segment_path(segment).try_exists()?);

        Ok(())
    }

    #[test]
    fn store_segment_checksum_mismatch() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(vec![dir.path().into()]);

        let segment = SegmentRef::new(0, 0);
        store.write_segment(segment, &[1i64, 2, 3])?;

        let path = store.segment_path(segment);
        let mut bytes = std::fs::read(&path)?;
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        std::fs::write(&path, bytes)?;

        let result: crate::Result<Vec<i64>> = store.read_segment(segment);
        assert!(matches!(result, Err(crate::Error::Corrupt(_))));

        Ok(())
    }

    #[test]
    fn store_meta_bootstrap() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(vec![dir.path().into()]);

        let lens: Vec<u64> = store.read_meta(LENS_FILE, vec![])?;
        assert!(lens.is_empty());
        assert!(dir.path().join(LENS_FILE).try_exists()?);

        store.write_meta(LENS_FILE, &vec![1u64, 2, 3])?;
        let lens: Vec<u64> = store.read_meta(LENS_FILE, vec![])?;
        assert_eq!(vec![1, 2, 3], lens);

        Ok(())
    }

    #[test]
    fn store_meta_rewrite_replaces_whole_file() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(vec![dir.path().into()]);

        // A chunk-size override followed by a correction; the last write wins
        store.write_meta(CONFIG_FILE, &1_024u64)?;
        store.write_meta(CONFIG_FILE, &64u64)?;

        let chunk: u64 = store.read_meta(CONFIG_FILE, 0)?;
        assert_eq!(64, chunk);

        // The swap leaves no temp litter behind
        let mut names = vec![];
        for entry in std::fs::read_dir(dir.path())? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(vec![CONFIG_FILE.to_string()], names);

        Ok(())
    }

    #[test]
    fn store_rejects_foreign_file() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(vec![dir.path().into()]);

        std::fs::write(dir.path().join(COUNTER_FILE), b"ZIP\x00\x00rest")?;

        let result: crate::Result<u64> = store.read_meta(COUNTER_FILE, 0);
        assert!(matches!(result, Err(crate::Error::Corrupt(_))));

        Ok(())
    }

    #[test]
    fn store_rejects_future_format_version() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(vec![dir.path().into()]);

        let mut bytes = MAGIC_BYTES.to_vec();
        bytes.extend(9u16.to_be_bytes());
        std::fs::write(dir.path().join(COUNTER_FILE), bytes)?;

        let result: crate::Result<u64> = store.read_meta(COUNTER_FILE, 0);
        assert!(matches!(result, Err(crate::Error::Corrupt(_))));

        Ok(())
    }

    #[test]
    fn store_header_roundtrip() -> crate::Result<()> {
        let mut bytes = vec![];
        write_file_header(&mut bytes)?;
        assert_eq!(HEADER_LEN, bytes.len());

        let mut reader = &bytes[..];
        read_file_header(&mut reader)?;
        assert!(reader.is_empty());

        Ok(())
    }
}
