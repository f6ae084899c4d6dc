// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Errors that may occur in the storage engine or at the container surface.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// The metadata files of a container root disagree with each other
    /// (e.g. `filenames` and `lens` have different lengths), or a segment
    /// payload failed its checksum.
    Corrupt(&'static str),

    /// A multi-root container was opened with a root set that does not match
    /// the set recorded in the roots' `paths` files.
    InconsistentRootSet,

    /// A positional operation was given a rank past the end of the container.
    IndexOutOfRange,

    /// The key is not present in the dictionary.
    KeyNotFound,

    /// The value is not present in the sorted sequence (exact search).
    ValueNotFound,

    /// The requested operation is not supported by this container.
    Unsupported(&'static str),

    /// Invalid open-time configuration.
    Config(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
