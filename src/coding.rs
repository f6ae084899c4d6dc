// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Canonical binary encoding for everything the engine persists.
//!
//! Values are written with a one-byte type tag followed by the payload, so a
//! mistyped file is rejected at decode time instead of being reinterpreted.
//! Integers use varints, strings are length-prefixed UTF-8, sequences are
//! count-prefixed. Composite engine structs (segment refs, dict entries)
//! write their fields back to back without an extra tag, like any other
//! fixed-schema wire struct.

use varint_rs::{VarintReader, VarintWriter};

pub mod tag {
    pub const UNIT: u8 = 0x01;
    pub const BOOL: u8 = 0x02;
    pub const UINT: u8 = 0x03;
    pub const INT: u8 = 0x04;
    pub const STR: u8 = 0x05;
    pub const SEQ: u8 = 0x06;
    pub const PAIR: u8 = 0x07;
}

/// Error during serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodeError({self:?})")
    }
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Error during deserialization.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// The value on disk carries a different type tag than the one expected.
    InvalidTag { expected: u8, got: u8 },

    /// Invalid or unsupported file header.
    InvalidHeader,

    /// A string payload is not valid UTF-8.
    Utf8,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecodeError({self:?})")
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Trait to serialize stuff
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a fresh buffer.
    fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut v = vec![];
        self.encode_into(&mut v)?;
        Ok(v)
    }
}

/// Trait to deserialize stuff
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

pub(crate) fn write_tag<W: std::io::Write>(writer: &mut W, tag: u8) -> Result<(), EncodeError> {
    writer.write_all(&[tag])?;
    Ok(())
}

pub(crate) fn expect_tag<R: std::io::Read>(reader: &mut R, expected: u8) -> Result<(), DecodeError> {
    let mut buf = [0];
    reader.read_exact(&mut buf)?;

    if buf[0] == expected {
        Ok(())
    } else {
        Err(DecodeError::InvalidTag {
            expected,
            got: buf[0],
        })
    }
}

impl Encode for () {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_tag(writer, tag::UNIT)
    }
}

impl Decode for () {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        expect_tag(reader, tag::UNIT)
    }
}

impl Encode for bool {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_tag(writer, tag::BOOL)?;
        writer.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

impl Decode for bool {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        expect_tag(reader, tag::BOOL)?;
        let mut buf = [0];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

macro_rules! impl_uint_coding {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                    write_tag(writer, tag::UINT)?;
                    writer.write_u64_varint(u64::from(*self))?;
                    Ok(())
                }
            }

            impl Decode for $t {
                fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
                    expect_tag(reader, tag::UINT)?;
                    let value = reader.read_u64_varint()?;
                    <$t>::try_from(value).map_err(|_| DecodeError::InvalidHeader)
                }
            }
        )*
    };
}

impl_uint_coding!(u8, u16, u32, u64);

impl Encode for usize {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_tag(writer, tag::UINT)?;
        writer.write_u64_varint(*self as u64)?;
        Ok(())
    }
}

impl Decode for usize {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        expect_tag(reader, tag::UINT)?;
        let value = reader.read_u64_varint()?;
        usize::try_from(value).map_err(|_| DecodeError::InvalidHeader)
    }
}

macro_rules! impl_int_coding {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                    write_tag(writer, tag::INT)?;
                    writer.write_i64_varint(i64::from(*self))?;
                    Ok(())
                }
            }

            impl Decode for $t {
                fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
                    expect_tag(reader, tag::INT)?;
                    let value = reader.read_i64_varint()?;
                    <$t>::try_from(value).map_err(|_| DecodeError::InvalidHeader)
                }
            }
        )*
    };
}

impl_int_coding!(i8, i16, i32, i64);

impl Encode for String {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_tag(writer, tag::STR)?;
        writer.write_u64_varint(self.len() as u64)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl Decode for String {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        expect_tag(reader, tag::STR)?;
        let len = reader.read_u64_varint()? as usize;
        let mut buf = vec![0; len];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| DecodeError::Utf8)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_tag(writer, tag::SEQ)?;
        writer.write_u64_varint(self.len() as u64)?;

        for item in self {
            item.encode_into(writer)?;
        }

        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        expect_tag(reader, tag::SEQ)?;
        let len = reader.read_u64_varint()? as usize;

        let mut items = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            items.push(T::decode_from(reader)?);
        }

        Ok(items)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_tag(writer, tag::PAIR)?;
        self.0.encode_into(writer)?;
        self.1.encode_into(writer)
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        expect_tag(reader, tag::PAIR)?;
        let a = A::decode_from(reader)?;
        let b = B::decode_from(reader)?;
        Ok((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn roundtrip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = value.encode_to_vec().expect("should encode");
        let mut reader = &bytes[..];
        let read = T::decode_from(&mut reader).expect("should decode");
        assert_eq!(value, read);
        assert!(reader.is_empty(), "decode should consume the whole payload");
    }

    #[test]
    fn coding_primitives() {
        roundtrip(());
        roundtrip(true);
        roundtrip(0u64);
        roundtrip(u64::MAX);
        roundtrip(1_234_567usize);
        roundtrip(-1i64);
        roundtrip(i64::MIN);
        roundtrip(String::from("hello world"));
        roundtrip(String::new());
    }

    #[test]
    fn coding_compound() {
        roundtrip(vec![1u64, 2, 3]);
        roundtrip(Vec::<String>::new());
        roundtrip((42u64, String::from("abc")));
        roundtrip(vec![(1u64, String::from("a")), (2, String::from("b"))]);
    }

    #[test]
    fn coding_rejects_mistyped() {
        let bytes = 42u64.encode_to_vec().expect("should encode");
        let mut reader = &bytes[..];

        let result = String::decode_from(&mut reader);
        assert!(matches!(
            result,
            Err(DecodeError::InvalidTag {
                expected: tag::STR,
                got: tag::UINT,
            })
        ));
    }
}
