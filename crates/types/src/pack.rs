//! Versioned record codec.
//!
//! Every stored record is serialized through a single `pack` method that is
//! used for both directions: when the buffer is writing, each field is
//! appended; when it is reading, each field is overwritten from the input.
//! The first thing a record packs is its schema version:
//!
//! ```
//! use kinship_types::{Pack, PackBuffer, PackError};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Note {
//!     id: u64,
//!     body: String,
//!     pinned: bool, // added in version 2
//! }
//!
//! impl Pack for Note {
//!     fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
//!         let version = buf.version(2)?;
//!         buf.field(&mut self.id)?;
//!         buf.field(&mut self.body)?;
//!         if version >= 2 {
//!             buf.field(&mut self.pinned)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let note = Note { id: 1, body: "hi".into(), pinned: true };
//! let bytes = kinship_types::pack::encode(&note).unwrap();
//! assert_eq!(kinship_types::pack::decode::<Note>(&bytes).unwrap(), note);
//! ```
//!
//! Bytes written under an older version decode with later fields left at
//! their `Default`. Field order must never change between versions.
//!
//! # Wire format
//!
//! | type | encoding |
//! |------|----------|
//! | version, `u64`, `u32`, `u16`, lengths | LEB128 varint |
//! | `i64`, `i32` | zigzag varint |
//! | `u8`, `bool`, enum tags | one byte |
//! | `f64` | 8 bytes little-endian IEEE 754 |
//! | `String`, `Vec<T>` | varint length, then contents |
//! | `Option<T>` | tag byte, then value if present |
//! | `DateTime<Utc>` | zigzag seconds, varint nanoseconds |

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use snafu::{ResultExt, Snafu};

/// Error type for record packing.
#[derive(Debug, Snafu)]
pub enum PackError {
    /// Input ended before a field was complete.
    #[snafu(display("Unexpected end of record: needed {needed} bytes, {remaining} remaining"))]
    UnexpectedEof {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// The record was written by a newer schema than this build knows.
    #[snafu(display("Unsupported record version {found} (newest known is {supported})"))]
    UnsupportedVersion {
        /// Version tag found in the input.
        found: u16,
        /// Newest version this build can read.
        supported: u16,
    },

    /// A varint did not terminate within its width.
    #[snafu(display("Varint overflow"))]
    VarintOverflow,

    /// A string field was not valid UTF-8.
    #[snafu(display("Invalid UTF-8 in string field: {source}"))]
    InvalidUtf8 {
        /// The underlying conversion error.
        source: std::string::FromUtf8Error,
    },

    /// A one-byte tag held a value outside its type's range.
    #[snafu(display("Invalid {type_name} tag {tag}"))]
    InvalidTag {
        /// Name of the type being decoded.
        type_name: &'static str,
        /// The offending tag.
        tag: u8,
    },

    /// A timestamp field was outside the representable range.
    #[snafu(display("Invalid timestamp {seconds}s + {nanos}ns"))]
    InvalidTimestamp {
        /// Seconds since the Unix epoch.
        seconds: i64,
        /// Sub-second nanoseconds.
        nanos: u32,
    },

    /// A varint value did not fit the target integer type.
    #[snafu(display("Integer {value} out of range for {type_name}"))]
    IntegerRange {
        /// Name of the target type.
        type_name: &'static str,
        /// The decoded value.
        value: u64,
    },

    /// Bytes remained after the record was fully read.
    #[snafu(display("{remaining} trailing bytes after record"))]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
}

/// Cursor over an encoded record.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Consumes exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::UnexpectedEof`] if fewer than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], PackError> {
        let remaining = self.remaining();
        if n > remaining {
            return UnexpectedEofSnafu { needed: n, remaining }.fail();
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consumes one byte.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::UnexpectedEof`] at end of input.
    pub fn byte(&mut self) -> Result<u8, PackError> {
        Ok(self.take(1)?[0])
    }

    /// Consumes a LEB128 varint.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::VarintOverflow`] if the varint exceeds 64 bits.
    pub fn varint(&mut self) -> Result<u64, PackError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.byte()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        VarintOverflowSnafu.fail()
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// A single packable field type.
pub trait PackField: Sized {
    /// Appends the encoded field.
    fn write_to(&self, out: &mut Vec<u8>);

    /// Reads the field from the cursor.
    ///
    /// # Errors
    ///
    /// Returns a [`PackError`] if the input is truncated or malformed.
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError>;
}

/// Enumerations stored as a one-byte tag.
pub trait PackEnum: Sized {
    /// Type name used in error messages.
    const NAME: &'static str;

    /// Returns the stable tag for this variant.
    fn to_tag(&self) -> u8;

    /// Maps a tag back to its variant.
    fn from_tag(tag: u8) -> Option<Self>;
}

impl PackField for u64 {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, *self);
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        reader.varint()
    }
}

impl PackField for u32 {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(*self));
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        let value = reader.varint()?;
        u32::try_from(value).map_err(|_| PackError::IntegerRange { type_name: "u32", value })
    }
}

impl PackField for u16 {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(*self));
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        let value = reader.varint()?;
        u16::try_from(value).map_err(|_| PackError::IntegerRange { type_name: "u16", value })
    }
}

impl PackField for i64 {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, zigzag(*self));
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        reader.varint().map(unzigzag)
    }
}

impl PackField for i32 {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, zigzag(i64::from(*self)));
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        let raw = reader.varint()?;
        i32::try_from(unzigzag(raw))
            .map_err(|_| PackError::IntegerRange { type_name: "i32", value: raw })
    }
}

impl PackField for u8 {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        reader.byte()
    }
}

impl PackField for bool {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        match reader.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => InvalidTagSnafu { type_name: "bool", tag }.fail(),
        }
    }
}

impl PackField for f64 {
    fn write_to(&self, out: &mut Vec<u8>) {
        let mut raw = [0u8; 8];
        LittleEndian::write_f64(&mut raw, *self);
        out.extend_from_slice(&raw);
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        Ok(LittleEndian::read_f64(reader.take(8)?))
    }
}

impl PackField for String {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, self.len() as u64);
        out.extend_from_slice(self.as_bytes());
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        let len = read_len(reader)?;
        let bytes = reader.take(len)?;
        String::from_utf8(bytes.to_vec()).context(InvalidUtf8Snafu)
    }
}

impl PackField for DateTime<Utc> {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, zigzag(self.timestamp()));
        write_varint(out, u64::from(self.timestamp_subsec_nanos()));
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        let seconds = unzigzag(reader.varint()?);
        let raw_nanos = reader.varint()?;
        let nanos = u32::try_from(raw_nanos)
            .map_err(|_| PackError::IntegerRange { type_name: "nanos", value: raw_nanos })?;
        DateTime::from_timestamp(seconds, nanos)
            .ok_or(PackError::InvalidTimestamp { seconds, nanos })
    }
}

impl<T: PackField> PackField for Option<T> {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(value) => {
                out.push(1);
                value.write_to(out);
            },
        }
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        match reader.byte()? {
            0 => Ok(None),
            1 => T::read_from(reader).map(Some),
            tag => InvalidTagSnafu { type_name: "option", tag }.fail(),
        }
    }
}

impl<T: PackField> PackField for Vec<T> {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_varint(out, self.len() as u64);
        for item in self {
            item.write_to(out);
        }
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PackError> {
        let len = read_len(reader)?;
        // Every element takes at least one byte; cap the preallocation by what is left.
        let mut items = Vec::with_capacity(len.min(reader.remaining()));
        for _ in 0..len {
            items.push(T::read_from(reader)?);
        }
        Ok(items)
    }
}

fn read_len(reader: &mut Reader<'_>) -> Result<usize, PackError> {
    let value = reader.varint()?;
    usize::try_from(value).map_err(|_| PackError::IntegerRange { type_name: "usize", value })
}

enum Mode<'a> {
    Write(Vec<u8>),
    Read(Reader<'a>),
}

/// Bidirectional buffer handed to [`Pack::pack`].
pub struct PackBuffer<'a> {
    mode: Mode<'a>,
}

impl<'a> PackBuffer<'a> {
    /// Creates a buffer that encodes fields.
    pub fn writer() -> Self {
        Self { mode: Mode::Write(Vec::new()) }
    }

    /// Creates a buffer that decodes fields from `data`.
    pub fn reader(data: &'a [u8]) -> Self {
        Self { mode: Mode::Read(Reader::new(data)) }
    }

    /// Returns true when fields are being decoded.
    pub fn is_reading(&self) -> bool {
        matches!(self.mode, Mode::Read(_))
    }

    /// Packs the record's version tag.
    ///
    /// When writing, records `current` and returns it. When reading, returns
    /// the version found in the input, which callers compare against to skip
    /// fields the old record does not carry.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::UnsupportedVersion`] when the input is newer than
    /// `current`.
    pub fn version(&mut self, current: u16) -> Result<u16, PackError> {
        let mut version = current;
        self.field(&mut version)?;
        if version > current {
            return UnsupportedVersionSnafu { found: version, supported: current }.fail();
        }
        Ok(version)
    }

    /// Packs one field.
    ///
    /// # Errors
    ///
    /// Returns a [`PackError`] if reading and the input is malformed.
    pub fn field<V: PackField>(&mut self, value: &mut V) -> Result<(), PackError> {
        match &mut self.mode {
            Mode::Write(out) => {
                value.write_to(out);
                Ok(())
            },
            Mode::Read(reader) => {
                *value = V::read_from(reader)?;
                Ok(())
            },
        }
    }

    /// Packs an enumeration as its one-byte tag.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::InvalidTag`] if the tag is unknown.
    pub fn enumeration<E: PackEnum>(&mut self, value: &mut E) -> Result<(), PackError> {
        let mut tag = value.to_tag();
        self.field(&mut tag)?;
        if self.is_reading() {
            *value = E::from_tag(tag).ok_or(PackError::InvalidTag { type_name: E::NAME, tag })?;
        }
        Ok(())
    }

    /// Packs a nested record, including its own version tag.
    ///
    /// # Errors
    ///
    /// Propagates errors from the nested record.
    pub fn record<R: Pack>(&mut self, value: &mut R) -> Result<(), PackError> {
        value.pack(self)
    }

    fn into_bytes(self) -> Vec<u8> {
        match self.mode {
            Mode::Write(out) => out,
            Mode::Read(_) => Vec::new(),
        }
    }

    fn unread(&self) -> usize {
        match &self.mode {
            Mode::Write(_) => 0,
            Mode::Read(reader) => reader.remaining(),
        }
    }
}

/// A record with a symmetric, versioned codec.
pub trait Pack: Default {
    /// Packs every field in a fixed order, starting with the version tag.
    ///
    /// # Errors
    ///
    /// Returns a [`PackError`] if decoding malformed input.
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError>;
}

/// Scalars stored directly as bucket values. They carry no version tag:
/// changing their shape needs a new bucket.
macro_rules! bare_pack {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Pack for $ty {
                fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
                    buf.field(self)
                }
            }
        )*
    };
}

bare_pack!(u64, i64, u32, bool, String, Vec<u8>);

/// Encodes a record.
///
/// # Errors
///
/// Propagates any error raised by the record's `pack` implementation.
pub fn encode<T: Pack + Clone>(value: &T) -> Result<Vec<u8>, PackError> {
    let mut scratch = value.clone();
    let mut buf = PackBuffer::writer();
    scratch.pack(&mut buf)?;
    Ok(buf.into_bytes())
}

/// Decodes a record, requiring the input to be consumed exactly.
///
/// # Errors
///
/// Returns a [`PackError`] if the input is truncated, malformed, newer than
/// the record's current version, or followed by trailing bytes.
pub fn decode<T: Pack>(bytes: &[u8]) -> Result<T, PackError> {
    let mut value = T::default();
    let mut buf = PackBuffer::reader(bytes);
    value.pack(&mut buf)?;
    let remaining = buf.unread();
    if remaining > 0 {
        return TrailingBytesSnafu { remaining }.fail();
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Shade {
        #[default]
        Light,
        Dark,
    }

    impl PackEnum for Shade {
        const NAME: &'static str = "Shade";

        fn to_tag(&self) -> u8 {
            match self {
                Shade::Light => 0,
                Shade::Dark => 1,
            }
        }

        fn from_tag(tag: u8) -> Option<Self> {
            match tag {
                0 => Some(Shade::Light),
                1 => Some(Shade::Dark),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleV1 {
        id: u64,
        label: String,
    }

    impl Pack for SampleV1 {
        fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
            buf.version(1)?;
            buf.field(&mut self.id)?;
            buf.field(&mut self.label)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleV2 {
        id: u64,
        label: String,
        shade: Shade,
        weight: f64,
        taken: DateTime<Utc>,
        tags: Vec<String>,
    }

    impl Pack for SampleV2 {
        fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
            let version = buf.version(2)?;
            buf.field(&mut self.id)?;
            buf.field(&mut self.label)?;
            if version >= 2 {
                buf.enumeration(&mut self.shade)?;
                buf.field(&mut self.weight)?;
                buf.field(&mut self.taken)?;
                buf.field(&mut self.tags)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_old_version_bytes_decode_with_defaults() {
        let old = SampleV1 { id: 7, label: "first".to_string() };
        let bytes = encode(&old).unwrap();

        let upgraded: SampleV2 = decode(&bytes).unwrap();
        assert_eq!(upgraded.id, 7);
        assert_eq!(upgraded.label, "first");
        assert_eq!(upgraded.shade, Shade::Light);
        assert_eq!(upgraded.weight, 0.0);
        assert!(upgraded.tags.is_empty());
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let newer = SampleV2 { id: 1, ..Default::default() };
        let bytes = encode(&newer).unwrap();

        let err = decode::<SampleV1>(&bytes).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion { found: 2, supported: 1 }));
    }

    #[test]
    fn test_current_version_roundtrip() {
        let value = SampleV2 {
            id: 300,
            label: "growth".to_string(),
            shade: Shade::Dark,
            weight: 21.75,
            taken: Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap(),
            tags: vec!["a".to_string(), String::new()],
        };
        let decoded: SampleV2 = decode(&encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_truncated_input_reports_eof() {
        let bytes = encode(&SampleV1 { id: 1, label: "abcdef".to_string() }).unwrap();
        let err = decode::<SampleV1>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, PackError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&SampleV1::default()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode::<SampleV1>(&bytes).unwrap_err(),
            PackError::TrailingBytes { remaining: 1 }
        ));
    }

    #[test]
    fn test_unknown_enum_tag_rejected() {
        let mut bytes = encode(&SampleV2::default()).unwrap();
        // version, id, empty label, then the shade tag
        bytes[3] = 9;
        assert!(matches!(
            decode::<SampleV2>(&bytes).unwrap_err(),
            PackError::InvalidTag { type_name: "Shade", tag: 9 }
        ));
    }

    #[test]
    fn test_varint_layout() {
        let mut out = Vec::new();
        300u64.write_to(&mut out);
        assert_eq!(out, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_overlong_varint_rejected() {
        let bytes = [0xFFu8; 11];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(reader.varint(), Err(PackError::VarintOverflow)));
    }

    proptest! {
        #[test]
        fn prop_zigzag_inverse(value in any::<i64>()) {
            prop_assert_eq!(unzigzag(zigzag(value)), value);
        }

        #[test]
        fn prop_decode_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode::<SampleV2>(&bytes);
        }
    }
}
