//! Order-preserving key encodings.
//!
//! Keys are stored as raw bytes and compared lexicographically by the store,
//! so every encoding here preserves the natural ordering of its type:
//! - `u64`: 8-byte big-endian
//! - `i64`: 8-byte big-endian with the sign bit flipped
//! - `String`: UTF-8 bytes, `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x00`
//! - `DateTime<Utc>`: seconds as `i64` followed by nanoseconds as big-endian `u32`
//! - tuples: concatenation of their members
//!
//! Every encoding is self-delimiting and no string encoding is a prefix of
//! another, so tuples of keys form composite keys
//! whose prefix can be scanned (all entries for one index term, for example).

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};

const SIGN_BIT: u64 = 1 << 63;
const STRING_MARK: u8 = 0x00;
const STRING_ESCAPED_NUL: u8 = 0xFF;
const STRING_END: u8 = 0x00;

/// Key type discriminant, recorded in schema declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Zero-width key (an index without a priority).
    Unit,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 64-bit integer.
    I64,
    /// Escaped, terminated UTF-8 string.
    Str,
    /// UTC timestamp.
    Time,
    /// Tuple of other keys.
    Composite,
}

/// Types usable as bucket keys, index terms, priorities or targets.
pub trait Key: Sized {
    /// The key type discriminant.
    const KIND: KeyKind;

    /// Appends the encoded key to `buf`.
    fn encode_key(&self, buf: &mut Vec<u8>);

    /// Decodes a key from the front of `buf`.
    ///
    /// Returns the key and the number of bytes consumed, or `None` if `buf`
    /// does not start with a valid encoding.
    fn decode_key(buf: &[u8]) -> Option<(Self, usize)>;

    /// Encodes the key into a fresh buffer.
    fn to_key_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_key(&mut buf);
        buf
    }

    /// Decodes a key that must span the whole of `buf`.
    fn from_key_bytes(buf: &[u8]) -> Option<Self> {
        let (key, used) = Self::decode_key(buf)?;
        (used == buf.len()).then_some(key)
    }
}

/// Integer-valued keys eligible for id allocation.
pub trait IntKey: Key + Copy {
    /// Builds a key from its numeric value.
    fn from_u64(value: u64) -> Self;

    /// Returns the numeric value of the key.
    fn as_u64(&self) -> u64;
}

impl Key for () {
    const KIND: KeyKind = KeyKind::Unit;

    fn encode_key(&self, _buf: &mut Vec<u8>) {}

    fn decode_key(_buf: &[u8]) -> Option<(Self, usize)> {
        Some(((), 0))
    }
}

impl Key for u64 {
    const KIND: KeyKind = KeyKind::U64;

    fn encode_key(&self, buf: &mut Vec<u8>) {
        let mut raw = [0u8; 8];
        BigEndian::write_u64(&mut raw, *self);
        buf.extend_from_slice(&raw);
    }

    fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() >= 8 { Some((BigEndian::read_u64(buf), 8)) } else { None }
    }
}

impl IntKey for u64 {
    fn from_u64(value: u64) -> Self {
        value
    }

    fn as_u64(&self) -> u64 {
        *self
    }
}

impl Key for i64 {
    const KIND: KeyKind = KeyKind::I64;

    fn encode_key(&self, buf: &mut Vec<u8>) {
        // i64::MIN -> 0x00.., -1 -> 0x7F.., 0 -> 0x80.., i64::MAX -> 0xFF..
        ((*self as u64) ^ SIGN_BIT).encode_key(buf);
    }

    fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
        u64::decode_key(buf).map(|(raw, used)| ((raw ^ SIGN_BIT) as i64, used))
    }
}

impl Key for String {
    const KIND: KeyKind = KeyKind::Str;

    fn encode_key(&self, buf: &mut Vec<u8>) {
        for &byte in self.as_bytes() {
            buf.push(byte);
            if byte == STRING_MARK {
                buf.push(STRING_ESCAPED_NUL);
            }
        }
        buf.extend_from_slice(&[STRING_MARK, STRING_END]);
    }

    fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < buf.len() {
            let byte = buf[pos];
            if byte != STRING_MARK {
                out.push(byte);
                pos += 1;
                continue;
            }
            match *buf.get(pos + 1)? {
                STRING_ESCAPED_NUL => {
                    out.push(STRING_MARK);
                    pos += 2;
                },
                STRING_END => return String::from_utf8(out).ok().map(|s| (s, pos + 2)),
                _ => return None,
            }
        }
        None
    }
}

impl Key for DateTime<Utc> {
    const KIND: KeyKind = KeyKind::Time;

    fn encode_key(&self, buf: &mut Vec<u8>) {
        self.timestamp().encode_key(buf);
        let mut nanos = [0u8; 4];
        BigEndian::write_u32(&mut nanos, self.timestamp_subsec_nanos());
        buf.extend_from_slice(&nanos);
    }

    fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
        let (secs, used) = i64::decode_key(buf)?;
        let rest = buf.get(used..used + 4)?;
        let nanos = BigEndian::read_u32(rest);
        DateTime::from_timestamp(secs, nanos).map(|ts| (ts, used + 4))
    }
}

impl<A: Key, B: Key> Key for (A, B) {
    const KIND: KeyKind = KeyKind::Composite;

    fn encode_key(&self, buf: &mut Vec<u8>) {
        self.0.encode_key(buf);
        self.1.encode_key(buf);
    }

    fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
        let (a, used_a) = A::decode_key(buf)?;
        let (b, used_b) = B::decode_key(&buf[used_a..])?;
        Some(((a, b), used_a + used_b))
    }
}

impl<A: Key, B: Key, C: Key> Key for (A, B, C) {
    const KIND: KeyKind = KeyKind::Composite;

    fn encode_key(&self, buf: &mut Vec<u8>) {
        self.0.encode_key(buf);
        self.1.encode_key(buf);
        self.2.encode_key(buf);
    }

    fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
        let (a, used_a) = A::decode_key(buf)?;
        let (b, used_b) = B::decode_key(&buf[used_a..])?;
        let (c, used_c) = C::decode_key(&buf[used_a + used_b..])?;
        Some(((a, b, c), used_a + used_b + used_c))
    }
}
