//! Journal frame encoding.
//!
//! Each commit appends one frame:
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────────────────────────────┐
//! │ len: u32 LE  │ xxh3: u64 LE  │ payload (len bytes)                  │
//! └──────────────┴───────────────┴──────────────────────────────────────┘
//! payload = txn_id: u64 LE, op_count: u32 LE, op*
//! op      = tag: u8, bucket: u8 len + bytes, [key: u32 len + bytes], [value: u32 len + bytes]
//! ```
//!
//! Compaction writes a single frame that recreates every bucket and entry.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Size of the length + checksum prefix.
pub const FRAME_HEADER_SIZE: usize = 12;

const TAG_CREATE_BUCKET: u8 = 1;
const TAG_DROP_BUCKET: u8 = 2;
const TAG_PUT: u8 = 3;
const TAG_DELETE: u8 = 4;

/// A single mutation recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Creates an empty bucket.
    CreateBucket {
        /// Bucket name.
        name: String,
    },
    /// Removes a bucket and all its entries.
    DropBucket {
        /// Bucket name.
        name: String,
    },
    /// Inserts or overwrites an entry.
    Put {
        /// Bucket name.
        bucket: String,
        /// Encoded key.
        key: Vec<u8>,
        /// Encoded value.
        value: Vec<u8>,
    },
    /// Removes an entry.
    Delete {
        /// Bucket name.
        bucket: String,
        /// Encoded key.
        key: Vec<u8>,
    },
}

/// All mutations of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Transaction ID assigned at commit.
    pub txn_id: u64,
    /// Mutations in the order they were made.
    pub ops: Vec<Op>,
}

impl Frame {
    /// Encodes the frame with its length and checksum prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.txn_id.to_le_bytes());
        payload.extend_from_slice(&(self.ops.len() as u32).to_le_bytes());
        for op in &self.ops {
            encode_op(op, &mut payload);
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&xxhash_rust::xxh3::xxh3_64(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame
    }
}

fn put_short(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

fn put_long(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn encode_op(op: &Op, out: &mut Vec<u8>) {
    match op {
        Op::CreateBucket { name } => {
            out.push(TAG_CREATE_BUCKET);
            put_short(out, name.as_bytes());
        },
        Op::DropBucket { name } => {
            out.push(TAG_DROP_BUCKET);
            put_short(out, name.as_bytes());
        },
        Op::Put { bucket, key, value } => {
            out.push(TAG_PUT);
            put_short(out, bucket.as_bytes());
            put_long(out, key);
            put_long(out, value);
        },
        Op::Delete { bucket, key } => {
            out.push(TAG_DELETE);
            put_short(out, bucket.as_bytes());
            put_long(out, key);
        },
    }
}

/// Cursor over a frame payload; every read failure is corruption.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(corrupted(format!(
                "journal payload truncated at {} (wanted {n} more bytes)",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| corrupted("bucket name is not valid UTF-8".to_string()))
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

fn corrupted(reason: String) -> Error {
    Error::Corrupted { reason }
}

fn decode_payload(payload: &[u8]) -> Result<Frame> {
    let mut cursor = Cursor { data: payload, pos: 0 };
    let txn_id = cursor.u64()?;
    let count = cursor.u32()? as usize;
    // Each op needs at least two bytes.
    let mut ops = Vec::with_capacity(count.min(payload.len() / 2));
    for _ in 0..count {
        let op = match cursor.u8()? {
            TAG_CREATE_BUCKET => Op::CreateBucket { name: cursor.name()? },
            TAG_DROP_BUCKET => Op::DropBucket { name: cursor.name()? },
            TAG_PUT => Op::Put { bucket: cursor.name()?, key: cursor.blob()?, value: cursor.blob()? },
            TAG_DELETE => Op::Delete { bucket: cursor.name()?, key: cursor.blob()? },
            tag => return Err(corrupted(format!("unknown journal op tag {tag}"))),
        };
        ops.push(op);
    }
    if cursor.pos != payload.len() {
        return Err(corrupted(format!(
            "journal frame for txn {txn_id} has {} trailing bytes",
            payload.len() - cursor.pos
        )));
    }
    Ok(Frame { txn_id, ops })
}

/// Decodes every frame in a committed journal region.
///
/// The region is covered by a commit slot, so any malformed frame means
/// the file was damaged after commit.
///
/// # Errors
///
/// Returns [`Error::Corrupted`] on a short frame, checksum mismatch or
/// malformed payload.
pub fn decode_frames(region: &[u8]) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < region.len() {
        if region.len() - pos < FRAME_HEADER_SIZE {
            return Err(corrupted(format!("journal frame header truncated at offset {pos}")));
        }
        let len = LittleEndian::read_u32(&region[pos..pos + 4]) as usize;
        let checksum = LittleEndian::read_u64(&region[pos + 4..pos + FRAME_HEADER_SIZE]);
        let start = pos + FRAME_HEADER_SIZE;
        if region.len() - start < len {
            return Err(corrupted(format!("journal frame at offset {pos} truncated")));
        }
        let payload = &region[start..start + len];
        if xxhash_rust::xxh3::xxh3_64(payload) != checksum {
            return Err(corrupted(format!("journal frame at offset {pos} checksum mismatch")));
        }
        frames.push(decode_payload(payload)?);
        pos = start + len;
    }
    Ok(frames)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample() -> Frame {
        Frame {
            txn_id: 9,
            ops: vec![
                Op::CreateBucket { name: "people".to_string() },
                Op::Put { bucket: "people".to_string(), key: vec![0, 1], value: b"ada".to_vec() },
                Op::Delete { bucket: "people".to_string(), key: vec![0, 2] },
                Op::DropBucket { name: "scratch".to_string() },
            ],
        }
    }

    #[test]
    fn test_frames_decode_in_order() {
        let second = Frame { txn_id: 10, ops: vec![] };
        let mut region = sample().encode();
        region.extend(second.encode());

        let frames = decode_frames(&region).unwrap();
        assert_eq!(frames, vec![sample(), second]);
    }

    #[test]
    fn test_flipped_payload_byte_is_corruption() {
        let mut region = sample().encode();
        let last = region.len() - 1;
        region[last] ^= 0x01;
        assert!(matches!(decode_frames(&region), Err(Error::Corrupted { .. })));
    }

    #[test]
    fn test_truncated_frame_is_corruption() {
        let region = sample().encode();
        assert!(decode_frames(&region[..region.len() - 3]).is_err());
        assert!(decode_frames(&region[..5]).is_err());
    }

    #[test]
    fn test_empty_region_has_no_frames() {
        assert!(decode_frames(&[]).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode_frames(&bytes);
        }
    }
}
