//! On-disk format of the trace log
//!
//! ```text
//! file   := header frame*
//! header := magic "BTRL" | version u16 | reserved u16
//! frame  := len u32 | crc32(payload) u32 | payload[len]
//! payload:= op_count u32 | op*
//! op     := part_len u16 | part | key_len u32 | key | val_len u32 | val
//! ```
//!
//! All integers are little-endian. One frame holds one committed
//! [`WriteBatch`], so a batch is either fully replayed or not at all.

use crate::traits::{WriteBatch, WriteOp};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

/// File magic
pub const LOG_MAGIC: [u8; 4] = *b"BTRL";

/// Current format version
pub const LOG_FORMAT_VERSION: u16 = 1;

/// Size of the file header in bytes
pub const LOG_HEADER_SIZE: usize = 8;

/// Size of a frame header (length + checksum) in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Upper bound on a single frame payload
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Why a frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ends before the frame does (torn write)
    Incomplete {
        /// Bytes available
        have: usize,
        /// Bytes the frame needs
        needed: usize,
    },
    /// The frame is complete but invalid
    Corrupt(String),
}

/// Encode the file header
pub fn encode_header() -> [u8; LOG_HEADER_SIZE] {
    let mut out = [0u8; LOG_HEADER_SIZE];
    out[..4].copy_from_slice(&LOG_MAGIC);
    out[4..6].copy_from_slice(&LOG_FORMAT_VERSION.to_le_bytes());
    out
}

/// Validate the file header
pub fn check_header(buf: &[u8]) -> Result<(), String> {
    if buf.len() < LOG_HEADER_SIZE {
        return Err(format!("header too short: {} bytes", buf.len()));
    }
    if buf[..4] != LOG_MAGIC {
        return Err("bad magic".to_string());
    }
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != LOG_FORMAT_VERSION {
        return Err(format!("unsupported format version {}", version));
    }
    Ok(())
}

/// Encode a batch as one frame
pub fn encode_frame(batch: &WriteBatch) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.write_u32::<LittleEndian>(len_u32(batch.len())?)?;
    for op in batch.ops() {
        let part_len = u16::try_from(op.partition.len())
            .map_err(|_| invalid("partition name too long"))?;
        payload.write_u16::<LittleEndian>(part_len)?;
        payload.extend_from_slice(op.partition.as_bytes());
        payload.write_u32::<LittleEndian>(len_u32(op.key.len())?)?;
        payload.extend_from_slice(op.key.as_bytes());
        payload.write_u32::<LittleEndian>(len_u32(op.value.len())?)?;
        payload.extend_from_slice(&op.value);
    }
    if payload.len() > MAX_FRAME_SIZE {
        return Err(invalid("batch exceeds maximum frame size"));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.write_u32::<LittleEndian>(len_u32(payload.len())?)?;
    frame.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the frame at the start of `buf`
///
/// Returns the operations and the number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<(Vec<WriteOp>, usize), FrameError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Err(FrameError::Incomplete {
            have: buf.len(),
            needed: FRAME_HEADER_SIZE,
        });
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::Corrupt(format!("frame length {} too large", len)));
    }
    let needed = FRAME_HEADER_SIZE + len;
    if buf.len() < needed {
        return Err(FrameError::Incomplete {
            have: buf.len(),
            needed,
        });
    }

    let payload = &buf[FRAME_HEADER_SIZE..needed];
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(FrameError::Corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            crc, actual
        )));
    }

    let ops = decode_payload(payload).map_err(|e| FrameError::Corrupt(e.to_string()))?;
    Ok((ops, needed))
}

fn decode_payload(payload: &[u8]) -> io::Result<Vec<WriteOp>> {
    let mut cur = Cursor::new(payload);
    let count = cur.read_u32::<LittleEndian>()? as usize;
    let mut ops = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let part_len = cur.read_u16::<LittleEndian>()? as usize;
        let partition = read_string(&mut cur, part_len)?;
        let key_len = cur.read_u32::<LittleEndian>()? as usize;
        let key = read_string(&mut cur, key_len)?;
        let val_len = cur.read_u32::<LittleEndian>()? as usize;
        let value = read_bytes(&mut cur, val_len)?;
        ops.push(WriteOp {
            partition,
            key,
            value,
        });
    }
    if cur.position() as usize != payload.len() {
        return Err(invalid("trailing bytes in frame"));
    }
    Ok(ops)
}

fn read_bytes(cur: &mut Cursor<&[u8]>, len: usize) -> io::Result<Vec<u8>> {
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "field overruns frame"));
    }
    let mut out = vec![0u8; len];
    cur.read_exact(&mut out)?;
    Ok(out)
}

fn read_string(cur: &mut Cursor<&[u8]>, len: usize) -> io::Result<String> {
    String::from_utf8(read_bytes(cur, len)?).map_err(|_| invalid("field is not UTF-8"))
}

fn len_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| invalid("length exceeds u32"))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
