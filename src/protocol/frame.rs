//! Host frame format.
//!
//! A frame is `AB CD <cmd> <len> [payload...] <checksum>` where `len` counts
//! every byte from the first magic byte up to but not including the checksum,
//! and the checksum is the 8-bit wrapping sum of those `len` bytes.

pub const MAGIC1: u8 = 0xAB;
pub const MAGIC2: u8 = 0xCD;

/// Byte offsets within a frame, relative to the first magic byte.
pub mod idx {
    pub const CMD: usize = 2;
    pub const LEN: usize = 3;
    pub const PAYLOAD: usize = 4;
}

pub const CMD_SEND_DIAG: u8 = 0x01;
pub const CMD_SEND_INFO: u8 = 0x02;
pub const CMD_SEND_SETTINGS: u8 = 0x03;
pub const CMD_SAVE_SETTINGS: u8 = 0x04;

/// Shortest well-formed `len`: magic pair, command, the length byte itself.
pub const FRAME_MIN_LEN: usize = 4;

/// 8-bit wrapping sum.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Location of a verified frame inside the receive buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FrameRef {
    /// Offset of the first magic byte.
    pub start: usize,
    pub cmd: u8,
    /// Checksummed length, including header but not the checksum byte.
    pub len: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScanOutcome {
    /// No magic pair anywhere in the buffer.
    NoMagic,
    /// Magic found but the frame is truncated or fails its checksum. The
    /// buffer is left alone so a later poll can retry once more bytes land.
    BadChecksum,
    Frame(FrameRef),
}

/// Find the first magic pair and verify the frame at it. One frame per scan;
/// anything after the first magic is ignored until the next poll.
pub fn scan(buf: &[u8]) -> ScanOutcome {
    let start = match buf
        .windows(2)
        .position(|w| w[0] == MAGIC1 && w[1] == MAGIC2)
    {
        Some(p) => p,
        None => return ScanOutcome::NoMagic,
    };

    // Need at least the header to read the declared length.
    if start + idx::LEN >= buf.len() {
        return ScanOutcome::BadChecksum;
    }
    let len = buf[start + idx::LEN] as usize;
    if len < FRAME_MIN_LEN || start + len >= buf.len() {
        return ScanOutcome::BadChecksum;
    }

    let body = &buf[start..start + len];
    if checksum(body) != buf[start + len] {
        return ScanOutcome::BadChecksum;
    }

    ScanOutcome::Frame(FrameRef {
        start,
        cmd: buf[start + idx::CMD],
        len,
    })
}
