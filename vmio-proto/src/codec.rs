//! Length-prefixed frames for moving packages over a byte stream.
//!
//! A frame is a big-endian `u32` payload length followed by the postcard
//! encoding of the message. Frames above [`MAX_FRAME`] are refused on both
//! ends.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Largest frame payload accepted or produced (16 MiB).
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// Wraps `e` as [`io::ErrorKind::InvalidData`].
fn invalid(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Length prefix for a payload of `len` bytes.
fn frame_len(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&n| n <= MAX_FRAME)
        .ok_or_else(|| invalid(format!("frame of {len} bytes exceeds the {MAX_FRAME} byte limit")))
}

/// Writes `msg` to `w` as one frame.
pub fn encode<W: Write>(w: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let payload = postcard::to_allocvec(msg).map_err(invalid)?;
    let len = frame_len(payload.len())?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()
}

/// Reads one frame from `r`.
pub fn decode<T: DeserializeOwned>(r: &mut impl Read) -> io::Result<T> {
    let mut prefix = [0u8; 4];
    r.read_exact(&mut prefix)?;
    let len = usize::try_from(u32::from_be_bytes(prefix)).map_err(invalid)?;
    frame_len(len)?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    postcard::from_bytes(&payload).map_err(invalid)
}
