//! Binary frame scanning for the PX409 continuous-streaming mode.
//!
//! Frame format:
//! - SYNC (1 byte): 0xAA
//! - TYPE (1 byte): packet type, never 0xAA
//! - PAYLOAD (4 logical bytes): little-endian IEEE-754 f32. A payload byte equal
//!   to 0xAA is followed by a duplicate 0xAA which is dropped on receive.
//!
//! There is no length or checksum field. A frame is recognised purely by the
//! sync byte followed by a non-sync byte.

use heapless::Vec;
use log::{debug, warn};

use crate::{PAYLOAD_LEN, RESIDUAL_CAPACITY, SYNC};

/// Outcome of scanning a chunk for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameResult {
    /// A complete frame was found. Holds the unstuffed payload in wire order.
    Decoded([u8; PAYLOAD_LEN]),
    /// No complete frame yet. Read more bytes and try again.
    Incomplete,
}

enum Scan {
    Frame { payload: [u8; PAYLOAD_LEN], end: usize },
    Partial { start: usize },
    // A payload 0xAA without its duplicate: the frame was cut short and a new
    // one starts at `resync`.
    Broken { resync: usize },
    NoSync,
}

// Finds the first frame in `buf`. `end` is the index just past the consumed bytes.
// With `check_stuffing`, a 0xAA in the payload must be followed by another 0xAA,
// and a trailing one waits for the byte after it.
fn locate(buf: &[u8], check_stuffing: bool) -> Scan {
    let Some(sync) = buf
        .windows(2)
        .position(|pair| pair[0] == SYNC && pair[1] != SYNC)
    else {
        return Scan::NoSync;
    };

    let mut payload = [0u8; PAYLOAD_LEN];
    let mut cursor = sync + 2; // skip sync and packet type
    for slot in payload.iter_mut() {
        let Some(&byte) = buf.get(cursor) else {
            return Scan::Partial { start: sync };
        };
        if byte == SYNC && check_stuffing {
            match buf.get(cursor + 1) {
                Some(&SYNC) => {}
                Some(_) => return Scan::Broken { resync: cursor },
                // Duplicate or new frame: only the next byte tells.
                None => return Scan::Partial { start: sync },
            }
        }
        *slot = byte;
        // A stuffed 0xAA occupies two raw positions.
        cursor += if byte == SYNC { 2 } else { 1 };
    }

    Scan::Frame {
        payload,
        end: cursor.min(buf.len()),
    }
}

/// Scans a single chunk for a frame, starting over from the sync search on every call.
///
/// Bytes of a frame cut off at the end of `chunk` are dropped; use
/// [`StreamScanner`] to keep them for the next read.
pub fn scan(chunk: &[u8]) -> FrameResult {
    match locate(chunk, false) {
        Scan::Frame { payload, .. } => FrameResult::Decoded(payload),
        Scan::Partial { .. } | Scan::Broken { .. } | Scan::NoSync => FrameResult::Incomplete,
    }
}

/// Converts a frame payload into the engineering-unit value it carries.
///
/// NaN and infinities pass through unchanged.
pub fn decode(payload: [u8; PAYLOAD_LEN]) -> f32 {
    f32::from_le_bytes(payload)
}

/// Frame scanner that keeps unconsumed bytes between reads.
///
/// A frame split across two serial reads is reassembled instead of lost.
/// Bytes that can never start a frame are dropped, and the buffer is bounded
/// by [`RESIDUAL_CAPACITY`]; on overflow the oldest bytes go first.
#[derive(Debug, Clone, Default)]
pub struct StreamScanner {
    residual: Vec<u8, RESIDUAL_CAPACITY>,
}

impl StreamScanner {
    /// Creates a scanner with nothing buffered.
    pub fn new() -> Self {
        Self {
            residual: Vec::new(),
        }
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        let tail = &chunk[chunk.len().saturating_sub(RESIDUAL_CAPACITY)..];
        let overflow = (self.residual.len() + tail.len()).saturating_sub(RESIDUAL_CAPACITY);
        if overflow > 0 || tail.len() < chunk.len() {
            warn!(
                "Residual buffer full, dropping {} bytes",
                overflow + (chunk.len() - tail.len())
            );
            self.discard(overflow);
        }
        if self.residual.extend_from_slice(tail).is_err() {
            warn!("Residual buffer rejected {} bytes", tail.len());
        }
    }

    /// Pulls the next complete frame out of the buffered bytes.
    ///
    /// Call repeatedly until it returns [`FrameResult::Incomplete`] to drain
    /// every frame already received.
    pub fn next_frame(&mut self) -> FrameResult {
        loop {
            match locate(&self.residual, true) {
                Scan::Frame { payload, end } => {
                    debug!("Frame found: {:02X?}", &self.residual[..end]);
                    self.discard(end);
                    return FrameResult::Decoded(payload);
                }
                Scan::Partial { start } => {
                    self.discard(start);
                    return FrameResult::Incomplete;
                }
                Scan::Broken { resync } => {
                    debug!("Dropping truncated frame: {:02X?}", &self.residual[..resync]);
                    self.discard(resync);
                }
                Scan::NoSync => {
                    // A trailing sync byte may still be followed by a packet type.
                    let keep = usize::from(self.residual.last() == Some(&SYNC));
                    self.discard(self.residual.len() - keep);
                    return FrameResult::Incomplete;
                }
            }
        }
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.residual.len()
    }

    fn discard(&mut self, count: usize) {
        let count = count.min(self.residual.len());
        if count == 0 {
            return;
        }
        let len = self.residual.len();
        self.residual.copy_within(count.., 0);
        self.residual.truncate(len - count);
    }
}
