//! Primary-link transport: wires together the interrupt-fed [`RxRing`], the
//! [`slip`] byte assembler and the [`frame`] codec (§4.1, §4.2). Nodes feed
//! raw bytes in from their UART ISR and pull parsed frames out on the main
//! loop; sending just encodes and hands bytes back for a blocking write.

extern crate alloc;

use alloc::vec::Vec;

use crate::error::CodecError;
use crate::frame::{self, Frame, FrameKind};
use crate::log::warn;
use crate::rx_ring::RxRing;
use crate::slip;

/// `RING` is the interrupt-fed byte ring's capacity; `FRAME` bounds one
/// assembled (post-unstuffing) frame, which must be at least
/// [`frame::MAX_FRAME_LEN`].
pub struct PrimaryLink<const RING: usize, const FRAME: usize> {
    ring: RxRing<RING>,
    decoder: slip::Decoder<FRAME>,
}

impl<const RING: usize, const FRAME: usize> PrimaryLink<RING, FRAME> {
    pub const fn new() -> Self {
        PrimaryLink {
            ring: RxRing::new(),
            decoder: slip::Decoder::new(),
        }
    }

    /// Called from UART RX interrupt context: stash one raw byte.
    pub fn on_rx_byte(&mut self, byte: u8) {
        self.ring.push(byte);
    }

    /// Drain every byte currently in the ring, assembling at most one
    /// complete SLIP frame at a time. Call in a loop from the main loop
    /// until it returns `None` to fully drain backlog.
    pub fn poll_raw(&mut self) -> Option<arrayvec::ArrayVec<u8, FRAME>> {
        while let Some(byte) = self.ring.pop() {
            if self.decoder.feed(byte) {
                return Some(self.decoder.take());
            }
        }
        None
    }

    /// Convenience: drain the ring and parse the next complete frame,
    /// surfacing codec errors instead of swallowing them. A malformed frame
    /// does not stop draining — the caller should keep calling until `None`.
    pub fn poll_frame<'a>(&mut self, scratch: &'a mut arrayvec::ArrayVec<u8, FRAME>) -> Option<Result<Frame<'a>, CodecError>> {
        let raw = self.poll_raw()?;
        *scratch = raw;
        Some(frame::parse(scratch.as_slice()))
    }

    pub fn overflow_count(&self) -> u32 {
        self.ring.overflow_count()
    }
}

impl<const RING: usize, const FRAME: usize> Default for PrimaryLink<RING, FRAME> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build and SLIP-encode a frame ready to hand to a blocking UART write.
pub fn encode_frame(kind: FrameKind, cmd: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
    let mut raw = Vec::with_capacity(frame::HEADER_LEN + payload.len() + frame::CRC_LEN);
    frame::build(kind, cmd, payload, &mut raw)?;
    slip::encode(&raw, out);
    Ok(())
}

/// Build a fully encoded frame into a fresh `Vec`.
pub fn encode_frame_vec(kind: FrameKind, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_frame(kind, cmd, payload, &mut out)?;
    Ok(out)
}

/// Log a send that took longer than `threshold_us`, matching the original's
/// slow-send diagnostic (`send_us > 2000`, §4.1 ambient logging).
pub fn warn_if_slow_send(elapsed_us: u32, threshold_us: u32, raw_len: usize, encoded_len: usize) {
    if elapsed_us > threshold_us {
        warn!(
            "primary link send slow: {}us (raw={} encoded={})",
            elapsed_us, raw_len, encoded_len
        );
    }
}

/// A platform UART driver calls this once after init with the baud it
/// actually programmed, so a silent re-clamp by the adapter doesn't go
/// unnoticed (some USB-serial bridges round to their nearest supported rate).
pub fn report_actual_baud(requested: u32, actual: u32) {
    if actual != requested {
        warn!("UART baud clamped: requested={} actual={}", requested, actual);
    }
}
