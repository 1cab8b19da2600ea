//! SLIP-style byte-stuffing shared by the primary link's frame transport and
//! the side-channel control transport (§3, §6).

extern crate alloc;

use alloc::vec::Vec;

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Escape `payload` and bracket it with `END` markers on both sides.
pub fn encode(payload: &[u8], out: &mut Vec<u8>) {
    out.push(END);
    for &b in payload {
        match b {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out.push(END);
}

/// Incremental SLIP frame assembler. Feed bytes one at a time; a `Some`
/// return means a complete frame was assembled into the caller-visible
/// buffer returned by [`Decoder::take`].
pub struct Decoder<const N: usize> {
    buf: arrayvec::ArrayVec<u8, N>,
    escaped: bool,
    overflowed: bool,
}

impl<const N: usize> Decoder<N> {
    pub const fn new() -> Self {
        Decoder {
            buf: arrayvec::ArrayVec::new_const(),
            escaped: false,
            overflowed: false,
        }
    }

    /// Feed one raw (still-stuffed) byte. Returns `true` when a complete
    /// frame is ready to be read with [`Self::take`].
    pub fn feed(&mut self, byte: u8) -> bool {
        if byte == END {
            // An END with an empty buffer is a separator, not a frame.
            if self.buf.is_empty() && !self.overflowed {
                return false;
            }
            let ready = !self.overflowed && !self.buf.is_empty();
            if self.overflowed {
                self.buf.clear();
            }
            self.overflowed = false;
            self.escaped = false;
            return ready;
        }

        if byte == ESC {
            self.escaped = true;
            return false;
        }

        let b = if self.escaped {
            self.escaped = false;
            match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                other => other,
            }
        } else {
            byte
        };

        if self.buf.try_push(b).is_err() {
            // Buffer overflow: drop the frame and resynchronize on the next END.
            self.overflowed = true;
        }
        false
    }

    /// Take the assembled frame bytes, clearing internal state for the next
    /// frame. Only meaningful immediately after `feed` returned `true`.
    pub fn take(&mut self) -> arrayvec::ArrayVec<u8, N> {
        core::mem::replace(&mut self.buf, arrayvec::ArrayVec::new_const())
    }
}

impl<const N: usize> Default for Decoder<N> {
    fn default() -> Self {
        Self::new()
    }
}
