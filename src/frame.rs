//! Primary-link frame layout and CRC (§3, §4.1, §6).
//!
//! `{ type:u8, cmd:u8, payload_len:u16-LE, payload[0..N], crc16:u16-LE }`,
//! `N <= 254`, frame total `<= 260` bytes. Byte-stuffing for the wire is a
//! separate concern, handled by [`crate::slip`] and [`crate::transport`].

extern crate alloc;

use alloc::vec::Vec;

use crate::crc::crc16;
use crate::error::CodecError;

pub const MAX_PAYLOAD: usize = 254;
pub const HEADER_LEN: usize = 4;
pub const CRC_LEN: usize = 2;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD + CRC_LEN;

/// Top-level frame type (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Descriptor = 1,
    Input = 2,
    Control = 3,
    Unmount = 4,
}

impl FrameKind {
    pub fn from_u8(b: u8) -> Option<FrameKind> {
        match b {
            1 => Some(FrameKind::Descriptor),
            2 => Some(FrameKind::Input),
            3 => Some(FrameKind::Control),
            4 => Some(FrameKind::Unmount),
            _ => None,
        }
    }
}

/// A parsed frame borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub cmd: u8,
    pub payload: &'a [u8],
}

/// Build a frame into `out`, appending to whatever is already there.
/// Returns an error if `payload` exceeds [`MAX_PAYLOAD`].
pub fn build(kind: FrameKind, cmd: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(CodecError::Oversize);
    }
    let start = out.len();
    out.push(kind as u8);
    out.push(cmd);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    let crc = crc16(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Build a frame into a freshly allocated `Vec`.
pub fn build_vec(kind: FrameKind, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    build(kind, cmd, payload, &mut out)?;
    Ok(out)
}

/// Parse a complete frame out of `bytes`. Never mutates any state on
/// failure — the caller just drops the buffer.
pub fn parse(bytes: &[u8]) -> Result<Frame<'_>, CodecError> {
    if bytes.len() < HEADER_LEN + CRC_LEN {
        return Err(CodecError::Short);
    }
    let kind = FrameKind::from_u8(bytes[0]).ok_or(CodecError::Short)?;
    let cmd = bytes[1];
    let payload_len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(CodecError::Oversize);
    }
    let expected_len = HEADER_LEN + payload_len + CRC_LEN;
    if bytes.len() != expected_len {
        return Err(CodecError::Short);
    }
    let body = &bytes[..HEADER_LEN + payload_len];
    let declared_crc = u16::from_le_bytes([bytes[expected_len - 2], bytes[expected_len - 1]]);
    if crc16(body) != declared_crc {
        return Err(CodecError::BadCrc);
    }
    Ok(Frame {
        kind,
        cmd,
        payload: &bytes[HEADER_LEN..HEADER_LEN + payload_len],
    })
}
