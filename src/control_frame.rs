//! Side-channel control frame: SLIP-framed, CRC-protected, HMAC-authenticated
//! (§6). Carries its own small command set, independent of the primary link.

extern crate alloc;

use alloc::vec::Vec;

use crate::crc::crc16;
use crate::error::ControlError;
use crate::hmac16::{self, TAG_LEN};

pub const MAGIC: u8 = 0xF1;
pub const VERSION: u8 = 0x01;
pub const HDR_LEN: usize = 6;
pub const CRC_LEN: usize = 2;
pub const HMAC_LEN: usize = TAG_LEN;
pub const MIN_LEN: usize = HDR_LEN + CRC_LEN + HMAC_LEN;
pub const MAX_PAYLOAD: usize = 240;

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ControlFlags: u8 {
        const RESPONSE = 0x01;
        const ERROR    = 0x02;
    }
}

/// Control command IDs (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    InjectReport = 0x01,
    ListInterfaces = 0x02,
    SetLogLevel = 0x03,
    GetReportDesc = 0x04,
    GetReportLayout = 0x05,
    GetDeviceId = 0x06,
}

impl Command {
    pub fn from_u8(b: u8) -> Option<Command> {
        match b {
            0x01 => Some(Command::InjectReport),
            0x02 => Some(Command::ListInterfaces),
            0x03 => Some(Command::SetLogLevel),
            0x04 => Some(Command::GetReportDesc),
            0x05 => Some(Command::GetReportLayout),
            0x06 => Some(Command::GetDeviceId),
            _ => None,
        }
    }

    /// GET_DEVICE_ID always authenticates with the bootstrap key: it's the
    /// one command a board must answer before it has ever derived a session
    /// key (§6 key rollover).
    pub fn always_bootstrap(self) -> bool {
        matches!(self, Command::GetDeviceId)
    }
}

/// Control-layer error codes carried in an `ERROR`-flagged response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    BadLen = 1,
    InjectFailed = 2,
    DescMissing = 3,
    LayoutMissing = 4,
}

/// Which key validated an inbound frame's HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Derived,
    Bootstrap,
}

/// A parsed, HMAC-verified control frame borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame<'a> {
    pub seq: u8,
    pub cmd: u8,
    pub flags: ControlFlags,
    pub payload: &'a [u8],
}

/// Build and HMAC-sign a control frame into `out`.
pub fn build(
    seq: u8,
    cmd: u8,
    flags: ControlFlags,
    payload: &[u8],
    key: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), ControlError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ControlError::BadLen);
    }
    let start = out.len();
    out.push(MAGIC);
    out.push(VERSION);
    out.push(flags.bits());
    out.push(seq);
    out.push(cmd);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);

    let crc = crc16(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());

    let mac = hmac16::tag(key, &out[start..]);
    out.extend_from_slice(&mac);
    Ok(())
}

/// Build a frame into a fresh `Vec`.
pub fn build_vec(seq: u8, cmd: u8, flags: ControlFlags, payload: &[u8], key: &[u8]) -> Result<Vec<u8>, ControlError> {
    let mut out = Vec::with_capacity(MIN_LEN + payload.len());
    build(seq, cmd, flags, payload, key, &mut out)?;
    Ok(out)
}

/// Parse and authenticate a complete control frame.
///
/// Tries `derived_key` first if given, then falls back to `bootstrap_key`
/// (§6 rollover): a board that hasn't derived its session key yet, or a host
/// that hasn't learned it, still gets through on the shared bootstrap secret.
pub fn parse_and_verify<'a>(
    bytes: &'a [u8],
    derived_key: Option<&[u8]>,
    bootstrap_key: &[u8],
) -> Result<(ControlFrame<'a>, KeyKind), ControlError> {
    if bytes.len() < MIN_LEN {
        return Err(ControlError::Malformed);
    }
    if bytes[0] != MAGIC || bytes[1] != VERSION {
        return Err(ControlError::Malformed);
    }
    let payload_len = bytes[5] as usize;
    let total_len = HDR_LEN + payload_len + CRC_LEN + HMAC_LEN;
    if bytes.len() != total_len {
        return Err(ControlError::BadLen);
    }

    let crc_region = &bytes[..HDR_LEN + payload_len];
    let declared_crc = u16::from_le_bytes([bytes[HDR_LEN + payload_len], bytes[HDR_LEN + payload_len + 1]]);
    if crc16(crc_region) != declared_crc {
        return Err(ControlError::BadCrc);
    }

    let signed_region = &bytes[..HDR_LEN + payload_len + CRC_LEN];
    let mut tag = [0u8; HMAC_LEN];
    tag.copy_from_slice(&bytes[HDR_LEN + payload_len + CRC_LEN..total_len]);

    let key_kind = if let Some(dk) = derived_key {
        if hmac16::verify(dk, signed_region, &tag) {
            Some(KeyKind::Derived)
        } else if hmac16::verify(bootstrap_key, signed_region, &tag) {
            Some(KeyKind::Bootstrap)
        } else {
            None
        }
    } else if hmac16::verify(bootstrap_key, signed_region, &tag) {
        Some(KeyKind::Bootstrap)
    } else {
        None
    };

    let Some(key_kind) = key_kind else {
        return Err(ControlError::BadAuth);
    };

    Ok((
        ControlFrame {
            seq: bytes[3],
            cmd: bytes[4],
            flags: ControlFlags::from_bits_truncate(bytes[2]),
            payload: &bytes[HDR_LEN..HDR_LEN + payload_len],
        },
        key_kind,
    ))
}
