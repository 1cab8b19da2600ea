//! Command bytes carried by [`crate::frame::FrameKind::Control`] frames
//! (§4.8). Distinct from [`crate::control_frame`], which frames the
//! HMAC-authenticated side-channel API on its own secondary link.

pub const SET_PROTOCOL: u8 = 0x13;
pub const GET_REPORT: u8 = 0x11;
pub const SET_REPORT: u8 = 0x12;
pub const SET_IDLE: u8 = 0x14;
pub const READY: u8 = 0x10;
pub const STRING_REQ: u8 = 0x16;
pub const DEVICE_RESET: u8 = 0x15;
