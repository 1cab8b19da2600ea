//! Error types for the fallible parts of the wire protocol (§7).
//!
//! Every kind here is recoverable by construction: the caller drops the
//! offending frame/record and keeps running. Nothing in this crate panics
//! outside of `#[cfg(test)]`.

/// Failure to parse a primary-link frame (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than the minimum frame header + CRC.
    Short,
    /// Declared payload length exceeds what `build` allows (254 bytes).
    Oversize,
    /// CRC-16 mismatch.
    BadCrc,
}

/// Failure to accept a side-channel control frame (§4.10, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Frame shorter than the fixed header+CRC+HMAC overhead, or the magic
    /// / version bytes didn't match.
    Malformed,
    /// Declared payload length disagreed with the frame's total length.
    BadLen,
    /// CRC-16 mismatch.
    BadCrc,
    /// Neither the derived key nor the bootstrap key produced a matching
    /// HMAC. Intentionally doesn't distinguish which check failed.
    BadAuth,
    /// Command byte not in the known command set.
    UnknownCommand,
}
