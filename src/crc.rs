//! CRC-16/CCITT (poly 0x1021, seed 0xFFFF, non-reflected) as used by both the
//! primary-link frame trailer and the side-channel control frame.
//!
//! This is the `CRC-16/CCITT-FALSE` catalog entry, which the `crc` crate
//! exposes as [`crc::CRC_16_IBM_3740`] — same table the teacher already
//! pulls `crc` in for (its inter-board protocol uses `CRC_16_IBM_SDLC`
//! instead, a reflected variant; we need the non-reflected one to match the
//! byte-for-byte algorithm this protocol was distilled from).

use crc::{Crc, CRC_16_IBM_3740};

const ALGO: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC-16/CCITT of `bytes`, seeded at 0xFFFF.
pub fn crc16(bytes: &[u8]) -> u16 {
    ALGO.checksum(bytes)
}

/// Compute the CRC-16/CCITT over two concatenated slices without allocating.
pub fn crc16_two(a: &[u8], b: &[u8]) -> u16 {
    let mut digest = ALGO.digest();
    digest.update(a);
    digest.update(b);
    digest.finalize()
}
