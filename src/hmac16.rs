//! HMAC-SHA256, truncated to 16 bytes, authenticating the side-channel
//! control transport (§6). Key derivation and bootstrap/derived rollover
//! live in [`crate::control_frame`]; this module only wraps the primitive.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const TAG_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Compute the 16-byte truncated HMAC-SHA256 tag of `message` under `key`.
pub fn tag(key: &[u8], message: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&full[..TAG_LEN]);
    out
}

/// Constant-time-verify `candidate` against the tag of `message` under `key`.
pub fn verify(key: &[u8], message: &[u8], candidate: &[u8; TAG_LEN]) -> bool {
    let expected = tag(key, message);
    use subtle::ConstantTimeEq;
    expected.ct_eq(candidate).into()
}

/// Derive the per-board session key: `HMAC-SHA256(master_secret, board_id)`
/// (§6), truncated to the full 32-byte SHA-256 output (the derived key
/// itself is not truncated — only per-message tags are).
pub fn derive_key(master_secret: &[u8], board_unique_id: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(master_secret).expect("HMAC accepts any key length");
    mac.update(board_unique_id);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&full);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_deterministic_and_depends_on_key() {
        let a = tag(b"key-one", b"hello");
        let b = tag(b"key-one", b"hello");
        let c = tag(b"key-two", b"hello");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn verify_accepts_correct_and_rejects_tampered() {
        let t = tag(b"secret", b"payload");
        assert!(verify(b"secret", b"payload", &t));
        assert!(!verify(b"secret", b"payload-tampered", &t));
        assert!(!verify(b"wrong-secret", b"payload", &t));
    }

    #[test]
    fn derived_key_is_stable_per_board_id() {
        let k1 = derive_key(b"master", b"board-A");
        let k2 = derive_key(b"master", b"board-A");
        let k3 = derive_key(b"master", b"board-B");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }
}
