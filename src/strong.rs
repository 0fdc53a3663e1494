//! Strong confirmation digest.
//!
//! BLAKE3 truncated to 128 bits. Matching treats equal digests as equal
//! block content, so correctness rests on the collision resistance of the
//! truncated hash; that assumption is made here, once, rather than spread
//! through the matcher.

/// Width of the strong digest in bytes (128 bits).
pub const STRONG_LEN: usize = 16;

/// Truncated BLAKE3 digest of one block.
pub type StrongDigest = [u8; STRONG_LEN];

/// Compute the strong digest of `data`.
pub fn strong_digest(data: &[u8]) -> StrongDigest {
    let hash = blake3::hash(data);
    let mut out = [0u8; STRONG_LEN];
    out.copy_from_slice(&hash.as_bytes()[..STRONG_LEN]);
    out
}
