//! Adler-32 style rolling checksum (the weak hash).
//!
//! Two 16-bit sums over the current window:
//! - `a`: sum of the window bytes (seeded at 1)
//! - `b`: sum of the running `a` values
//!
//! The digest is `(b << 16) | a`. Sliding the window one byte is O(1):
//! - `a' = (a - old + new) mod M`
//! - `b' = (b - n*old + a' - 1) mod M`
//!
//! Only the `(a, b)` state is kept; the caller owns the window bytes.

const MOD_ADLER: u32 = 65521; // largest prime below 2^16

/// Rolling weak-checksum state for a window of fixed size.
#[derive(Debug, Clone)]
pub struct Adler32 {
    a: u32,
    b: u32,
    window_size: usize,
}

impl Adler32 {
    /// Create state for windows of `window_size` bytes.
    pub fn new(window_size: usize) -> Self {
        Self {
            a: 1,
            b: 0,
            window_size,
        }
    }

    /// One-shot checksum of `data` (non-rolling).
    pub fn hash(data: &[u8]) -> u32 {
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + byte as u32) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }

    /// Seed the state from a full window. Replaces any previous state, so
    /// this is also how the scan restarts after a match.
    pub fn update_block(&mut self, window: &[u8]) {
        self.a = 1;
        self.b = 0;
        for &byte in window {
            self.a = (self.a + byte as u32) % MOD_ADLER;
            self.b = (self.b + self.a) % MOD_ADLER;
        }
    }

    /// Slide the window one byte: drop `old_byte` from the front, append
    /// `new_byte` at the back.
    ///
    /// The `MOD_ADLER * 2` / `MOD_ADLER * 3` terms keep the unsigned
    /// subtraction from underflowing.
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        let old = old_byte as u32;
        let new = new_byte as u32;

        self.a = (self.a + MOD_ADLER * 2 - old + new) % MOD_ADLER;

        // n * old can exceed u32 for very large windows, so reduce in u64.
        let n_old = ((self.window_size as u64 * old as u64) % MOD_ADLER as u64) as u32;
        self.b = (self.b + MOD_ADLER * 3 - n_old + self.a - 1) % MOD_ADLER;
    }

    /// Current checksum of the window.
    pub fn digest(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_empty_is_one() {
        assert_eq!(Adler32::hash(b""), 1);
    }

    #[test]
    fn test_hash_deterministic() {
        let data = b"blocksync weak hash";
        assert_eq!(Adler32::hash(data), Adler32::hash(data));
        assert_ne!(Adler32::hash(b"abc"), Adler32::hash(b"abd"));
    }

    #[test]
    fn test_roll_matches_static_hash() {
        let data = b"sphinx of black quartz, judge my vow";
        let window = 8;

        let mut hasher = Adler32::new(window);
        hasher.update_block(&data[0..window]);
        assert_eq!(hasher.digest(), Adler32::hash(&data[0..window]));

        for i in 1..=(data.len() - window) {
            hasher.roll(data[i - 1], data[i + window - 1]);
            assert_eq!(
                hasher.digest(),
                Adler32::hash(&data[i..i + window]),
                "rolling diverged from static at position {}",
                i
            );
        }
    }

    #[test]
    fn test_roll_all_zeros() {
        let data = vec![0u8; 64];
        let window = 10;
        let mut hasher = Adler32::new(window);
        hasher.update_block(&data[0..window]);
        for i in 1..=(data.len() - window) {
            hasher.roll(data[i - 1], data[i + window - 1]);
            assert_eq!(hasher.digest(), Adler32::hash(&data[i..i + window]));
        }
    }

    #[test]
    fn test_roll_near_modulo_boundary() {
        // 0xFF everywhere pushes both sums toward MOD_ADLER.
        let window = 256;
        let data = vec![0xFFu8; window * 3];
        let mut hasher = Adler32::new(window);
        hasher.update_block(&data[0..window]);
        for i in 1..window {
            hasher.roll(data[i - 1], data[i + window - 1]);
            assert_eq!(hasher.digest(), Adler32::hash(&data[i..i + window]));
        }
    }

    #[test]
    fn test_roll_repeating_pattern() {
        let mut data = Vec::new();
        for _ in 0..80 {
            data.extend_from_slice(b"WXYZ");
        }
        let window = 32;
        let mut hasher = Adler32::new(window);
        hasher.update_block(&data[0..window]);
        for i in 1..=(data.len() - window) {
            hasher.roll(data[i - 1], data[i + window - 1]);
            assert_eq!(hasher.digest(), Adler32::hash(&data[i..i + window]));
        }
    }

    #[test]
    fn test_roll_large_window() {
        let window = 128 * 1024;
        let mut data = vec![0u8; window + 16];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let mut hasher = Adler32::new(window);
        hasher.update_block(&data[0..window]);
        for i in 1..=16 {
            hasher.roll(data[i - 1], data[i + window - 1]);
        }
        assert_eq!(hasher.digest(), Adler32::hash(&data[16..16 + window]));
    }

    #[test]
    fn test_reseed_restarts_state() {
        let mut hasher = Adler32::new(4);
        hasher.update_block(b"abcd");
        hasher.roll(b'a', b'e');
        hasher.update_block(b"abcd");
        assert_eq!(hasher.digest(), Adler32::hash(b"abcd"));
    }

    #[test]
    fn test_known_weak_collision() {
        // Distinct windows with identical checksums; the scan relies on the
        // strong digest to tell these apart.
        let x = [0u8, 2, 1];
        let y = [1u8, 0, 2];
        assert_ne!(x, y);
        assert_eq!(Adler32::hash(&x), Adler32::hash(&y));
    }
}
