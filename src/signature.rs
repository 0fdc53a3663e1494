//! Block signatures: one checksum pair per reference block.

use std::fmt;
use std::io::Read;

use crate::error::{Error, Result};
use crate::io::read_full;
use crate::rolling::Adler32;
use crate::strong::{strong_digest, StrongDigest};

/// Checksums identifying a single reference block.
#[derive(Clone, PartialEq, Eq)]
pub struct ChecksumPair {
    /// Rolling checksum of the block (fast but collision-prone)
    pub weak: u32,

    /// Truncated BLAKE3 digest of the block (collision verification)
    pub strong: StrongDigest,

    /// Byte offset of the block within the reference stream.
    /// Informational only; -1 when unknown.
    pub offset: i64,

    /// Bytes this block covers (only the final block may be shorter
    /// than the signature's block size, never zero)
    pub length: u32,

    /// 0-based ordinal of the block. Copy operations name blocks by this
    /// index, which is what the rebuild side needs.
    pub sequence: u32,
}

impl fmt::Debug for ChecksumPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumPair")
            .field("weak", &format_args!("{:08x}", self.weak))
            .field("strong", &hex::encode(self.strong))
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Signature of a reference stream: its block size plus an ordered pair
/// per block. Carrying the block size here means the matcher and the wire
/// codec need no side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Block size the reference was partitioned with
    pub block_size: u32,

    /// Checksum pairs in sequence order
    pub pairs: Vec<ChecksumPair>,
}

impl Signature {
    /// Create an empty signature for the given block size.
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            pairs: Vec::new(),
        }
    }

    /// Number of blocks described.
    pub fn block_count(&self) -> u32 {
        self.pairs.len() as u32
    }

    /// True when the reference stream was empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Generate a signature by streaming `reader` once, one pair per
    /// `block_size` bytes. The final block may be shorter; an empty
    /// stream yields an empty signature.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn generate<R: Read>(mut reader: R, block_size: u32) -> Result<Self> {
        assert!(block_size > 0, "block_size must be nonzero");

        let mut sig = Signature::new(block_size);
        let mut buffer = vec![0u8; block_size as usize];
        let mut offset = 0u64;
        let mut sequence = 0u32;

        loop {
            let bytes_read = read_full(&mut reader, &mut buffer)
                .map_err(|e| Error::io("reading reference stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = &buffer[..bytes_read];
            sig.pairs.push(ChecksumPair {
                weak: Adler32::hash(chunk),
                strong: strong_digest(chunk),
                offset: offset as i64,
                length: bytes_read as u32,
                sequence,
            });

            offset += bytes_read as u64;
            sequence += 1;

            if bytes_read < block_size as usize {
                break;
            }
        }

        Ok(sig)
    }

    /// Generate a signature from an in-memory slice.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn from_bytes(data: &[u8], block_size: u32) -> Self {
        assert!(block_size > 0, "block_size must be nonzero");

        let mut sig = Signature::new(block_size);
        for (i, chunk) in data.chunks(block_size as usize).enumerate() {
            sig.pairs.push(ChecksumPair {
                weak: Adler32::hash(chunk),
                strong: strong_digest(chunk),
                offset: (i as u64 * block_size as u64) as i64,
                length: chunk.len() as u32,
                sequence: i as u32,
            });
        }
        sig
    }

    /// Check the structural invariants: nonzero block size, sequences
    /// contiguous from 0, every pair but the last exactly `block_size`
    /// long, the last between 1 and `block_size`.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::malformed_signature("block size is zero"));
        }
        let last = self.pairs.len().saturating_sub(1);
        for (i, pair) in self.pairs.iter().enumerate() {
            if pair.sequence != i as u32 {
                return Err(Error::malformed_signature(format!(
                    "pair {} has sequence {} (expected {})",
                    i, pair.sequence, i
                )));
            }
            if i < last && pair.length != self.block_size {
                return Err(Error::malformed_signature(format!(
                    "non-final block {} has length {} (block size {})",
                    i, pair.length, self.block_size
                )));
            }
            if pair.length == 0 || pair.length > self.block_size {
                return Err(Error::malformed_signature(format!(
                    "block {} has impossible length {} (block size {})",
                    i, pair.length, self.block_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_from_bytes_partitions_blocks() {
        let data = b"hello world, this is a test";
        let sig = Signature::from_bytes(data, 10);

        assert_eq!(sig.block_count(), 3);
        assert_eq!(sig.pairs[0].length, 10);
        assert_eq!(sig.pairs[1].length, 10);
        assert_eq!(sig.pairs[2].length, 7);
        assert_eq!(sig.pairs[1].offset, 10);
        assert_eq!(sig.pairs[2].sequence, 2);
        sig.validate().unwrap();
    }

    #[test]
    fn test_generate_matches_from_bytes() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let streamed = Signature::generate(Cursor::new(&data), 64).unwrap();
        let sliced = Signature::from_bytes(&data, 64);
        assert_eq!(streamed, sliced);
    }

    #[test]
    fn test_generate_survives_short_reads() {
        // chain() returns short counts at the seam between the halves
        let data: Vec<u8> = (0..100u8).collect();
        let reader = (&data[..37]).chain(&data[37..]);
        let sig = Signature::generate(reader, 16).unwrap();
        assert_eq!(sig, Signature::from_bytes(&data, 16));
        for pair in &sig.pairs[..sig.pairs.len() - 1] {
            assert_eq!(pair.length, 16);
        }
    }

    #[test]
    fn test_generate_empty_stream() {
        let sig = Signature::generate(Cursor::new(b""), 512).unwrap();
        assert!(sig.is_empty());
        assert_eq!(sig.block_count(), 0);
        sig.validate().unwrap();
    }

    #[test]
    fn test_exact_multiple_has_full_final_block() {
        let data = vec![7u8; 64];
        let sig = Signature::from_bytes(&data, 16);
        assert_eq!(sig.block_count(), 4);
        assert_eq!(sig.pairs[3].length, 16);
    }

    #[test]
    fn test_single_short_stream() {
        let sig = Signature::from_bytes(b"abc", 1024);
        assert_eq!(sig.block_count(), 1);
        assert_eq!(sig.pairs[0].length, 3);
        sig.validate().unwrap();
    }

    #[test]
    #[should_panic(expected = "block_size must be nonzero")]
    fn test_generate_zero_block_size_panics() {
        let _ = Signature::from_bytes(b"data", 0);
    }

    #[test]
    fn test_validate_rejects_bad_sequences() {
        let mut sig = Signature::from_bytes(b"aaaabbbbcccc", 4);
        sig.pairs[1].sequence = 5;
        assert!(matches!(
            sig.validate(),
            Err(crate::Error::MalformedSignature { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_short_middle_block() {
        let mut sig = Signature::from_bytes(b"aaaabbbbcc", 4);
        sig.pairs[0].length = 2;
        assert!(sig.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_block() {
        let mut sig = Signature::from_bytes(b"aaaabbbb", 4);
        sig.pairs[1].length = 9;
        assert!(sig.validate().is_err());
    }

    #[test]
    fn test_debug_renders_strong_as_hex() {
        let sig = Signature::from_bytes(b"abcd", 4);
        let rendered = format!("{:?}", sig.pairs[0]);
        assert!(rendered.contains(&hex::encode(sig.pairs[0].strong)));
        assert!(rendered.contains(&format!("{:08x}", sig.pairs[0].weak)));
    }
}
