//! Rsync-style delta synchronization over plain `Read`/`Write` streams.
//!
//! The receiver summarizes its older copy (the "reference") as a block
//! signature. The sender scans its current copy (the "basis") against that
//! signature with a rolling checksum and emits a delta of copy/literal
//! operations. The receiver replays the delta against its reference to
//! reconstruct the basis byte-for-byte. Nothing here opens files or
//! sockets; callers own every stream and whatever transport sits between
//! the two sides.
//!
//! # Quick start
//!
//! ```
//! use std::io::Cursor;
//!
//! fn main() -> blocksync::Result<()> {
//!     let reference = b"the quick brown fox jumps over the lazy dog";
//!     let basis = b"the quick brown fox vaults over the lazy dog";
//!
//!     // receiver: describe the reference
//!     let mut signature = Vec::new();
//!     blocksync::generate_signatures(Cursor::new(reference), 8, &mut signature)?;
//!
//!     // sender: compute the delta against the basis
//!     let sig = blocksync::read_signatures(Cursor::new(&signature))?;
//!     let mut delta = Vec::new();
//!     let stats = blocksync::compute_deltas(&sig, Cursor::new(basis), &mut delta)?;
//!     assert!(stats.bytes_copied > 0);
//!
//!     // receiver: rebuild the basis from reference + delta
//!     let mut rebuilt = Vec::new();
//!     blocksync::rebuild(
//!         Cursor::new(reference),
//!         sig.block_size,
//!         Cursor::new(&delta),
//!         &mut rebuilt,
//!     )?;
//!     assert_eq!(&rebuilt[..], &basis[..]);
//!     Ok(())
//! }
//! ```

use std::io::{Read, Seek, Write};

pub mod applier;
pub mod error;
mod io;
pub mod matcher;
pub mod rolling;
pub mod signature;
pub mod strong;
pub mod wire;

// Core types
pub use error::{Error, Result};
pub use matcher::{Delta, DeltaStats};
pub use signature::{ChecksumPair, Signature};
pub use strong::{strong_digest, StrongDigest, STRONG_LEN};

// Checksum engine
pub use rolling::Adler32;

// In-memory operations
pub use applier::{apply_delta, apply_delta_stream};
pub use matcher::{compute_delta, compute_delta_with};

// Wire codecs
pub use wire::{
    read_delta_ops, read_signature, write_delta_ops, write_signature, DeltaReader, DeltaWriter,
    SIGNATURE_MAGIC,
};

/// Block size used when nothing better is known.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

const MIN_BLOCK_SIZE: u64 = 512;
const MAX_BLOCK_SIZE: u64 = 128 * 1024;

/// Pick a block size for a stream of `len` bytes: the square root,
/// clamped to `[512, 128 KiB]`. Square root balances signature size
/// against match granularity.
pub fn calculate_block_size(len: u64) -> u32 {
    let ideal = (len as f64).sqrt() as u64;
    ideal.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE) as u32
}

/// Generate the signature of `reference` and write it to `out` in wire
/// format. Returns the number of blocks described.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn generate_signatures<R: Read, W: Write>(
    reference: R,
    block_size: u32,
    out: W,
) -> Result<u32> {
    let sig = Signature::generate(reference, block_size)?;
    wire::write_signature(&sig, out)?;
    Ok(sig.block_count())
}

/// Read one signature from a wire-format stream. Trailing bytes after
/// the signature are left unread.
pub fn read_signatures<R: Read>(input: R) -> Result<Signature> {
    wire::read_signature(input)
}

/// Scan `basis` against `sig` and write the resulting delta stream to
/// `out`, operation by operation. Returns the scan statistics.
pub fn compute_deltas<R: Read, W: Write>(sig: &Signature, basis: R, out: W) -> Result<DeltaStats> {
    let mut writer = wire::DeltaWriter::new(out);
    let stats = matcher::compute_delta_with(sig, basis, |op| writer.write_op(&op))?;
    writer.finish()?;
    Ok(stats)
}

/// Rebuild the basis from `reference` plus a wire-format delta stream,
/// writing it to `out`. `block_size` must match the signature the delta
/// was computed from. Returns the bytes written.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn rebuild<R, D, W>(reference: R, block_size: u32, deltas: D, out: W) -> Result<u64>
where
    R: Read + Seek,
    D: Read,
    W: Write,
{
    applier::apply_delta_stream(reference, block_size, deltas, out)
}
