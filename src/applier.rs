//! Rebuilder: applies a delta against the reference stream.
//!
//! The reference is the only randomly accessed stream in the crate; the
//! output is written strictly sequentially, with each operation's
//! `write_offset` checked against the running output length so gaps and
//! overlaps are caught instead of silently producing a wrong stream.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::matcher::Delta;
use crate::wire::DeltaReader;

struct Rebuild<R, W> {
    reference: R,
    out: W,
    block_size: u32,
    ref_len: u64,
    block_count: u64,
    copy_buf: Vec<u8>,
    written: u64,
}

impl<R: Read + Seek, W: Write> Rebuild<R, W> {
    fn new(mut reference: R, block_size: u32, out: W) -> Result<Self> {
        assert!(block_size > 0, "block_size must be nonzero");
        let ref_len = reference
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io("sizing reference stream", e))?;
        Ok(Self {
            reference,
            out,
            block_size,
            ref_len,
            block_count: ref_len.div_ceil(block_size as u64),
            copy_buf: Vec::new(),
            written: 0,
        })
    }

    fn apply_op(&mut self, op: &Delta) -> Result<()> {
        if op.write_offset() < 0 || op.write_offset() as u64 != self.written {
            return Err(Error::malformed_delta(format!(
                "operation writes at {} but output is at {} (gap or overlap)",
                op.write_offset(),
                self.written
            )));
        }

        match op {
            Delta::Literal { data, .. } => {
                if data.is_empty() {
                    return Err(Error::malformed_delta("literal has no data"));
                }
                self.out
                    .write_all(data)
                    .map_err(|e| Error::io("writing literal data", e))?;
                self.written += data.len() as u64;
            }
            Delta::Copy {
                source_sequence,
                block_length,
                ..
            } => {
                if *source_sequence as u64 >= self.block_count {
                    return Err(Error::SequenceOutOfRange {
                        sequence: *source_sequence,
                        block_count: self.block_count,
                    });
                }
                if *block_length == 0 || *block_length > self.block_size {
                    return Err(Error::malformed_delta(format!(
                        "copy of block {} has length {} (block size {})",
                        source_sequence, block_length, self.block_size
                    )));
                }
                let offset = *source_sequence as u64 * self.block_size as u64;
                let end = offset + *block_length as u64;
                if end > self.ref_len {
                    return Err(Error::malformed_delta(format!(
                        "copy range {}..{} exceeds reference length {}",
                        offset, end, self.ref_len
                    )));
                }

                self.copy_buf.resize(*block_length as usize, 0);
                self.reference
                    .seek(SeekFrom::Start(offset))
                    .map_err(|e| Error::io("seeking reference block", e))?;
                self.reference
                    .read_exact(&mut self.copy_buf)
                    .map_err(|e| Error::io("reading reference block", e))?;
                self.out
                    .write_all(&self.copy_buf)
                    .map_err(|e| Error::io("writing copied block", e))?;
                self.written += *block_length as u64;
            }
        }
        Ok(())
    }

    fn finish(mut self, ops: u64) -> Result<u64> {
        self.out
            .flush()
            .map_err(|e| Error::io("flushing rebuilt stream", e))?;
        debug!(ops, bytes_written = self.written, "rebuild complete");
        Ok(self.written)
    }
}

/// Apply an in-memory operation list against `reference`, writing the
/// reconstructed stream to `out`. `block_size` must be the size the
/// signature was generated with. Returns the bytes written.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn apply_delta<R, W>(reference: R, block_size: u32, ops: &[Delta], out: W) -> Result<u64>
where
    R: Read + Seek,
    W: Write,
{
    let mut rebuild = Rebuild::new(reference, block_size, out)?;
    for op in ops {
        rebuild.apply_op(op)?;
    }
    rebuild.finish(ops.len() as u64)
}

/// Apply a delta stream record by record, without materializing the
/// operation list. Copy payloads never load into memory beyond one block.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn apply_delta_stream<R, D, W>(
    reference: R,
    block_size: u32,
    delta_input: D,
    out: W,
) -> Result<u64>
where
    R: Read + Seek,
    D: Read,
    W: Write,
{
    let mut rebuild = Rebuild::new(reference, block_size, out)?;
    let mut reader = DeltaReader::new(delta_input);
    let mut ops = 0u64;
    while let Some(op) = reader.read_op()? {
        rebuild.apply_op(&op)?;
        ops += 1;
    }
    rebuild.finish(ops)
}
