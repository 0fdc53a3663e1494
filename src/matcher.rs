//! Rolling-scan delta matcher.
//!
//! Streams the basis once against a signature's weak-checksum index and
//! emits copy/literal operations whose ranges tile the basis exactly.
//! Memory stays bounded: the index is O(block count), the scan buffer is
//! one block plus a refill chunk, and only the pending literal grows with
//! unmatched data.

use std::collections::HashMap;
use std::io::Read;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::io::read_full;
use crate::rolling::Adler32;
use crate::signature::Signature;
use crate::strong::strong_digest;

/// Refill granularity for the sliding scan buffer.
const SCAN_CHUNK: usize = 64 * 1024;

/// One reconstruction instruction.
///
/// Operations are emitted in output order with strictly increasing
/// `write_offset`, covering `[0, basis_len)` without gaps or overlaps,
/// and must be applied in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Copy one reference block into the output
    Copy {
        /// Output position this operation writes at
        write_offset: i64,
        /// Which reference block, by sequence number
        source_sequence: u32,
        /// Bytes to copy (the block's stored length)
        block_length: u32,
    },

    /// Write bytes that have no match in the reference
    Literal {
        /// Output position this operation writes at
        write_offset: i64,
        /// The bytes themselves
        data: Vec<u8>,
    },
}

impl Delta {
    /// Output position this operation writes at.
    pub fn write_offset(&self) -> i64 {
        match self {
            Delta::Copy { write_offset, .. } => *write_offset,
            Delta::Literal { write_offset, .. } => *write_offset,
        }
    }

    /// Bytes this operation contributes to the output.
    pub fn len(&self) -> u64 {
        match self {
            Delta::Copy { block_length, .. } => *block_length as u64,
            Delta::Literal { data, .. } => data.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Delta::Copy { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Delta::Literal { .. })
    }
}

/// Counters from one delta computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    /// Operations emitted
    pub ops: u64,

    /// Bytes the receiver already has (sum of copy lengths)
    pub bytes_copied: u64,

    /// Bytes that must travel as literals
    pub bytes_literal: u64,

    /// Total basis length scanned
    pub basis_len: u64,
}

impl DeltaStats {
    /// Share of the basis covered by copies, in percent.
    pub fn savings_percent(&self) -> f64 {
        if self.basis_len == 0 {
            0.0
        } else {
            (self.bytes_copied as f64 / self.basis_len as f64) * 100.0
        }
    }

    /// True when the delta transfers less than the whole basis.
    pub fn is_beneficial(&self) -> bool {
        self.bytes_literal < self.basis_len
    }
}

/// Sliding scan buffer: one block of window plus spare for refills.
struct ScanBuffer<R: Read> {
    reader: R,
    buf: Vec<u8>,
    start: usize,
    len: usize,
    eof: bool,
}

impl<R: Read> ScanBuffer<R> {
    fn new(reader: R, block: usize) -> Self {
        // spare at least a full block so compaction amortizes away
        let cap = block + block.max(SCAN_CHUNK);
        Self {
            reader,
            buf: vec![0u8; cap],
            start: 0,
            len: 0,
            eof: false,
        }
    }

    fn available(&self) -> usize {
        self.len - self.start
    }

    /// Compact consumed bytes away and read until full or EOF.
    fn refill(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.len, 0);
            self.len -= self.start;
            self.start = 0;
        }
        let n = read_full(&mut self.reader, &mut self.buf[self.len..])
            .map_err(|e| Error::io("reading basis stream", e))?;
        self.eof = self.len + n < self.buf.len();
        self.len += n;
        Ok(())
    }

    fn window(&self, size: usize) -> &[u8] {
        &self.buf[self.start..self.start + size]
    }

    fn byte_at(&self, offset: usize) -> u8 {
        self.buf[self.start + offset]
    }

    fn consume(&mut self, count: usize) {
        self.start += count;
    }
}

/// Compute the delta from a signature's reference to the basis stream,
/// handing each operation to `on_delta` as soon as it is final.
///
/// This is the streaming core; [`compute_delta`] collects into a list
/// and the stream-to-stream wrapper in the crate root encodes to a
/// writer. A weak-index hit is confirmed with the strong digest before
/// any copy is emitted, candidates being tried in sequence order, so the
/// result is deterministic for identical inputs.
pub fn compute_delta_with<R, F>(sig: &Signature, basis: R, mut on_delta: F) -> Result<DeltaStats>
where
    R: Read,
    F: FnMut(Delta) -> Result<()>,
{
    sig.validate()?;

    let block = sig.block_size as usize;

    debug!(
        block_size = sig.block_size,
        block_count = sig.block_count(),
        "starting delta scan"
    );

    // weak -> sequences, full-length blocks only; candidate lists keep
    // sequence order so the first strong match is the lowest block
    let mut index: HashMap<u32, Vec<u32>> = HashMap::new();
    for pair in &sig.pairs {
        if pair.length == sig.block_size {
            index.entry(pair.weak).or_default().push(pair.sequence);
        }
    }
    // a short final block can only ever match the basis tail
    let short_last = sig.pairs.last().filter(|p| p.length < sig.block_size);

    let mut scan = ScanBuffer::new(basis, block);
    let mut rolling = Adler32::new(block);
    let mut rolling_seeded = false;
    let mut pending: Vec<u8> = Vec::new();
    let mut abs_pos: u64 = 0;
    let mut stats = DeltaStats::default();
    let mut last_progress = 0u64;

    loop {
        // keep a window plus one lookahead byte while the stream lasts
        if scan.available() < block + 1 {
            scan.refill()?;
        }
        if scan.available() < block {
            break;
        }

        if abs_pos / (10 * 1024 * 1024) > last_progress {
            last_progress = abs_pos / (10 * 1024 * 1024);
            trace!(
                pos_mb = abs_pos / (1024 * 1024),
                ops = stats.ops,
                bytes_copied = stats.bytes_copied,
                "delta scan progress"
            );
        }

        if !rolling_seeded {
            rolling.update_block(scan.window(block));
            rolling_seeded = true;
        }

        if let Some(candidates) = index.get(&rolling.digest()) {
            let strong = strong_digest(scan.window(block));
            if let Some(&seq) = candidates
                .iter()
                .find(|&&seq| sig.pairs[seq as usize].strong == strong)
            {
                flush_literal(&mut pending, abs_pos, &mut stats, &mut on_delta)?;
                emit_copy(seq, sig.block_size, abs_pos, &mut stats, &mut on_delta)?;
                scan.consume(block);
                abs_pos += block as u64;
                rolling_seeded = false;
                continue;
            }
        }

        // no verified match at this position; the front byte joins the
        // pending literal and the window slides by one
        pending.push(scan.byte_at(0));
        if scan.available() > block {
            rolling.roll(scan.byte_at(0), scan.byte_at(block));
        } else {
            rolling_seeded = false;
        }
        scan.consume(1);
        abs_pos += 1;
    }

    // tail: fewer than block_size bytes remain, so the only possible
    // match left is the final reference block when it is short and the
    // very end of the basis lines up with its length
    if let Some(last) = short_last {
        let target = last.length as usize;
        if scan.available() >= target {
            while scan.available() > target {
                pending.push(scan.byte_at(0));
                scan.consume(1);
                abs_pos += 1;
            }
            let tail = scan.window(target);
            if Adler32::hash(tail) == last.weak && strong_digest(tail) == last.strong {
                flush_literal(&mut pending, abs_pos, &mut stats, &mut on_delta)?;
                emit_copy(last.sequence, last.length, abs_pos, &mut stats, &mut on_delta)?;
                scan.consume(target);
                abs_pos += target as u64;
            }
        }
    }
    while scan.available() > 0 {
        pending.push(scan.byte_at(0));
        scan.consume(1);
        abs_pos += 1;
    }
    flush_literal(&mut pending, abs_pos, &mut stats, &mut on_delta)?;

    stats.basis_len = abs_pos;
    debug!(
        ops = stats.ops,
        bytes_copied = stats.bytes_copied,
        bytes_literal = stats.bytes_literal,
        basis_len = stats.basis_len,
        "delta scan complete"
    );
    Ok(stats)
}

/// Compute the delta as an in-memory operation list.
pub fn compute_delta<R: Read>(sig: &Signature, basis: R) -> Result<Vec<Delta>> {
    let mut ops = Vec::new();
    compute_delta_with(sig, basis, |op| {
        ops.push(op);
        Ok(())
    })?;
    Ok(ops)
}

fn flush_literal<F>(
    pending: &mut Vec<u8>,
    end_pos: u64,
    stats: &mut DeltaStats,
    on_delta: &mut F,
) -> Result<()>
where
    F: FnMut(Delta) -> Result<()>,
{
    if pending.is_empty() {
        return Ok(());
    }
    let write_offset = (end_pos - pending.len() as u64) as i64;
    stats.ops += 1;
    stats.bytes_literal += pending.len() as u64;
    on_delta(Delta::Literal {
        write_offset,
        data: std::mem::take(pending),
    })
}

fn emit_copy<F>(
    sequence: u32,
    block_length: u32,
    write_offset: u64,
    stats: &mut DeltaStats,
    on_delta: &mut F,
) -> Result<()>
where
    F: FnMut(Delta) -> Result<()>,
{
    stats.ops += 1;
    stats.bytes_copied += block_length as u64;
    on_delta(Delta::Copy {
        write_offset: write_offset as i64,
        source_sequence: sequence,
        block_length,
    })
}
