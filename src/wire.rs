//! Wire formats for signature and delta streams.
//!
//! All multi-byte integers are big-endian.
//!
//! Signature stream: `magic:u32 | block_size:u32 | block_count:u32`, then
//! `block_count` records of `weak:u32 | strong:16 bytes | length:u32`.
//! Sequence numbers are implicit record indices. The stream is
//! self-delimiting, so it may be embedded in a larger one.
//!
//! Delta stream: records of `tag:u8 | write_offset:i64 | ...` until EOF.
//! Copy carries `source_sequence:u32 | block_length:u32`; Literal carries
//! `length:u32` followed by that many data bytes.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::io::read_full;
use crate::matcher::Delta;
use crate::signature::{ChecksumPair, Signature};
use crate::strong::{StrongDigest, STRONG_LEN};

/// Magic prefix of a signature stream ("BSG1")
pub const SIGNATURE_MAGIC: u32 = 0x4253_4731;

const SIGNATURE_HEADER_LEN: usize = 12;
const SIGNATURE_RECORD_LEN: usize = 4 + STRONG_LEN + 4;

const TAG_COPY: u8 = 0x00;
const TAG_LITERAL: u8 = 0x01;

/// Cap on up-front allocation from length fields. Counts in a hostile
/// header must not translate into a giant reservation before any data
/// has actually arrived; growth past this stays incremental.
const PREALLOC_LIMIT: usize = 64 * 1024;

// =============================================================================
// Signature stream
// =============================================================================

/// Write `sig` to `out` in wire format.
///
/// The pairs are checked against the signature invariants first, so a
/// hand-assembled signature with holes never reaches the wire.
pub fn write_signature<W: Write>(sig: &Signature, mut out: W) -> Result<()> {
    sig.validate()?;

    let mut buf = BytesMut::with_capacity(SIGNATURE_HEADER_LEN);
    buf.put_u32(SIGNATURE_MAGIC);
    buf.put_u32(sig.block_size);
    buf.put_u32(sig.block_count());
    out.write_all(&buf)
        .map_err(|e| Error::io("writing signature header", e))?;

    for pair in &sig.pairs {
        buf.clear();
        buf.put_u32(pair.weak);
        buf.put_slice(&pair.strong);
        buf.put_u32(pair.length);
        out.write_all(&buf)
            .map_err(|e| Error::io("writing signature record", e))?;
    }
    out.flush()
        .map_err(|e| Error::io("flushing signature stream", e))?;
    Ok(())
}

/// Read one signature from `input`.
///
/// Consumes exactly the header plus `block_count` records and stops;
/// trailing bytes are left unread for the caller. Any structural problem
/// (bad magic, zero block size, truncation, impossible record lengths)
/// is [`Error::MalformedSignature`].
pub fn read_signature<R: Read>(mut input: R) -> Result<Signature> {
    let mut header = [0u8; SIGNATURE_HEADER_LEN];
    let n = read_full(&mut input, &mut header)
        .map_err(|e| Error::io("reading signature header", e))?;
    if n < SIGNATURE_HEADER_LEN {
        return Err(Error::malformed_signature(format!(
            "header truncated ({} of {} bytes)",
            n, SIGNATURE_HEADER_LEN
        )));
    }

    let mut fields = &header[..];
    let magic = fields.get_u32();
    if magic != SIGNATURE_MAGIC {
        return Err(Error::malformed_signature(format!(
            "bad magic {:#010x} (expected {:#010x})",
            magic, SIGNATURE_MAGIC
        )));
    }
    let block_size = fields.get_u32();
    if block_size == 0 {
        return Err(Error::malformed_signature("header block size is zero"));
    }
    let block_count = fields.get_u32();

    let mut sig = Signature {
        block_size,
        pairs: Vec::with_capacity((block_count as usize).min(PREALLOC_LIMIT)),
    };

    let mut record = [0u8; SIGNATURE_RECORD_LEN];
    for i in 0..block_count {
        let n = read_full(&mut input, &mut record)
            .map_err(|e| Error::io("reading signature record", e))?;
        if n < SIGNATURE_RECORD_LEN {
            return Err(Error::malformed_signature(format!(
                "record {} of {} truncated",
                i, block_count
            )));
        }

        let mut fields = &record[..];
        let weak = fields.get_u32();
        let mut strong: StrongDigest = [0u8; STRONG_LEN];
        fields.copy_to_slice(&mut strong);
        let length = fields.get_u32();

        let is_last = i + 1 == block_count;
        if (!is_last && length != block_size) || length == 0 || length > block_size {
            return Err(Error::malformed_signature(format!(
                "record {} has length {} (block size {})",
                i, length, block_size
            )));
        }

        sig.pairs.push(ChecksumPair {
            weak,
            strong,
            offset: (i as u64 * block_size as u64) as i64,
            length,
            sequence: i,
        });
    }

    Ok(sig)
}

// =============================================================================
// Delta stream
// =============================================================================

/// Incremental delta-stream encoder over any writer.
pub struct DeltaWriter<W: Write> {
    out: W,
    buf: BytesMut,
}

impl<W: Write> DeltaWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buf: BytesMut::with_capacity(32),
        }
    }

    /// Append one operation to the stream.
    pub fn write_op(&mut self, op: &Delta) -> Result<()> {
        self.buf.clear();
        match op {
            Delta::Copy {
                write_offset,
                source_sequence,
                block_length,
            } => {
                if *write_offset < 0 {
                    return Err(Error::malformed_delta(format!(
                        "copy has negative write offset {}",
                        write_offset
                    )));
                }
                if *block_length == 0 {
                    return Err(Error::malformed_delta("copy has zero block length"));
                }
                self.buf.put_u8(TAG_COPY);
                self.buf.put_i64(*write_offset);
                self.buf.put_u32(*source_sequence);
                self.buf.put_u32(*block_length);
                self.out
                    .write_all(&self.buf)
                    .map_err(|e| Error::io("writing copy record", e))?;
            }
            Delta::Literal { write_offset, data } => {
                if *write_offset < 0 {
                    return Err(Error::malformed_delta(format!(
                        "literal has negative write offset {}",
                        write_offset
                    )));
                }
                if data.is_empty() {
                    return Err(Error::malformed_delta("literal has no data"));
                }
                if data.len() > u32::MAX as usize {
                    return Err(Error::malformed_delta(format!(
                        "literal of {} bytes exceeds the u32 wire limit",
                        data.len()
                    )));
                }
                self.buf.put_u8(TAG_LITERAL);
                self.buf.put_i64(*write_offset);
                self.buf.put_u32(data.len() as u32);
                self.out
                    .write_all(&self.buf)
                    .map_err(|e| Error::io("writing literal record", e))?;
                self.out
                    .write_all(data)
                    .map_err(|e| Error::io("writing literal data", e))?;
            }
        }
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out
            .flush()
            .map_err(|e| Error::io("flushing delta stream", e))?;
        Ok(self.out)
    }
}

/// Incremental delta-stream decoder over any reader.
///
/// Reference validity of copy operations is not checked here (the codec
/// has no block count); the rebuild side owns that.
pub struct DeltaReader<R: Read> {
    input: R,
}

impl<R: Read> DeltaReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Read the next operation, or `None` at a clean end of stream.
    ///
    /// EOF is only valid between records; anything else is
    /// [`Error::MalformedDelta`].
    pub fn read_op(&mut self) -> Result<Option<Delta>> {
        let mut tag = [0u8; 1];
        let n = read_full(&mut self.input, &mut tag)
            .map_err(|e| Error::io("reading delta record", e))?;
        if n == 0 {
            return Ok(None);
        }

        match tag[0] {
            TAG_COPY => {
                let mut record = [0u8; 16];
                let n = read_full(&mut self.input, &mut record)
                    .map_err(|e| Error::io("reading copy record", e))?;
                if n < record.len() {
                    return Err(Error::malformed_delta("copy record truncated"));
                }
                let mut fields = &record[..];
                let write_offset = fields.get_i64();
                let source_sequence = fields.get_u32();
                let block_length = fields.get_u32();
                if write_offset < 0 {
                    return Err(Error::malformed_delta(format!(
                        "copy has negative write offset {}",
                        write_offset
                    )));
                }
                if block_length == 0 {
                    return Err(Error::malformed_delta("copy has zero block length"));
                }
                Ok(Some(Delta::Copy {
                    write_offset,
                    source_sequence,
                    block_length,
                }))
            }
            TAG_LITERAL => {
                let mut record = [0u8; 12];
                let n = read_full(&mut self.input, &mut record)
                    .map_err(|e| Error::io("reading literal record", e))?;
                if n < record.len() {
                    return Err(Error::malformed_delta("literal record truncated"));
                }
                let mut fields = &record[..];
                let write_offset = fields.get_i64();
                let length = fields.get_u32();
                if write_offset < 0 {
                    return Err(Error::malformed_delta(format!(
                        "literal has negative write offset {}",
                        write_offset
                    )));
                }
                if length == 0 {
                    return Err(Error::malformed_delta("literal has no data"));
                }

                let mut data = Vec::with_capacity((length as usize).min(PREALLOC_LIMIT));
                let got = (&mut self.input)
                    .take(length as u64)
                    .read_to_end(&mut data)
                    .map_err(|e| Error::io("reading literal data", e))?;
                if got < length as usize {
                    return Err(Error::malformed_delta(format!(
                        "literal data truncated ({} of {} bytes)",
                        got, length
                    )));
                }
                Ok(Some(Delta::Literal { write_offset, data }))
            }
            other => Err(Error::malformed_delta(format!(
                "unknown record tag {:#04x}",
                other
            ))),
        }
    }
}

/// Write a complete operation list as one delta stream.
pub fn write_delta_ops<W: Write>(ops: &[Delta], out: W) -> Result<()> {
    let mut writer = DeltaWriter::new(out);
    for op in ops {
        writer.write_op(op)?;
    }
    writer.finish()?;
    Ok(())
}

/// Read a delta stream to EOF into an operation list.
pub fn read_delta_ops<R: Read>(input: R) -> Result<Vec<Delta>> {
    let mut reader = DeltaReader::new(input);
    let mut ops = Vec::new();
    while let Some(op) = reader.read_op()? {
        ops.push(op);
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_signature() -> Signature {
        Signature::from_bytes(b"the quick brown fox jumps over the lazy dog", 8)
    }

    #[test]
    fn test_signature_roundtrip() {
        let sig = sample_signature();
        let mut encoded = Vec::new();
        write_signature(&sig, &mut encoded).unwrap();
        assert_eq!(
            encoded.len(),
            SIGNATURE_HEADER_LEN + sig.pairs.len() * SIGNATURE_RECORD_LEN
        );
        let decoded = read_signature(Cursor::new(&encoded)).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn test_signature_magic_bytes() {
        let mut encoded = Vec::new();
        write_signature(&Signature::new(4096), &mut encoded).unwrap();
        assert_eq!(&encoded[0..4], b"BSG1");
    }

    #[test]
    fn test_empty_signature_roundtrip() {
        let sig = Signature::new(512);
        let mut encoded = Vec::new();
        write_signature(&sig, &mut encoded).unwrap();
        assert_eq!(encoded.len(), SIGNATURE_HEADER_LEN);
        let decoded = read_signature(Cursor::new(&encoded)).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.block_size, 512);
    }

    #[test]
    fn test_read_signature_rejects_bad_magic() {
        let mut encoded = Vec::new();
        write_signature(&sample_signature(), &mut encoded).unwrap();
        encoded[0] = 0xFF;
        let err = read_signature(Cursor::new(&encoded)).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature { .. }), "{err}");
    }

    #[test]
    fn test_read_signature_rejects_zero_block_size() {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(b"BSG1");
        encoded.extend_from_slice(&0u32.to_be_bytes());
        encoded.extend_from_slice(&0u32.to_be_bytes());
        assert!(read_signature(Cursor::new(&encoded)).is_err());
    }

    #[test]
    fn test_read_signature_rejects_truncation() {
        let mut encoded = Vec::new();
        write_signature(&sample_signature(), &mut encoded).unwrap();

        // mid-header
        let err = read_signature(Cursor::new(&encoded[..7])).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature { .. }));

        // mid-record
        let err = read_signature(Cursor::new(&encoded[..encoded.len() - 5])).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature { .. }));

        // whole record missing
        let cut = encoded.len() - SIGNATURE_RECORD_LEN;
        let err = read_signature(Cursor::new(&encoded[..cut])).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature { .. }));
    }

    #[test]
    fn test_read_signature_rejects_bad_record_length() {
        let sig = sample_signature();
        let mut encoded = Vec::new();
        write_signature(&sig, &mut encoded).unwrap();
        // corrupt the length field of record 0 (last 4 bytes of the record)
        let pos = SIGNATURE_HEADER_LEN + SIGNATURE_RECORD_LEN - 4;
        encoded[pos..pos + 4].copy_from_slice(&3u32.to_be_bytes());
        assert!(read_signature(Cursor::new(&encoded)).is_err());
    }

    #[test]
    fn test_read_signature_leaves_trailing_bytes() {
        let sig = sample_signature();
        let mut encoded = Vec::new();
        write_signature(&sig, &mut encoded).unwrap();
        let sig_len = encoded.len();
        encoded.extend_from_slice(b"TRAILER");

        let mut cursor = Cursor::new(&encoded);
        let decoded = read_signature(&mut cursor).unwrap();
        assert_eq!(decoded, sig);
        assert_eq!(cursor.position() as usize, sig_len);
    }

    #[test]
    fn test_write_signature_rejects_invalid_pairs() {
        let mut sig = sample_signature();
        sig.pairs[2].sequence = 9;
        let mut out = Vec::new();
        assert!(write_signature(&sig, &mut out).is_err());
    }

    #[test]
    fn test_delta_roundtrip() {
        let ops = vec![
            Delta::Copy {
                write_offset: 0,
                source_sequence: 0,
                block_length: 8,
            },
            Delta::Literal {
                write_offset: 8,
                data: b"spliced in".to_vec(),
            },
            Delta::Copy {
                write_offset: 18,
                source_sequence: 3,
                block_length: 5,
            },
        ];
        let mut encoded = Vec::new();
        write_delta_ops(&ops, &mut encoded).unwrap();
        let decoded = read_delta_ops(Cursor::new(&encoded)).unwrap();
        assert_eq!(decoded, ops);
    }

    #[test]
    fn test_empty_delta_stream_is_valid() {
        let ops = read_delta_ops(Cursor::new(b"")).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_delta_reader_rejects_unknown_tag() {
        let mut encoded = vec![0x7Fu8];
        encoded.extend_from_slice(&[0u8; 16]);
        let err = read_delta_ops(Cursor::new(&encoded)).unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { .. }), "{err}");
    }

    #[test]
    fn test_delta_reader_rejects_truncated_copy() {
        let ops = vec![Delta::Copy {
            write_offset: 0,
            source_sequence: 1,
            block_length: 4,
        }];
        let mut encoded = Vec::new();
        write_delta_ops(&ops, &mut encoded).unwrap();
        let err = read_delta_ops(Cursor::new(&encoded[..encoded.len() - 1])).unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { .. }));
    }

    #[test]
    fn test_delta_reader_rejects_truncated_literal_data() {
        let ops = vec![Delta::Literal {
            write_offset: 0,
            data: b"some literal bytes".to_vec(),
        }];
        let mut encoded = Vec::new();
        write_delta_ops(&ops, &mut encoded).unwrap();
        let err = read_delta_ops(Cursor::new(&encoded[..encoded.len() - 4])).unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { .. }));
    }

    #[test]
    fn test_delta_reader_rejects_negative_offset() {
        let mut encoded = Vec::new();
        encoded.push(TAG_COPY);
        encoded.extend_from_slice(&(-8i64).to_be_bytes());
        encoded.extend_from_slice(&0u32.to_be_bytes());
        encoded.extend_from_slice(&4u32.to_be_bytes());
        assert!(read_delta_ops(Cursor::new(&encoded)).is_err());
    }

    #[test]
    fn test_delta_reader_rejects_zero_length_ops() {
        let mut encoded = Vec::new();
        encoded.push(TAG_LITERAL);
        encoded.extend_from_slice(&0i64.to_be_bytes());
        encoded.extend_from_slice(&0u32.to_be_bytes());
        assert!(read_delta_ops(Cursor::new(&encoded)).is_err());

        let mut encoded = Vec::new();
        encoded.push(TAG_COPY);
        encoded.extend_from_slice(&0i64.to_be_bytes());
        encoded.extend_from_slice(&0u32.to_be_bytes());
        encoded.extend_from_slice(&0u32.to_be_bytes());
        assert!(read_delta_ops(Cursor::new(&encoded)).is_err());
    }

    #[test]
    fn test_delta_writer_rejects_empty_literal() {
        let mut writer = DeltaWriter::new(Vec::new());
        let err = writer
            .write_op(&Delta::Literal {
                write_offset: 0,
                data: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { .. }));
    }
}
