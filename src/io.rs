//! Small stream-reading helpers shared across the crate.

use std::io::{ErrorKind, Read};

/// Read until `buf` is full or the stream hits EOF.
///
/// Plain `read` may return short counts for pipes and sockets, so block
/// fills go through this. Returns the number of bytes actually read; a
/// count below `buf.len()` means EOF was reached.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
