//! Newline-delimited framer (§4.1): splits an incoming byte stream into
//! complete records and frames outgoing payloads.

use bytes::{Buf, BytesMut};
use thiserror::Error;

pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024 * 1024;
const LOW_WATER_MARK: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramerError {
    #[error("record of {size} bytes exceeds the configured maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },
}

/// Accumulates bytes read from the transport and yields complete,
/// newline-delimited records. Never allocates per byte: records are sliced
/// out of (and the consumed prefix reclaimed from) a single growable buffer.
pub struct Framer {
    buffer: BytesMut,
    max_record_size: usize,
}

impl Framer {
    pub fn new(max_record_size: usize) -> Self {
        Framer {
            buffer: BytesMut::new(),
            max_record_size,
        }
    }

    /// Appends newly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pops and returns the next complete record, if the buffer currently
    /// holds a full newline-terminated record. Call repeatedly after each
    /// `feed` until it returns `Ok(None)`.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, FramerError> {
        let Some(newline_at) = self.buffer.iter().position(|&b| b == b'\n') else {
            if self.buffer.len() > self.max_record_size {
                return Err(FramerError::RecordTooLarge {
                    size: self.buffer.len(),
                    max: self.max_record_size,
                });
            }
            return Ok(None);
        };

        if newline_at > self.max_record_size {
            return Err(FramerError::RecordTooLarge {
                size: newline_at,
                max: self.max_record_size,
            });
        }

        let record = self.buffer.split_to(newline_at).to_vec();
        self.buffer.advance(1); // consume the newline itself

        self.reclaim_if_sparse();
        Ok(Some(record))
    }

    /// Compacts the buffer's consumed prefix away once it grows past the
    /// low-water mark, so a long-lived connection doesn't retain an
    /// ever-growing allocation behind a shrinking unread tail.
    fn reclaim_if_sparse(&mut self) {
        if self.buffer.capacity() - self.buffer.len() > LOW_WATER_MARK {
            let mut compacted = BytesMut::with_capacity(self.buffer.len());
            compacted.extend_from_slice(&self.buffer);
            self.buffer = compacted;
        }
    }

    /// Frames a payload for the wire: `payload || "\n"`.
    pub fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.extend_from_slice(payload);
        out.push(b'\n');
        out
    }
}

impl Default for Framer {
    fn default() -> Self {
        Framer::new(DEFAULT_MAX_RECORD_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_yields_complete_records_only() {
        let mut framer = Framer::default();
        framer.feed(b"{\"a\":1}\n{\"b\":2");
        assert_eq!(framer.next_record().unwrap(), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(framer.next_record().unwrap(), None);

        framer.feed(b"}\n");
        assert_eq!(framer.next_record().unwrap(), Some(b"{\"b\":2}".to_vec()));
        assert_eq!(framer.next_record().unwrap(), None);
    }

    #[test]
    fn frame_appends_single_newline() {
        assert_eq!(Framer::frame(b"hello"), b"hello\n".to_vec());
    }

    #[test]
    fn round_trip_frame_then_parse() {
        let payload = b"{\"type\":\"chat\",\"message\":\"hi\"}";
        let framed = Framer::frame(payload);
        let mut framer = Framer::default();
        framer.feed(&framed);
        assert_eq!(framer.next_record().unwrap().unwrap(), payload.to_vec());
    }

    #[test]
    fn oversize_record_without_newline_is_rejected() {
        let mut framer = Framer::new(16);
        framer.feed(&vec![b'x'; 17]);
        assert!(matches!(
            framer.next_record(),
            Err(FramerError::RecordTooLarge { .. })
        ));
    }

    #[test]
    fn oversize_record_with_newline_is_rejected() {
        let mut framer = Framer::new(16);
        framer.feed(&vec![b'x'; 17]);
        framer.feed(b"\n");
        assert!(matches!(
            framer.next_record(),
            Err(FramerError::RecordTooLarge { .. })
        ));
    }
}
