//! Composite byte buffer used by the deframer.
//!
//! [`CompositeBuffer`] owns an ordered queue of immutable [`Bytes`] segments
//! with a read cursor. Appending moves ownership of a segment into the queue;
//! reading splits segments without copying and discards exhausted leading
//! segments. Reads never truncate silently: asking for more bytes than are
//! readable is a caller bug and panics.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use crate::byte_order::read_network_u32;

/// Ordered, owned sequence of byte segments.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use grpcwire::buffer::CompositeBuffer;
///
/// let mut buf = CompositeBuffer::new();
/// buf.push(Bytes::from_static(&[0x00, 0x00]));
/// buf.push(Bytes::from_static(&[0x00, 0x03, b'a']));
///
/// assert_eq!(buf.read_unsigned_byte(), 0);
/// assert_eq!(buf.read_int(), 3 << 8);
/// assert_eq!(buf.readable_bytes(), 0);
/// ```
#[derive(Debug, Default)]
pub struct CompositeBuffer {
    segments: VecDeque<Bytes>,
    readable: usize,
    closed: bool,
}

impl CompositeBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Total bytes remaining across all segments.
    #[must_use]
    pub fn readable_bytes(&self) -> usize { self.readable }

    /// Number of segments currently held.
    #[must_use]
    pub fn segment_count(&self) -> usize { self.segments.len() }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }

    /// Append a segment to the tail. Empty segments are not stored.
    ///
    /// Segments pushed after [`close`](Self::close) are released immediately.
    pub fn push(&mut self, segment: Bytes) {
        if self.closed || segment.is_empty() {
            return;
        }
        self.readable += segment.len();
        self.segments.push_back(segment);
    }

    /// Take ownership of every remaining byte in `other`, appending it to
    /// the tail of `self`.
    pub fn add_buffer(&mut self, other: impl Into<CompositeBuffer>) {
        let mut other = other.into();
        for segment in other.segments.drain(..) {
            self.push(segment);
        }
        other.readable = 0;
    }

    /// Read one byte.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    pub fn read_unsigned_byte(&mut self) -> u8 {
        self.check_readable(1);
        self.get_u8()
    }

    /// Read a 4-byte big-endian unsigned integer, spanning segments if
    /// necessary.
    ///
    /// # Panics
    ///
    /// Panics if fewer than four bytes are readable.
    pub fn read_int(&mut self) -> u32 {
        self.check_readable(4);
        let mut raw = [0u8; 4];
        self.copy_to_slice(&mut raw);
        read_network_u32(raw)
    }

    /// Split off the next `len` bytes into a new buffer that owns them.
    ///
    /// Whole segments are moved; only a straddling segment is split, which
    /// shares the underlying allocation.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `len` bytes are readable.
    pub fn read_bytes(&mut self, len: usize) -> CompositeBuffer {
        self.check_readable(len);
        let mut out = CompositeBuffer::new();
        let mut remaining = len;
        while remaining > 0 {
            let Some(mut head) = self.segments.pop_front() else {
                break;
            };
            if head.len() <= remaining {
                remaining -= head.len();
                self.readable -= head.len();
                out.push(head);
            } else {
                let taken = head.split_to(remaining);
                self.readable -= remaining;
                remaining = 0;
                out.push(taken);
                self.segments.push_front(head);
            }
        }
        out
    }

    /// Consume the buffer, returning its bytes contiguously.
    ///
    /// A single segment is returned without copying.
    #[must_use]
    pub fn into_bytes(mut self) -> Bytes {
        match self.segments.len() {
            0 => Bytes::new(),
            1 => self.segments.pop_front().unwrap_or_default(),
            _ => {
                let mut joined = BytesMut::with_capacity(self.readable);
                for segment in self.segments.drain(..) {
                    joined.extend_from_slice(&segment);
                }
                joined.freeze()
            }
        }
    }

    /// Release every segment. Calling `close` again has no effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.segments.clear();
        self.readable = 0;
        self.closed = true;
    }

    fn check_readable(&self, len: usize) {
        assert!(
            len <= self.readable,
            "read of {len} bytes exceeds {} readable bytes",
            self.readable
        );
    }
}

impl From<Bytes> for CompositeBuffer {
    fn from(segment: Bytes) -> Self {
        let mut buf = CompositeBuffer::new();
        buf.push(segment);
        buf
    }
}

impl From<Vec<u8>> for CompositeBuffer {
    fn from(bytes: Vec<u8>) -> Self { Bytes::from(bytes).into() }
}

impl From<&'static [u8]> for CompositeBuffer {
    fn from(bytes: &'static [u8]) -> Self { Bytes::from_static(bytes).into() }
}

impl Buf for CompositeBuffer {
    fn remaining(&self) -> usize { self.readable }

    fn chunk(&self) -> &[u8] { self.segments.front().map_or(&[], |segment| segment.as_ref()) }

    fn advance(&mut self, mut cnt: usize) {
        self.check_readable(cnt);
        while cnt > 0 {
            let Some(head) = self.segments.front_mut() else {
                break;
            };
            let step = cnt.min(head.len());
            head.advance(step);
            self.readable -= step;
            cnt -= step;
            if head.is_empty() {
                self.segments.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Buf, Bytes};
    use rstest::{fixture, rstest};

    use super::CompositeBuffer;

    #[fixture]
    fn split_buffer() -> CompositeBuffer {
        let mut buf = CompositeBuffer::new();
        buf.push(Bytes::from_static(b"ab"));
        buf.push(Bytes::from_static(b"cde"));
        buf.push(Bytes::from_static(b"f"));
        buf
    }

    #[rstest]
    fn readable_bytes_sums_segments(split_buffer: CompositeBuffer) {
        assert_eq!(split_buffer.readable_bytes(), 6);
        assert_eq!(split_buffer.segment_count(), 3);
    }

    #[test]
    fn empty_segments_are_ignored() {
        let mut buf = CompositeBuffer::new();
        buf.push(Bytes::new());
        assert_eq!(buf.segment_count(), 0);
        assert_eq!(buf.readable_bytes(), 0);
    }

    #[rstest]
    fn read_bytes_splits_straddling_segment(mut split_buffer: CompositeBuffer) {
        let head = split_buffer.read_bytes(3);

        assert_eq!(head.readable_bytes(), 3);
        assert_eq!(head.into_bytes(), Bytes::from_static(b"abc"));
        assert_eq!(split_buffer.readable_bytes(), 3);
        assert_eq!(split_buffer.segment_count(), 2);
        assert_eq!(split_buffer.into_bytes(), Bytes::from_static(b"def"));
    }

    #[rstest]
    fn read_int_spans_segments() {
        let mut buf = CompositeBuffer::new();
        buf.push(Bytes::from_static(&[0x00]));
        buf.push(Bytes::from_static(&[0x00, 0x01]));
        buf.push(Bytes::from_static(&[0x02, 0xff]));

        assert_eq!(buf.read_int(), 0x0102);
        assert_eq!(buf.read_unsigned_byte(), 0xff);
        assert_eq!(buf.segment_count(), 0);
    }

    #[rstest]
    fn add_buffer_moves_ownership(mut split_buffer: CompositeBuffer) {
        let mut target = CompositeBuffer::from(Bytes::from_static(b"xy"));
        target.add_buffer(split_buffer.read_bytes(4));

        assert_eq!(target.readable_bytes(), 6);
        assert_eq!(split_buffer.readable_bytes(), 2);
        assert_eq!(target.into_bytes(), Bytes::from_static(b"xyabcd"));
    }

    #[rstest]
    fn single_segment_into_bytes_is_zero_copy() {
        let source = Bytes::from_static(b"payload");
        let buf = CompositeBuffer::from(source.clone());
        let out = buf.into_bytes();
        assert_eq!(out.as_ptr(), source.as_ptr());
    }

    #[rstest]
    fn close_is_idempotent(mut split_buffer: CompositeBuffer) {
        split_buffer.close();
        split_buffer.close();

        assert!(split_buffer.is_closed());
        assert_eq!(split_buffer.readable_bytes(), 0);
        split_buffer.push(Bytes::from_static(b"late"));
        assert_eq!(split_buffer.readable_bytes(), 0);
    }

    #[rstest]
    fn buf_impl_advances_across_segments(mut split_buffer: CompositeBuffer) {
        split_buffer.advance(4);
        assert_eq!(split_buffer.chunk(), b"e");
        assert_eq!(split_buffer.remaining(), 2);
    }

    #[rstest]
    #[should_panic(expected = "exceeds 6 readable bytes")]
    fn reading_past_end_panics(mut split_buffer: CompositeBuffer) {
        let _ = split_buffer.read_bytes(7);
    }
}
