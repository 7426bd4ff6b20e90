//! Wire-format builders.

use bytes::{BufMut, Bytes, BytesMut};
use grpcwire::{
    byte_order::write_network_u32,
    compression::{Compressor, Gzip},
};

fn encode(flags: u8, payload: &[u8]) -> Bytes {
    let len = u32::try_from(payload.len()).expect("payload exceeds u32::MAX");
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u8(flags);
    buf.put_slice(&write_network_u32(len));
    buf.put_slice(payload);
    buf.freeze()
}

/// An uncompressed frame carrying `payload`.
#[must_use]
pub fn frame(payload: &[u8]) -> Bytes { encode(0x00, payload) }

/// A gzip-compressed frame carrying `payload`.
#[must_use]
pub fn compressed_frame(payload: &[u8]) -> Bytes {
    let compressed = Gzip.compress(payload).expect("gzip compression");
    encode(0x01, &compressed)
}

/// Concatenate uncompressed frames for every payload.
#[must_use]
pub fn frames<'a>(payloads: impl IntoIterator<Item = &'a [u8]>) -> Bytes {
    let mut buf = BytesMut::new();
    for payload in payloads {
        buf.put(frame(payload));
    }
    buf.freeze()
}

/// Split `wire` at each offset in `cuts`, which must be ascending.
///
/// Offsets past the end are clamped, so empty trailing chunks are possible.
#[must_use]
pub fn chunk_at(wire: &Bytes, cuts: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        let end = cut.clamp(start, wire.len());
        chunks.push(wire.slice(start..end));
        start = end;
    }
    chunks.push(wire.slice(start..));
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_header() {
        assert_eq!(&frame(b"ab")[..], &[0, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn chunk_at_covers_input() {
        let wire = Bytes::from_static(b"abcdef");
        let chunks = chunk_at(&wire, &[1, 1, 4, 10]);
        let lens: Vec<_> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(lens, vec![1, 0, 3, 2, 0]);
    }
}
