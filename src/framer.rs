//! Outbound message framing.
//!
//! [`MessageFramer`] is the inverse of the deframer: it prefixes each
//! response message with the flags byte and big-endian length, compressing
//! the payload first when a compressor was negotiated for the call.

use std::{io, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::{
    byte_order::write_network_u32,
    compression::Compressor,
    deframer::{DEFAULT_MAX_MESSAGE_SIZE, HEADER_LENGTH},
    status::Status,
};

/// Encodes messages into gRPC frames.
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use grpcwire::framer::MessageFramer;
/// use tokio_util::codec::Encoder;
///
/// let mut framer = MessageFramer::new(None);
/// let mut wire = BytesMut::new();
/// framer
///     .encode(Bytes::from_static(b"abc"), &mut wire)
///     .expect("encode");
/// assert_eq!(&wire[..], &[0, 0, 0, 0, 3, b'a', b'b', b'c']);
/// ```
#[derive(Clone, Debug)]
pub struct MessageFramer {
    compressor: Option<Arc<dyn Compressor>>,
    max_message_size: usize,
}

impl MessageFramer {
    /// Create a framer that compresses with `compressor` when present.
    #[must_use]
    pub fn new(compressor: Option<Arc<dyn Compressor>>) -> Self {
        Self {
            compressor,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Reject messages larger than `size` bytes after compression.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Encoding named in the response's `grpc-encoding` header, if any.
    #[must_use]
    pub fn encoding(&self) -> Option<&str> { self.compressor.as_deref().map(Compressor::encoding) }

    /// Frame `message` into a standalone buffer.
    ///
    /// # Errors
    ///
    /// Returns `RESOURCE_EXHAUSTED` for oversized messages and `INTERNAL` if
    /// compression fails.
    pub fn frame(&mut self, message: Bytes) -> Result<Bytes, Status> {
        let mut wire = BytesMut::with_capacity(HEADER_LENGTH + message.len());
        self.encode(message, &mut wire)
            .map_err(|e| match e.get_ref().and_then(|inner| inner.downcast_ref::<Status>()) {
                Some(status) => status.clone(),
                None => Status::internal(format!("Failed to frame message: {e}")),
            })?;
        Ok(wire.freeze())
    }
}

impl Encoder<Bytes> for MessageFramer {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (flags, payload) = match self.compressor.as_ref() {
            Some(compressor) => (0x01, Bytes::from(compressor.compress(&item)?)),
            None => (0x00, item),
        };
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|_| payload.len() <= self.max_message_size)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    Status::resource_exhausted(format!(
                        "Message size {} exceeds maximum: {}",
                        payload.len(),
                        self.max_message_size
                    )),
                )
            })?;

        dst.reserve(HEADER_LENGTH + payload.len());
        dst.put_u8(flags);
        dst.put_slice(&write_network_u32(length));
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Read, sync::Arc};

    use bytes::Bytes;

    use super::MessageFramer;
    use crate::{
        compression::{Decompressor, Gzip},
        status::Code,
    };

    #[test]
    fn uncompressed_frame_layout() {
        let wire = MessageFramer::new(None)
            .frame(Bytes::from_static(b"hi"))
            .expect("frame");
        assert_eq!(&wire[..], &[0x00, 0x00, 0x00, 0x00, 0x02, b'h', b'i']);
    }

    #[test]
    fn compressed_frame_sets_flag() {
        let mut framer = MessageFramer::new(Some(Arc::new(Gzip)));
        assert_eq!(framer.encoding(), Some("gzip"));

        let wire = framer.frame(Bytes::from_static(b"squash")).expect("frame");
        assert_eq!(wire[0], 0x01);

        let mut out = Vec::new();
        Gzip.reader(&wire[5..])
            .read_to_end(&mut out)
            .expect("decompress");
        assert_eq!(out, b"squash");
    }

    #[test]
    fn oversized_message_is_resource_exhausted() {
        let err = MessageFramer::new(None)
            .with_max_message_size(3)
            .frame(Bytes::from_static(b"four"))
            .expect_err("oversized");
        assert_eq!(err.code(), Code::ResourceExhausted);
        assert_eq!(err.message(), "Message size 4 exceeds maximum: 3");
    }
}
