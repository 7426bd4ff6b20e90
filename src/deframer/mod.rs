//! Streaming deframer for length-prefixed gRPC messages.
//!
//! A [`Deframer`] turns an ordered stream of arbitrary byte chunks into
//! complete messages. Every message on the wire is preceded by a five byte
//! header:
//!
//! ```text
//! byte 0     flags   bit 0 = compressed, bits 1-7 reserved (must be zero)
//! bytes 1-4  length  unsigned, big-endian
//! ```
//!
//! The deframer alternates between reading a header and reading the body it
//! describes. Bytes are accumulated until the current target is met, so chunk
//! boundaries never affect which messages are produced.
//!
//! Events are reported through a [`DeframerListener`]. [`EventQueue`] is the
//! listener used by calls: it records events for the owning task to drain
//! after each [`Deframer::deframe`] call.

use std::{collections::VecDeque, io::Read, sync::Arc};

use bytes::Bytes;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{buffer::CompositeBuffer, compression::Decompressor, status::Status};

/// Size of the flags byte plus the length prefix.
pub const HEADER_LENGTH: usize = 5;

/// Default cap on a single inbound message (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Default cap on bytes accepted but not yet parsed (16 MiB).
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 4 * DEFAULT_MAX_MESSAGE_SIZE;

const COMPRESSED_FLAG_MASK: u8 = 0x01;
const RESERVED_MASK: u8 = 0xfe;

/// Which part of a frame the deframer is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeframerState {
    /// Waiting for the five byte header.
    Header,
    /// Waiting for the body announced by the last header.
    Body,
}

/// Receiver of deframing events.
///
/// Methods run on the task driving the deframer.
pub trait DeframerListener {
    /// A complete, decompressed message is available.
    fn message_available(&mut self, message: Bytes);

    /// The deframer closed. `has_partial_message` is true when an incomplete
    /// frame was discarded.
    fn deframer_closed(&mut self, has_partial_message: bool);

    /// Deframing failed with `status`. The deframer closes straight after.
    fn deframe_failed(&mut self, status: Status);
}

/// A recorded deframing event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeframerEvent {
    Message(Bytes),
    Closed { has_partial_message: bool },
    Failed(Status),
}

/// Listener that queues events in arrival order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<DeframerEvent>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn len(&self) -> usize { self.events.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.events.is_empty() }

    /// Remove and return the oldest event.
    pub fn pop(&mut self) -> Option<DeframerEvent> { self.events.pop_front() }

    /// Remove every queued event, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = DeframerEvent> + '_ { self.events.drain(..) }
}

impl DeframerListener for EventQueue {
    fn message_available(&mut self, message: Bytes) {
        self.events.push_back(DeframerEvent::Message(message));
    }

    fn deframer_closed(&mut self, has_partial_message: bool) {
        self.events
            .push_back(DeframerEvent::Closed { has_partial_message });
    }

    fn deframe_failed(&mut self, status: Status) {
        self.events.push_back(DeframerEvent::Failed(status));
    }
}

/// Limits applied by a [`Deframer`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeframerConfig {
    /// Largest frame length, and largest decompressed message, accepted.
    pub max_inbound_message_size: usize,
    /// Largest number of bytes held in an incomplete frame between chunks.
    /// `None` disables the check. Chunking cannot change the outcome while
    /// this is at least `max_inbound_message_size + HEADER_LENGTH`.
    pub max_buffered_bytes: Option<usize>,
}

impl Default for DeframerConfig {
    fn default() -> Self {
        Self {
            max_inbound_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_buffered_bytes: Some(DEFAULT_MAX_BUFFERED_BYTES),
        }
    }
}

/// Cloneable handle that asks a deframer to stop delivering messages.
///
/// Stopping only sets a flag. The task that owns the deframer must still call
/// [`Deframer::close`] (or feed it another chunk) for resources to be
/// released.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Request that delivery stops. Safe to call from any thread.
    pub fn stop_delivery(&self) { self.0.cancel(); }

    #[must_use]
    pub fn is_stopped(&self) -> bool { self.0.is_cancelled() }

    /// Resolve once [`stop_delivery`](Self::stop_delivery) has been called.
    pub async fn stopped(&self) { self.0.cancelled().await; }
}

/// Per-call gRPC deframer.
///
/// Not thread-safe: one task owns it and drives every call.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use grpcwire::deframer::{Deframer, DeframerConfig, DeframerEvent, EventQueue};
///
/// let mut deframer = Deframer::new(EventQueue::new(), None, DeframerConfig::default());
/// deframer.deframe(Bytes::from_static(&[0x00, 0x00, 0x00]));
/// deframer.deframe(Bytes::from_static(&[0x00, 0x03, b'a', b'b', b'c']));
///
/// assert_eq!(
///     deframer.listener_mut().pop(),
///     Some(DeframerEvent::Message("abc".into()))
/// );
/// ```
pub struct Deframer<L> {
    listener: L,
    config: DeframerConfig,
    decompressor: Option<Arc<dyn Decompressor>>,
    state: DeframerState,
    required_length: usize,
    compressed: bool,
    next_frame: Option<CompositeBuffer>,
    /// `None` once closed.
    unprocessed: Option<CompositeBuffer>,
    in_delivery: bool,
    close_when_complete: bool,
    stop: StopHandle,
}

impl<L: DeframerListener> Deframer<L> {
    /// Create a deframer reporting to `listener`.
    ///
    /// `decompressor` is used for frames with the compressed flag set; `None`
    /// means compressed frames are rejected.
    pub fn new(
        listener: L,
        decompressor: Option<Arc<dyn Decompressor>>,
        config: DeframerConfig,
    ) -> Self {
        Self {
            listener,
            config,
            decompressor,
            state: DeframerState::Header,
            required_length: HEADER_LENGTH,
            compressed: false,
            next_frame: None,
            unprocessed: Some(CompositeBuffer::new()),
            in_delivery: false,
            close_when_complete: false,
            stop: StopHandle::new(),
        }
    }

    /// Observe `stop` instead of a private handle.
    #[must_use]
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops delivery from outside the owning task.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle { self.stop.clone() }

    pub fn set_max_inbound_message_size(&mut self, size: usize) {
        self.config.max_inbound_message_size = size;
    }

    pub fn set_decompressor(&mut self, decompressor: Option<Arc<dyn Decompressor>>) {
        self.decompressor = decompressor;
    }

    #[must_use]
    pub fn config(&self) -> &DeframerConfig { &self.config }

    #[must_use]
    pub fn state(&self) -> DeframerState { self.state }

    /// Bytes needed to complete the current header or body.
    #[must_use]
    pub fn required_length(&self) -> usize { self.required_length }

    #[must_use]
    pub fn listener(&self) -> &L { &self.listener }

    pub fn listener_mut(&mut self) -> &mut L { &mut self.listener }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.unprocessed.is_none() }

    /// True when every received byte has been moved into the current frame.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.unprocessed
            .as_ref()
            .is_none_or(|buf| buf.readable_bytes() == 0)
    }

    fn is_closed_or_scheduled_to_close(&self) -> bool {
        self.is_closed() || self.close_when_complete
    }

    /// Append `chunk` and deliver every message it completes.
    ///
    /// Chunks arriving after close, or after
    /// [`close_when_complete`](Self::close_when_complete), are dropped.
    pub fn deframe(&mut self, chunk: impl Into<Bytes>) {
        if self.is_closed_or_scheduled_to_close() {
            return;
        }
        let Some(unprocessed) = self.unprocessed.as_mut() else {
            return;
        };
        unprocessed.push(chunk.into());
        self.deliver();
        self.check_backlog();
    }

    /// Fail if the bytes left unparsed after delivery exceed the cap.
    ///
    /// Complete frames are delivered first, so only an incomplete frame (and
    /// anything a stop left behind) counts towards the limit.
    fn check_backlog(&mut self) {
        let Some(cap) = self.config.max_buffered_bytes else {
            return;
        };
        let Some(unprocessed) = self.unprocessed.as_ref() else {
            return;
        };
        let buffered = unprocessed.readable_bytes()
            + self
                .next_frame
                .as_ref()
                .map_or(0, CompositeBuffer::readable_bytes);
        if buffered > cap {
            self.fail(Status::resource_exhausted(format!(
                "Buffered {buffered} bytes exceeds maximum: {cap}"
            )));
        }
    }

    /// Close once all buffered bytes have been processed.
    ///
    /// Closes immediately if nothing is waiting to be parsed.
    pub fn close_when_complete(&mut self) {
        if self.is_closed() {
            return;
        }
        if self.is_stalled() {
            self.close();
        } else {
            self.close_when_complete = true;
        }
    }

    /// Release all buffers and notify the listener. Later calls do nothing.
    pub fn close(&mut self) {
        let Some(mut unprocessed) = self.unprocessed.take() else {
            return;
        };
        let has_partial_message = self
            .next_frame
            .as_ref()
            .is_some_and(|frame| frame.readable_bytes() > 0);
        unprocessed.close();
        if let Some(mut frame) = self.next_frame.take() {
            frame.close();
        }
        self.close_when_complete = false;
        self.listener.deframer_closed(has_partial_message);
    }

    fn deliver(&mut self) {
        if self.in_delivery {
            return;
        }
        self.in_delivery = true;
        let outcome = self.deliver_frames();
        self.in_delivery = false;

        if let Err(status) = outcome {
            self.fail(status);
            return;
        }
        if self.stop.is_stopped() {
            self.close();
            return;
        }
        // A partial frame lives in `next_frame`, not `unprocessed`, so a
        // stalled deframer has nothing left to parse.
        if self.close_when_complete && self.is_stalled() {
            self.close();
        }
    }

    fn deliver_frames(&mut self) -> Result<(), Status> {
        while !self.stop.is_stopped() && self.read_required_bytes() {
            match self.state {
                DeframerState::Header => self.process_header()?,
                DeframerState::Body => self.process_body()?,
            }
        }
        Ok(())
    }

    /// Move bytes from `unprocessed` into `next_frame` until
    /// `required_length` is met. Returns `false` when input runs out first.
    fn read_required_bytes(&mut self) -> bool {
        let Some(unprocessed) = self.unprocessed.as_mut() else {
            return false;
        };
        let next_frame = self.next_frame.get_or_insert_with(CompositeBuffer::new);
        loop {
            let missing = self
                .required_length
                .saturating_sub(next_frame.readable_bytes());
            if missing == 0 {
                return true;
            }
            let available = unprocessed.readable_bytes();
            if available == 0 {
                return false;
            }
            next_frame.add_buffer(unprocessed.read_bytes(missing.min(available)));
        }
    }

    fn process_header(&mut self) -> Result<(), Status> {
        let frame = self.next_frame.get_or_insert_with(CompositeBuffer::new);
        let flags = frame.read_unsigned_byte();
        if flags & RESERVED_MASK != 0 {
            return Err(Status::internal(
                "Frame header malformed: reserved bits not zero",
            ));
        }
        self.compressed = flags & COMPRESSED_FLAG_MASK != 0;

        let length = frame.read_int();
        let max = self.config.max_inbound_message_size;
        let Some(length) = usize::try_from(length).ok().filter(|len| *len <= max) else {
            return Err(Status::resource_exhausted(format!(
                "Frame size {length} exceeds maximum: {max}. "
            )));
        };
        self.required_length = length;
        self.state = DeframerState::Body;
        Ok(())
    }

    fn process_body(&mut self) -> Result<(), Status> {
        let payload = self.next_frame.take().unwrap_or_default().into_bytes();
        let message = if self.compressed {
            self.decompress(&payload)?
        } else {
            payload
        };
        crate::metrics::inc_messages(crate::metrics::Direction::Inbound);
        self.listener.message_available(message);

        self.state = DeframerState::Header;
        self.required_length = HEADER_LENGTH;
        Ok(())
    }

    fn decompress(&self, payload: &[u8]) -> Result<Bytes, Status> {
        let Some(decompressor) = self.decompressor.as_ref() else {
            return Err(Status::internal(
                "Can't decode compressed frame as compression not configured.",
            ));
        };
        let max = self.config.max_inbound_message_size;
        // One byte past the limit is enough to detect an oversized message.
        let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
        let mut message = Vec::new();
        decompressor
            .reader(payload)
            .take(limit)
            .read_to_end(&mut message)
            .map_err(|e| {
                Status::internal(format!(
                    "Failed to decompress {} frame: {e}",
                    decompressor.encoding()
                ))
            })?;
        if message.len() > max {
            return Err(Status::resource_exhausted(format!(
                "Decompressed gRPC message exceeds maximum size {max}"
            )));
        }
        Ok(Bytes::from(message))
    }

    fn fail(&mut self, status: Status) {
        tracing::debug!(
            code = %status.code(),
            message = status.message(),
            "deframe failed"
        );
        crate::metrics::inc_deframe_errors(status.code());
        self.listener.deframe_failed(status);
        self.close();
    }
}
