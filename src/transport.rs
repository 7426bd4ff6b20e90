//! Transport binding: what the HTTP/2 layer hands the dispatcher and what it
//! receives back.
//!
//! The transport delivers one [`InboundRequest`] per stream. Its body arrives
//! as an ordered [`RequestBodyStream`] of [`BodyChunk`]s, the last of which is
//! flagged. Responses flow back as [`ResponsePart`]s over an unbounded
//! channel, so a call never waits on the transport to write.
//!
//! ```
//! use bytes::Bytes;
//! use grpcwire::transport::{BodyChunk, body_channel};
//!
//! # async fn demo() {
//! let (tx, _body) = body_channel(8);
//! tx.send(Ok(BodyChunk::last(Bytes::from_static(&[0, 0, 0, 0, 0]))))
//!     .await
//!     .expect("receiver alive");
//! # }
//! ```

use std::{io, pin::Pin};

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
use tokio::sync::mpsc;

use crate::status::{GRPC_CONTENT_TYPE, Status};

/// Default capacity for request body channels.
///
/// The transport blocks once this many chunks are queued for a call that has
/// not caught up.
pub const DEFAULT_BODY_CHANNEL_CAPACITY: usize = 16;

/// One piece of a request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyChunk {
    pub data: Bytes,
    /// Set on the chunk that ends the stream.
    pub last: bool,
}

impl BodyChunk {
    /// A chunk with more to follow.
    #[must_use]
    pub fn more(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
        }
    }

    /// The final chunk of a body.
    #[must_use]
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: true,
        }
    }
}

/// Streaming request body.
///
/// An `Err` item is a transport failure; the stream ending without a chunk
/// flagged `last` means the peer went away.
pub type RequestBodyStream = Pin<Box<dyn Stream<Item = io::Result<BodyChunk>> + Send + 'static>>;

/// Sending half of a body channel, held by the transport.
pub type BodySender = mpsc::Sender<io::Result<BodyChunk>>;

/// Create a bounded channel for a request body.
///
/// # Panics
///
/// Panics if `capacity` is zero, mirroring [`tokio::sync::mpsc::channel`].
#[must_use]
pub fn body_channel(capacity: usize) -> (BodySender, RequestBodyStream) {
    let (tx, rx) = mpsc::channel(capacity);
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
    (tx, Box::pin(stream))
}

/// Request line and headers.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    /// `:path` pseudo-header, absent if the peer omitted it.
    pub path: Option<String>,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// A `POST` to `path` with `content-type: application/grpc`.
    #[must_use]
    pub fn grpc(path: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
        Self {
            method: Method::POST,
            path: Some(path.into()),
            headers,
        }
    }

    /// First value of `name` if it is valid visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// A piece of a response, in the order it must be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponsePart {
    /// Response headers. `end_of_stream` marks a trailers-only response.
    Head {
        status: StatusCode,
        headers: HeaderMap,
        end_of_stream: bool,
    },
    /// A framed message.
    Data(Bytes),
    /// Trailers ending the response.
    Trailers(HeaderMap),
}

impl ResponsePart {
    /// Trailers-only response carrying `status`.
    #[must_use]
    pub fn trailers_only(http_status: StatusCode, status: &Status) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
        status.write_metadata(&mut headers);
        ResponsePart::Head {
            status: http_status,
            headers,
            end_of_stream: true,
        }
    }
}

/// Sending half of a response channel, held by the call.
pub type ResponseSender = mpsc::UnboundedSender<ResponsePart>;

/// Receiving half of a response channel, held by the transport.
pub type ResponseReceiver = mpsc::UnboundedReceiver<ResponsePart>;

/// Create a response channel.
#[must_use]
pub fn response_channel() -> (ResponseSender, ResponseReceiver) { mpsc::unbounded_channel() }

/// Everything the transport knows about one inbound stream.
pub struct InboundRequest {
    pub head: RequestHead,
    pub body: RequestBodyStream,
    pub responder: ResponseSender,
}

impl std::fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRequest")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::status::{Code, GRPC_MESSAGE, GRPC_STATUS};

    #[tokio::test]
    async fn body_channel_preserves_order_and_errors() {
        let (tx, mut body) = body_channel(4);
        tx.send(Ok(BodyChunk::more(Bytes::from_static(b"a")))).await.expect("send");
        tx.send(Err(io::Error::other("reset"))).await.expect("send");
        drop(tx);

        assert_eq!(
            body.next().await.expect("chunk").expect("ok"),
            BodyChunk::more(Bytes::from_static(b"a"))
        );
        assert!(body.next().await.expect("item").is_err());
        assert!(body.next().await.is_none());
    }

    #[test]
    fn trailers_only_carries_status() {
        let part = ResponsePart::trailers_only(
            StatusCode::NOT_FOUND,
            &Status::unimplemented("Method not found: a/b"),
        );
        let ResponsePart::Head {
            status,
            headers,
            end_of_stream,
        } = part
        else {
            panic!("expected head");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(end_of_stream);
        assert_eq!(headers[GRPC_STATUS], Code::Unimplemented.value().to_string());
        assert_eq!(headers[GRPC_MESSAGE], "Method not found: a/b");
        assert_eq!(headers[CONTENT_TYPE], GRPC_CONTENT_TYPE);
    }

    #[test]
    fn grpc_head_defaults() {
        let head = RequestHead::grpc("/a.B/C");
        assert_eq!(head.method, Method::POST);
        assert_eq!(head.path.as_deref(), Some("/a.B/C"));
        assert_eq!(head.header_str("content-type"), Some(GRPC_CONTENT_TYPE));
    }
}
