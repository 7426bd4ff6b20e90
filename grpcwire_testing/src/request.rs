//! Builder for in-memory inbound requests.

use std::io;

use bytes::Bytes;
use futures::stream;
use grpcwire::transport::{
    BodyChunk,
    InboundRequest,
    RequestBodyStream,
    RequestHead,
    response_channel,
};
use http::{HeaderName, HeaderValue, Method};

use crate::response::ResponseCollector;

/// Assembles an [`InboundRequest`] and the collector for its response.
#[derive(Debug)]
pub struct TestRequest {
    head: RequestHead,
    body: Vec<io::Result<BodyChunk>>,
}

impl TestRequest {
    /// `POST` to `path` with `content-type: application/grpc` and an empty
    /// body.
    #[must_use]
    pub fn grpc(path: &str) -> Self {
        Self {
            head: RequestHead::grpc(path),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.head.method = method;
        self
    }

    #[must_use]
    pub fn without_path(mut self) -> Self {
        self.head.path = None;
        self
    }

    /// Set `name` to `value`, replacing earlier values.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.head.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        self
    }

    #[must_use]
    pub fn without_header(mut self, name: &'static str) -> Self {
        self.head.headers.remove(name);
        self
    }

    /// Append a body chunk with more to follow.
    #[must_use]
    pub fn chunk(mut self, data: impl Into<Bytes>) -> Self {
        self.body.push(Ok(BodyChunk::more(data)));
        self
    }

    /// Append the final body chunk.
    #[must_use]
    pub fn last(mut self, data: impl Into<Bytes>) -> Self {
        self.body.push(Ok(BodyChunk::last(data)));
        self
    }

    /// Append every chunk, flagging the final one as last.
    #[must_use]
    pub fn chunks(mut self, chunks: impl IntoIterator<Item = Bytes>) -> Self {
        let mut chunks: Vec<_> = chunks.into_iter().collect();
        let last = chunks.pop().unwrap_or_default();
        for chunk in chunks {
            self = self.chunk(chunk);
        }
        self.last(last)
    }

    /// Append a transport error.
    #[must_use]
    pub fn body_error(mut self, kind: io::ErrorKind) -> Self {
        self.body.push(Err(io::Error::new(kind, "injected body error")));
        self
    }

    /// Build a request whose body yields the queued chunks and then ends.
    #[must_use]
    pub fn build(mut self) -> (InboundRequest, ResponseCollector) {
        let chunks = std::mem::take(&mut self.body);
        self.build_with_body(Box::pin(stream::iter(chunks)))
    }

    /// Build a request reading its body from `body`. Queued chunks are
    /// discarded.
    #[must_use]
    pub fn build_with_body(self, body: RequestBodyStream) -> (InboundRequest, ResponseCollector) {
        let (responder, responses) = response_channel();
        let request = InboundRequest {
            head: self.head,
            body,
            responder,
        };
        (request, ResponseCollector::new(responses))
    }
}
