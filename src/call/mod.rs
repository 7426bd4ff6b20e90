//! Per-call state.
//!
//! A [`ServerCall`] is created for every request accepted by the dispatcher
//! and owned by that request's worker task. Inbound deframer events are fed
//! to it with [`ServerCall::handle_event`], which forwards them to the
//! handler's [`ServerCallListener`] and moves the call through its states:
//!
//! ```text
//! Started -> Active -> HalfClosed -> Closed
//!    |          |          |
//!    +----------+----------+--------> Closed (failure)
//! ```
//!
//! Every path into `Closed` writes a status to the peer exactly once.

use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header::CONTENT_TYPE};

use crate::{
    deframer::DeframerEvent,
    framer::MessageFramer,
    method::MethodDescriptor,
    status::{GRPC_CONTENT_TYPE, GRPC_ENCODING, Status},
    transport::{ResponsePart, ResponseSender},
};

mod listener;
mod unary;

pub use listener::{CallHandler, ServerCallListener};
pub use unary::{Unary, unary};

/// Identifier assigned to a call by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl From<u64> for CallId {
    fn from(value: u64) -> Self { Self(value) }
}

impl CallId {
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "CallId({})", self.0) }
}

/// Lifecycle of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    /// Accepted; no message seen yet.
    Started,
    /// At least one request message delivered.
    Active,
    /// The client finished sending.
    HalfClosed,
    /// A status was written. Terminal.
    Closed,
}

/// Server side of one call.
#[derive(Debug)]
pub struct ServerCall {
    id: CallId,
    method: MethodDescriptor,
    state: CallState,
    status: Option<Status>,
    responder: ResponseSender,
    framer: MessageFramer,
    headers_sent: bool,
    listener_notified: bool,
}

impl ServerCall {
    /// Create a call writing its response to `responder`.
    #[must_use]
    pub fn new(
        id: CallId,
        method: MethodDescriptor,
        responder: ResponseSender,
        framer: MessageFramer,
    ) -> Self {
        Self {
            id,
            method,
            state: CallState::Started,
            status: None,
            responder,
            framer,
            headers_sent: false,
            listener_notified: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> CallId { self.id }

    #[must_use]
    pub fn method(&self) -> &MethodDescriptor { &self.method }

    #[must_use]
    pub fn state(&self) -> CallState { self.state }

    /// Final status, once closed.
    #[must_use]
    pub fn status(&self) -> Option<&Status> { self.status.as_ref() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.state == CallState::Closed }

    /// Whether response headers have been written.
    #[must_use]
    pub fn headers_sent(&self) -> bool { self.headers_sent }

    /// Write response headers. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL` if the call is already closed.
    pub fn send_headers(&mut self) -> Result<(), Status> {
        if self.is_closed() {
            return Err(Status::internal("Call already closed"));
        }
        if self.headers_sent {
            return Ok(());
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
        if let Some(encoding) = self.framer.encoding()
            && let Ok(value) = HeaderValue::from_str(encoding)
        {
            headers.insert(GRPC_ENCODING, value);
        }
        self.headers_sent = true;
        self.send(ResponsePart::Head {
            status: StatusCode::OK,
            headers,
            end_of_stream: false,
        });
        Ok(())
    }

    /// Frame and write a response message, sending headers first if needed.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL` if the call is closed and `RESOURCE_EXHAUSTED` if
    /// the message is too large.
    pub fn send_message(&mut self, message: Bytes) -> Result<(), Status> {
        self.send_headers()?;
        let framed = self.framer.frame(message)?;
        crate::metrics::inc_messages(crate::metrics::Direction::Outbound);
        self.send(ResponsePart::Data(framed));
        Ok(())
    }

    /// Write `status` and close the call. Later calls do nothing.
    ///
    /// Listeners are not notified; see [`handle_event`](Self::handle_event)
    /// for the path that does.
    pub fn close(&mut self, status: Status) { self.close_with(StatusCode::OK, status); }

    /// Close with `status`, using `http_status` if the response is still
    /// trailers-only.
    pub(crate) fn close_with(&mut self, http_status: StatusCode, status: Status) {
        if self.is_closed() {
            return;
        }
        tracing::debug!(
            call_id = %self.id,
            method = %self.method,
            code = %status.code(),
            "call closed"
        );
        if self.headers_sent {
            let mut trailers = HeaderMap::new();
            status.write_metadata(&mut trailers);
            self.send(ResponsePart::Trailers(trailers));
        } else {
            self.headers_sent = true;
            self.send(ResponsePart::trailers_only(http_status, &status));
        }
        self.state = CallState::Closed;
        self.status = Some(status);
    }

    /// Apply one deframer event, forwarding it to `listener`.
    ///
    /// Events arriving after the call closed are ignored.
    pub async fn handle_event(&mut self, listener: &mut dyn ServerCallListener, event: DeframerEvent) {
        if self.is_closed() {
            return;
        }
        match event {
            DeframerEvent::Message(message) => {
                self.state = CallState::Active;
                let outcome = listener.on_message(self, message).await;
                self.after_hook(listener, outcome).await;
            }
            DeframerEvent::Closed {
                has_partial_message: true,
            } => {
                self.fail(
                    listener,
                    Status::internal("Encountered end-of-stream mid-frame"),
                )
                .await;
            }
            DeframerEvent::Closed {
                has_partial_message: false,
            } => {
                self.state = CallState::HalfClosed;
                let outcome = listener.on_half_close(self).await;
                if outcome.is_ok() && !self.is_closed() {
                    self.close(Status::ok());
                }
                self.after_hook(listener, outcome).await;
            }
            DeframerEvent::Failed(status) => self.fail(listener, status).await,
        }
    }

    /// Close with `status` and notify `listener`.
    pub async fn fail(&mut self, listener: &mut dyn ServerCallListener, status: Status) {
        self.fail_with(listener, StatusCode::OK, status).await;
    }

    pub(crate) async fn fail_with(
        &mut self,
        listener: &mut dyn ServerCallListener,
        http_status: StatusCode,
        status: Status,
    ) {
        self.close_with(http_status, status);
        self.notify_listener(listener).await;
    }

    async fn after_hook(
        &mut self,
        listener: &mut dyn ServerCallListener,
        outcome: Result<(), Status>,
    ) {
        if let Err(status) = outcome {
            self.close(status);
        }
        self.notify_listener(listener).await;
    }

    async fn notify_listener(&mut self, listener: &mut dyn ServerCallListener) {
        if self.listener_notified {
            return;
        }
        let Some(status) = self.status.as_ref() else {
            return;
        };
        self.listener_notified = true;
        if status.is_ok() {
            listener.on_complete().await;
        } else {
            tracing::debug!(
                call_id = %self.id,
                code = %status.code(),
                message = status.message(),
                "call failed"
            );
            listener.on_failure(status).await;
        }
    }

    fn send(&self, part: ResponsePart) {
        if self.responder.send(part).is_err() {
            tracing::debug!(call_id = %self.id, "response receiver dropped");
        }
    }
}
