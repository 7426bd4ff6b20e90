//! Collection of response parts written by a call.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use grpcwire::{
    compression::Gzip,
    deframer::{Deframer, DeframerConfig, DeframerEvent, EventQueue},
    status::Status,
    transport::{ResponsePart, ResponseReceiver},
};
use http::{HeaderMap, StatusCode};

/// Longest a test waits for a response to finish.
pub const COLLECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the parts of one response.
#[derive(Debug)]
pub struct ResponseCollector {
    rx: ResponseReceiver,
}

impl ResponseCollector {
    #[must_use]
    pub fn new(rx: ResponseReceiver) -> Self { Self { rx } }

    /// Wait until the call drops its responder, then return every part.
    ///
    /// # Panics
    ///
    /// Panics if the response does not finish within [`COLLECT_TIMEOUT`].
    pub async fn collect(mut self) -> CollectedResponse {
        let mut parts = Vec::new();
        tokio::time::timeout(COLLECT_TIMEOUT, async {
            while let Some(part) = self.rx.recv().await {
                parts.push(part);
            }
        })
        .await
        .expect("response did not finish in time");
        CollectedResponse { parts }
    }

    /// Parts already written, without waiting.
    pub fn ready(&mut self) -> Vec<ResponsePart> {
        let mut parts = Vec::new();
        while let Ok(part) = self.rx.try_recv() {
            parts.push(part);
        }
        parts
    }
}

/// A finished response.
#[derive(Debug, Clone)]
pub struct CollectedResponse {
    pub parts: Vec<ResponsePart>,
}

impl CollectedResponse {
    fn head(&self) -> Option<(StatusCode, &HeaderMap, bool)> {
        self.parts.iter().find_map(|part| match part {
            ResponsePart::Head {
                status,
                headers,
                end_of_stream,
            } => Some((*status, headers, *end_of_stream)),
            _ => None,
        })
    }

    /// HTTP status of the response head.
    #[must_use]
    pub fn http_status(&self) -> Option<StatusCode> { self.head().map(|(status, _, _)| status) }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> { self.head().map(|(_, headers, _)| headers) }

    /// Whether the head carried the status itself.
    #[must_use]
    pub fn is_trailers_only(&self) -> bool { self.head().is_some_and(|(_, _, eos)| eos) }

    /// Status from the trailers, or from a trailers-only head.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.parts.iter().rev().find_map(|part| match part {
            ResponsePart::Trailers(headers) => Status::from_metadata(headers),
            ResponsePart::Head {
                headers,
                end_of_stream: true,
                ..
            } => Status::from_metadata(headers),
            _ => None,
        })
    }

    /// Response messages with framing removed.
    ///
    /// # Panics
    ///
    /// Panics if a data part is not a well-formed frame.
    #[must_use]
    pub fn messages(&self) -> Vec<Bytes> {
        let mut deframer = Deframer::new(
            EventQueue::new(),
            Some(Arc::new(Gzip)),
            DeframerConfig {
                max_inbound_message_size: usize::MAX,
                max_buffered_bytes: None,
            },
        );
        for part in &self.parts {
            if let ResponsePart::Data(data) = part {
                deframer.deframe(data.clone());
            }
        }
        deframer.close_when_complete();
        deframer
            .listener_mut()
            .drain()
            .filter_map(|event| match event {
                DeframerEvent::Message(message) => Some(message),
                DeframerEvent::Closed {
                    has_partial_message: false,
                } => None,
                other => panic!("malformed response data: {other:?}"),
            })
            .collect()
    }
}
