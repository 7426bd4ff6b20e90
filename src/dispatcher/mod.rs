//! Inbound request dispatch.
//!
//! The [`Dispatcher`] receives one [`InboundRequest`] per HTTP/2 stream. It
//! validates the request, resolves the method, negotiates message encodings
//! and hands the call to a worker task. The dispatching task never runs
//! handler code: `dispatch` returns as soon as the worker is spawned.
//!
//! Rejected requests receive a trailers-only response carrying the matching
//! HTTP status, `grpc-status` and `grpc-message`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use http::HeaderValue;
use log::warn;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::{
    call::{CallId, ServerCall},
    compression::{CompressorRegistry, DecompressorRegistry, IDENTITY},
    config::DispatcherConfig,
    deframer::StopHandle,
    framer::MessageFramer,
    registry::MethodRegistry,
    status::{GRPC_ACCEPT_ENCODING, GRPC_ENCODING},
    transport::{
        BodySender,
        InboundRequest,
        RequestBodyStream,
        ResponsePart,
        ResponseSender,
        body_channel,
    },
};

mod validate;
mod worker;


pub use validate::{RequestRejection, is_grpc_content_type, validate};
use worker::{CallTask, spawn_call_task};

/// Routes inbound requests to registered handlers.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use grpcwire::{
///     call::unary,
///     dispatcher::Dispatcher,
///     method::MethodType,
///     registry::{MethodRegistry, ServiceDefinition},
/// };
///
/// let registry = MethodRegistry::new()
///     .add_service(
///         ServiceDefinition::new("echo.Echo")
///             .method("Say", MethodType::Unary, unary(|req: Bytes| async move { Ok(req) }))
///             .expect("method"),
///     )
///     .expect("registry");
/// let dispatcher = Dispatcher::new(registry).compress_responses(true);
/// assert_eq!(dispatcher.active_calls(), 0);
/// ```
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    decompressors: DecompressorRegistry,
    compressors: CompressorRegistry,
    config: DispatcherConfig,
    runtime: Option<Handle>,
    tracker: TaskTracker,
    active: Arc<DashMap<CallId, StopHandle>>,
    next_call_id: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher for `registry` with default configuration and the
    /// built-in gzip codec.
    #[must_use]
    pub fn new(registry: impl Into<Arc<MethodRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            decompressors: DecompressorRegistry::with_defaults(),
            compressors: CompressorRegistry::with_defaults(),
            config: DispatcherConfig::default(),
            runtime: None,
            tracker: TaskTracker::new(),
            active: Arc::new(DashMap::new()),
            next_call_id: AtomicU64::new(1),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Cap request messages at `size` bytes.
    #[must_use]
    pub fn max_inbound_message_size(mut self, size: usize) -> Self {
        self.config.max_inbound_message_size = size;
        self
    }

    /// Cap response messages at `size` bytes.
    #[must_use]
    pub fn max_outbound_message_size(mut self, size: usize) -> Self {
        self.config.max_outbound_message_size = size;
        self
    }

    /// Cap the bytes an incomplete frame may hold per call.
    #[must_use]
    pub fn max_buffered_bytes(mut self, cap: Option<usize>) -> Self {
        self.config.max_buffered_bytes = cap;
        self
    }

    /// Capacity of channels returned by [`body_channel`](Self::body_channel).
    #[must_use]
    pub fn body_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.body_channel_capacity = capacity;
        self
    }

    /// Compress responses when the client accepts a registered encoding.
    #[must_use]
    pub fn compress_responses(mut self, enabled: bool) -> Self {
        self.config.compress_responses = enabled;
        self
    }

    #[must_use]
    pub fn decompressors(mut self, decompressors: DecompressorRegistry) -> Self {
        self.decompressors = decompressors;
        self
    }

    #[must_use]
    pub fn compressors(mut self, compressors: CompressorRegistry) -> Self {
        self.compressors = compressors;
        self
    }

    /// Run call tasks on `runtime` instead of the caller's runtime.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig { &self.config }

    #[must_use]
    pub fn registry(&self) -> &MethodRegistry { &self.registry }

    /// Create a body channel for a request, sized by
    /// [`DispatcherConfig::body_channel_capacity`].
    ///
    /// The transport feeds chunks into the sender and passes the stream in
    /// the [`InboundRequest`]. A configured capacity of zero is raised to
    /// one.
    #[must_use]
    pub fn body_channel(&self) -> (BodySender, RequestBodyStream) {
        body_channel(self.config.body_channel_capacity.max(1))
    }

    /// Number of calls whose worker task is still running.
    #[must_use]
    pub fn active_calls(&self) -> usize { self.active.len() }

    /// Validate `request` and start its call on a worker task.
    ///
    /// On rejection the trailers-only response has already been sent.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestRejection`] that refused the request.
    ///
    /// # Panics
    ///
    /// Panics if no runtime was configured and this is called outside a
    /// Tokio runtime.
    pub fn dispatch(&self, request: InboundRequest) -> Result<CallId, RequestRejection> {
        let InboundRequest {
            head,
            body,
            responder,
        } = request;

        let key = validate(&head).map_err(|rejection| reject(&responder, rejection))?;
        let Some(definition) = self.registry.lookup(key) else {
            return Err(reject(
                &responder,
                RequestRejection::MethodNotFound(key.to_owned()),
            ));
        };

        let decompressor = match head.header_str(GRPC_ENCODING) {
            None | Some(IDENTITY) => None,
            Some(encoding) => match self.decompressors.lookup(encoding) {
                Some(decompressor) => Some(decompressor),
                None => {
                    return Err(self.reject_encoding(
                        &responder,
                        RequestRejection::UnsupportedEncoding(encoding.to_owned()),
                    ));
                }
            },
        };
        let compressor = if self.config.compress_responses {
            head.header_str(GRPC_ACCEPT_ENCODING)
                .and_then(|accept| self.compressors.negotiate(accept))
        } else {
            None
        };

        let call_id = CallId::new(self.next_call_id.fetch_add(1, Ordering::Relaxed));
        let framer = MessageFramer::new(compressor)
            .with_max_message_size(self.config.max_outbound_message_size);
        let call = ServerCall::new(
            call_id,
            definition.descriptor().clone(),
            responder,
            framer,
        );
        let stop = StopHandle::new();
        self.active.insert(call_id, stop.clone());

        let task = CallTask {
            call,
            definition,
            body,
            decompressor,
            deframer_config: self.config.deframer_config(),
            stop,
        };
        let runtime = self.runtime.clone().unwrap_or_else(Handle::current);
        spawn_call_task(task, &self.tracker, &runtime, Arc::clone(&self.active));
        Ok(call_id)
    }

    /// Cancel every active call and wait for all worker tasks to finish.
    ///
    /// Calls dispatched after this starts are not cancelled.
    pub async fn shutdown(&self) {
        for entry in self.active.iter() {
            entry.value().stop_delivery();
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn reject_encoding(
        &self,
        responder: &ResponseSender,
        rejection: RequestRejection,
    ) -> RequestRejection {
        let mut part = ResponsePart::trailers_only(rejection.http_status(), &rejection.status());
        if let ResponsePart::Head { headers, .. } = &mut part
            && let Ok(value) = HeaderValue::from_str(&self.decompressors.advertised_encodings())
        {
            headers.insert(GRPC_ACCEPT_ENCODING, value);
        }
        send_rejection(responder, &rejection, part);
        rejection
    }
}

fn reject(responder: &ResponseSender, rejection: RequestRejection) -> RequestRejection {
    let part = ResponsePart::trailers_only(rejection.http_status(), &rejection.status());
    send_rejection(responder, &rejection, part);
    rejection
}

fn send_rejection(responder: &ResponseSender, rejection: &RequestRejection, part: ResponsePart) {
    crate::metrics::inc_rejections(rejection.reason());
    warn!("request rejected: reason={}, error={rejection}", rejection.reason());
    if responder.send(part).is_err() {
        tracing::debug!(reason = rejection.reason(), "response receiver dropped");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("methods", &self.registry.len())
            .field("active_calls", &self.active.len())
            .finish_non_exhaustive()
    }
}
