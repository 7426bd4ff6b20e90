//! Worker side of a call: feeds body chunks through the deframer and the
//! resulting events into the call.

use std::sync::Arc;

use dashmap::DashMap;
use futures::{FutureExt, StreamExt};
use http::StatusCode;
use log::error;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::{
    call::{CallId, ServerCall, ServerCallListener},
    compression::Decompressor,
    deframer::{Deframer, DeframerConfig, DeframerEvent, EventQueue, StopHandle},
    registry::ServerMethodDefinition,
    status::Status,
    transport::RequestBodyStream,
};

/// Everything a worker needs to run one call.
pub(super) struct CallTask {
    pub(super) call: ServerCall,
    pub(super) definition: Arc<ServerMethodDefinition>,
    pub(super) body: RequestBodyStream,
    pub(super) decompressor: Option<Arc<dyn Decompressor>>,
    pub(super) deframer_config: DeframerConfig,
    pub(super) stop: StopHandle,
}

impl CallTask {
    fn split(self) -> (ServerCall, CallInput) {
        let Self {
            call,
            definition,
            body,
            decompressor,
            deframer_config,
            stop,
        } = self;
        let input = CallInput {
            definition,
            body,
            decompressor,
            deframer_config,
            stop,
        };
        (call, input)
    }
}

/// The parts of a [`CallTask`] consumed while the call runs.
struct CallInput {
    definition: Arc<ServerMethodDefinition>,
    body: RequestBodyStream,
    decompressor: Option<Arc<dyn Decompressor>>,
    deframer_config: DeframerConfig,
    stop: StopHandle,
}

/// Spawn `task` on `runtime`, tracked by `tracker`. A panic is logged and
/// ends the call with `INTERNAL`. The call is removed from `active` when the
/// task ends.
pub(super) fn spawn_call_task(
    task: CallTask,
    tracker: &TaskTracker,
    runtime: &Handle,
    active: Arc<DashMap<CallId, StopHandle>>,
) {
    let call_id = task.call.id();
    let method = task.call.method().to_string();
    crate::metrics::inc_calls();
    tracker.spawn_on(
        async move {
            let (mut call, input) = task.split();
            let fut = std::panic::AssertUnwindSafe(run_call(&mut call, input)).catch_unwind();
            if let Err(panic) = fut.await {
                crate::metrics::inc_call_panics();
                let panic_msg = crate::panic::format_panic(&*panic);
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("call task panicked: panic={panic_msg}, call_id={call_id}, method={method}");
                tracing::error!(panic = %panic_msg, %call_id, %method, "call task panicked");
                call.close_with(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Status::internal("Call handler panicked"),
                );
            }
            active.remove(&call_id);
            crate::metrics::dec_calls();
        },
        runtime,
    );
}

enum Next {
    Chunk(std::io::Result<crate::transport::BodyChunk>),
    EndOfBody,
    Stopped,
}

async fn run_call(call: &mut ServerCall, input: CallInput) {
    let CallInput {
        definition,
        mut body,
        decompressor,
        deframer_config,
        stop,
    } = input;
    let mut listener = definition.handler().start_call(call);
    let mut deframer = Deframer::new(EventQueue::new(), decompressor, deframer_config)
        .with_stop_handle(stop.clone());
    tracing::debug!(call_id = %call.id(), method = %call.method(), "call started");

    while !call.is_closed() {
        let next = tokio::select! {
            biased;
            () = stop.stopped() => Next::Stopped,
            item = body.next() => item.map_or(Next::EndOfBody, Next::Chunk),
        };
        match next {
            Next::Chunk(Ok(chunk)) => {
                deframer.deframe(chunk.data);
                if chunk.last {
                    deframer.close_when_complete();
                }
                drain_events(call, listener.as_mut(), &mut deframer, &stop).await;
                if chunk.last {
                    break;
                }
            }
            Next::Chunk(Err(e)) => {
                tracing::warn!(call_id = %call.id(), error = %e, "request body failed");
                call.fail_with(
                    listener.as_mut(),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Status::internal(format!("Failed to read request body: {e}")),
                )
                .await;
            }
            Next::EndOfBody => {
                call.fail(
                    listener.as_mut(),
                    Status::cancelled("Request body ended before end of stream"),
                )
                .await;
            }
            Next::Stopped => {
                call.fail(listener.as_mut(), Status::cancelled("Call cancelled"))
                    .await;
            }
        }
    }

    deframer.close();
    drain_events(call, listener.as_mut(), &mut deframer, &stop).await;
    if !call.is_closed() {
        call.fail(listener.as_mut(), Status::internal("Call ended without a status"))
            .await;
    }
}

async fn drain_events(
    call: &mut ServerCall,
    listener: &mut dyn ServerCallListener,
    deframer: &mut Deframer<EventQueue>,
    stop: &StopHandle,
) {
    while let Some(event) = deframer.listener_mut().pop() {
        // A stopped deframer closes itself; that close is a cancellation,
        // not the client half-closing.
        if matches!(event, DeframerEvent::Closed { .. }) && stop.is_stopped() {
            call.fail(listener, Status::cancelled("Call cancelled")).await;
            continue;
        }
        call.handle_event(listener, event).await;
    }
}
