//! A handler that panics fails its own call and nothing else.

use async_trait::async_trait;
use bytes::Bytes;
use grpcwire::{
    call::{CallHandler, ServerCall, ServerCallListener, unary},
    dispatcher::Dispatcher,
    method::MethodType,
    registry::{MethodRegistry, ServiceDefinition},
    status::Status,
    transport::ResponsePart,
};
use grpcwire_testing::{LoggerHandle, TestRequest, frame, logger, panicking};
use http::StatusCode;
use rstest::rstest;
use serial_test::serial;

/// Replies to the first message, then panics.
struct ReplyThenPanic;

impl CallHandler for ReplyThenPanic {
    fn start_call(&self, _call: &ServerCall) -> Box<dyn ServerCallListener> { Box::new(Self) }
}

#[async_trait]
impl ServerCallListener for ReplyThenPanic {
    async fn on_message(&mut self, call: &mut ServerCall, message: Bytes) -> Result<(), Status> {
        call.send_message(message)?;
        panic!("listener exploded")
    }

    async fn on_half_close(&mut self, _call: &mut ServerCall) -> Result<(), Status> { Ok(()) }
}

fn dispatcher() -> Dispatcher {
    let service = ServiceDefinition::new("test.Fragile")
        .method("Explode", MethodType::Unary, panicking())
        .and_then(|service| service.method("Late", MethodType::BidiStreaming, ReplyThenPanic))
        .and_then(|service| {
            service.method(
                "Echo",
                MethodType::Unary,
                unary(|request: Bytes| async move { Ok(request) }),
            )
        })
        .expect("service");
    Dispatcher::new(MethodRegistry::new().add_service(service).expect("registry"))
}

#[rstest]
#[tokio::test]
#[serial(call_logs)]
async fn panicking_call_is_logged_and_fails_with_internal(mut logger: LoggerHandle) {
    let dispatcher = dispatcher();
    let (request, responses) = TestRequest::grpc("/test.Fragile/Explode")
        .last(frame(b"boom"))
        .build();

    dispatcher.dispatch(request).expect("dispatched");
    let response = responses.collect().await;
    dispatcher.shutdown().await;

    assert_eq!(response.parts.len(), 1);
    assert!(response.is_trailers_only());
    assert_eq!(
        response.http_status(),
        Some(StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert_eq!(
        response.status(),
        Some(Status::internal("Call handler panicked"))
    );
    assert_eq!(dispatcher.active_calls(), 0);
    assert!(logger.contains("call task panicked: panic=handler exploded"));
}

#[rstest]
#[tokio::test]
#[serial(call_logs)]
async fn panic_after_headers_ends_with_internal_trailers(_logger: LoggerHandle) {
    let dispatcher = dispatcher();
    let (request, responses) = TestRequest::grpc("/test.Fragile/Late")
        .last(frame(b"partial answer"))
        .build();

    dispatcher.dispatch(request).expect("dispatched");
    let response = responses.collect().await;

    assert_eq!(response.http_status(), Some(StatusCode::OK));
    assert!(!response.is_trailers_only());
    assert!(matches!(response.parts.last(), Some(ResponsePart::Trailers(_))));
    assert_eq!(
        response.status(),
        Some(Status::internal("Call handler panicked"))
    );
    assert_eq!(
        response.messages(),
        vec![Bytes::from_static(b"partial answer")]
    );
}

#[rstest]
#[tokio::test]
#[serial(call_logs)]
async fn dispatcher_keeps_serving_after_a_panic(_logger: LoggerHandle) {
    let dispatcher = dispatcher();
    let (boom, _ignored) = TestRequest::grpc("/test.Fragile/Explode")
        .last(frame(b"boom"))
        .build();
    dispatcher.dispatch(boom).expect("dispatched");

    let (request, responses) = TestRequest::grpc("/test.Fragile/Echo")
        .last(frame(b"still here"))
        .build();
    dispatcher.dispatch(request).expect("dispatched");
    let response = responses.collect().await;

    assert_eq!(response.status(), Some(Status::ok()));
    assert_eq!(response.messages(), vec![Bytes::from_static(b"still here")]);
}
