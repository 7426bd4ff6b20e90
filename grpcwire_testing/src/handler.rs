//! Handlers that record what they observe.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use grpcwire::{
    call::{CallHandler, ServerCall, ServerCallListener},
    status::Status,
};

/// One observed listener hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    Started(String),
    Message(Bytes),
    HalfClose,
    Failure(Status),
    Complete,
}

/// [`CallHandler`] that records every hook and echoes each message back.
#[derive(Clone, Debug, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingHandler {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Everything recorded so far, across all calls.
    ///
    /// # Panics
    ///
    /// Panics if a listener panicked while holding the lock.
    #[must_use]
    pub fn events(&self) -> Vec<Recorded> { self.events.lock().expect("events lock").clone() }

    /// Recorded messages only.
    #[must_use]
    pub fn messages(&self) -> Vec<Bytes> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Recorded) { self.events.lock().expect("events lock").push(event); }
}

impl CallHandler for RecordingHandler {
    fn start_call(&self, call: &ServerCall) -> Box<dyn ServerCallListener> {
        self.record(Recorded::Started(call.method().full_name().to_owned()));
        Box::new(self.clone())
    }
}

#[async_trait]
impl ServerCallListener for RecordingHandler {
    async fn on_message(&mut self, call: &mut ServerCall, message: Bytes) -> Result<(), Status> {
        self.record(Recorded::Message(message.clone()));
        call.send_message(message)
    }

    async fn on_half_close(&mut self, _call: &mut ServerCall) -> Result<(), Status> {
        self.record(Recorded::HalfClose);
        Ok(())
    }

    async fn on_failure(&mut self, status: &Status) { self.record(Recorded::Failure(status.clone())); }

    async fn on_complete(&mut self) { self.record(Recorded::Complete); }
}

/// [`CallHandler`] whose calls panic as soon as they start.
#[must_use]
pub fn panicking() -> impl CallHandler {
    struct Panicking;

    impl CallHandler for Panicking {
        fn start_call(&self, _call: &ServerCall) -> Box<dyn ServerCallListener> {
            panic!("handler exploded")
        }
    }

    Panicking
}
