//! Handler seams for a call.

use async_trait::async_trait;
use bytes::Bytes;

use super::ServerCall;
use crate::status::Status;

/// Receives the inbound side of one call.
///
/// Hooks run on the call's worker task, one at a time and in order. Returning
/// `Err(status)` from a hook closes the call with that status.
#[async_trait]
pub trait ServerCallListener: Send {
    /// A request message arrived.
    async fn on_message(&mut self, call: &mut ServerCall, message: Bytes) -> Result<(), Status>;

    /// The client finished sending. If the call is still open when this
    /// returns `Ok`, it is closed with `OK`.
    async fn on_half_close(&mut self, call: &mut ServerCall) -> Result<(), Status>;

    /// The call ended with a non-`OK` status.
    async fn on_failure(&mut self, _status: &Status) {}

    /// The call ended with `OK`.
    async fn on_complete(&mut self) {}
}

/// Factory for per-call listeners.
pub trait CallHandler: Send + Sync {
    /// Start serving `call`, returning the listener for its events.
    fn start_call(&self, call: &ServerCall) -> Box<dyn ServerCallListener>;
}
