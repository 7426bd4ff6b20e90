//! Adapter for request/response methods.

use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;

use super::{CallHandler, ServerCall, ServerCallListener};
use crate::status::Status;

/// [`CallHandler`] that answers exactly one request with one response.
#[derive(Clone, Debug)]
pub struct Unary<F> {
    handler: F,
}

/// Serve a unary method with `handler`.
///
/// More than one request message fails the call with `INTERNAL`, as does a
/// client that half-closes without sending one.
#[must_use]
pub fn unary<F, Fut>(handler: F) -> Unary<F>
where
    F: Fn(Bytes) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, Status>> + Send + 'static,
{
    Unary { handler }
}

impl<F, Fut> CallHandler for Unary<F>
where
    F: Fn(Bytes) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, Status>> + Send + 'static,
{
    fn start_call(&self, _call: &ServerCall) -> Box<dyn ServerCallListener> {
        Box::new(UnaryListener {
            handler: self.handler.clone(),
            request: None,
        })
    }
}

struct UnaryListener<F> {
    handler: F,
    request: Option<Bytes>,
}

#[async_trait]
impl<F, Fut> ServerCallListener for UnaryListener<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, Status>> + Send + 'static,
{
    async fn on_message(&mut self, _call: &mut ServerCall, message: Bytes) -> Result<(), Status> {
        if self.request.is_some() {
            return Err(Status::internal("Too many requests"));
        }
        self.request = Some(message);
        Ok(())
    }

    async fn on_half_close(&mut self, call: &mut ServerCall) -> Result<(), Status> {
        let Some(request) = self.request.take() else {
            return Err(Status::internal("Half-closed without a request"));
        };
        let response = (self.handler)(request).await?;
        call.send_message(response)?;
        call.close(Status::ok());
        Ok(())
    }
}
