//! Utilities for working with panic payloads.
//!
//! Call tasks catch handler panics so one misbehaving handler cannot take the
//! dispatcher down. These helpers turn the payload into something loggable.

use std::{any::Any, fmt};

/// Borrowed panic payload that formats as the panic message.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use grpcwire::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(&*payload).to_string(), "boom");
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
/// assert_eq!(format_panic(&*payload).to_string(), "bang");
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert!(format_panic(&*payload).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Borrow `panic` as a displayable [`PanicMessage`].
///
/// Pass the payload itself (`&*boxed`), not a reference to its box.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }
