#![doc(html_root_url = "https://docs.rs/grpcwire/latest")]
//! Public API for the `grpcwire` library.
//!
//! This crate is the inbound half of a gRPC server. It turns the ordered body
//! chunks of an HTTP/2 stream into discrete messages, validates and routes the
//! request, and drives the handler for each call on a worker task.

pub mod buffer;
pub mod byte_order;
pub mod call;
pub mod compression;
pub mod config;
pub mod deframer;
pub mod dispatcher;
pub mod framer;
pub mod method;
pub mod metrics;
pub mod panic;
pub mod registry;
pub mod status;
pub mod transport;

pub use call::{CallHandler, CallId, CallState, ServerCall, ServerCallListener, unary};
pub use config::DispatcherConfig;
pub use deframer::{Deframer, DeframerConfig, DeframerEvent, DeframerListener, EventQueue};
pub use dispatcher::{Dispatcher, RequestRejection};
pub use framer::MessageFramer;
pub use method::{MethodDescriptor, MethodType};
pub use registry::{MethodRegistry, RegistryError, ServiceDefinition};
pub use status::{Code, Status};
pub use transport::{BodyChunk, InboundRequest, RequestHead, ResponsePart};
