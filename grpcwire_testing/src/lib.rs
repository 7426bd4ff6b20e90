//! Utilities for driving a [`Dispatcher`](grpcwire::Dispatcher) with
//! in-memory requests during tests.
//!
//! Requests are assembled with [`TestRequest`], their responses gathered by a
//! [`ResponseCollector`], and handler activity observed through a
//! [`RecordingHandler`].
//!
//! ```rust
//! use grpcwire_testing::{TestRequest, frame};
//!
//! let (request, responses) = TestRequest::grpc("/echo.Echo/Say")
//!     .last(frame(b"hello"))
//!     .build();
//! # drop((request, responses));
//! ```

pub mod frames;
pub mod handler;
pub mod logging;
pub mod request;
pub mod response;

pub use frames::{chunk_at, compressed_frame, frame, frames};
pub use handler::{Recorded, RecordingHandler, panicking};
pub use logging::{LoggerHandle, logger};
pub use request::TestRequest;
pub use response::{CollectedResponse, ResponseCollector};
