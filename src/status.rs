//! gRPC status codes and the metadata used to carry them.
//!
//! A [`Status`] is the error value of the protocol layer: every frame,
//! call and dispatch failure is ultimately reported to the peer as a code
//! plus a human-readable message in the `grpc-status` and `grpc-message`
//! metadata entries.

use std::{fmt, str::FromStr};

use http::{HeaderMap, HeaderValue};
use thiserror::Error;

/// Metadata key carrying the numeric status code.
pub const GRPC_STATUS: &str = "grpc-status";
/// Metadata key carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";
/// Metadata key naming the message encoding of a request or response.
pub const GRPC_ENCODING: &str = "grpc-encoding";
/// Metadata key listing the message encodings a peer accepts.
pub const GRPC_ACCEPT_ENCODING: &str = "grpc-accept-encoding";
/// Content type sent on every gRPC response.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Canonical gRPC status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    const ALL: [Code; 17] = [
        Code::Ok,
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
        Code::Unauthenticated,
    ];

    /// Numeric value transmitted in `grpc-status`.
    #[must_use]
    pub fn value(self) -> i32 { self as i32 }

    /// Map a numeric value back to its code. Unrecognised values become
    /// [`Code::Unknown`], matching how gRPC peers treat them.
    #[must_use]
    pub fn from_i32(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .unwrap_or(Code::Unknown)
    }

    /// Upper snake case name, as used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when a `grpc-status` value cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid grpc-status value: {0:?}")]
pub struct InvalidCode(String);

impl FromStr for Code {
    type Err = InvalidCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(Code::from_i32)
            .map_err(|_| InvalidCode(s.to_owned()))
    }
}

/// A status code paired with a description.
///
/// # Examples
///
/// ```
/// use grpcwire::status::{Code, Status};
///
/// let status = Status::resource_exhausted("Frame size 10 exceeds maximum: 4. ");
/// assert_eq!(status.code(), Code::ResourceExhausted);
/// assert!(!status.is_ok());
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Construct a status from a code and description.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The successful status.
    #[must_use]
    pub fn ok() -> Self { Self::new(Code::Ok, "") }

    pub fn cancelled(message: impl Into<String>) -> Self { Self::new(Code::Cancelled, message) }

    pub fn internal(message: impl Into<String>) -> Self { Self::new(Code::Internal, message) }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    #[must_use]
    pub fn code(&self) -> Code { self.code }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    #[must_use]
    pub fn is_ok(&self) -> bool { self.code == Code::Ok }

    /// Write `grpc-status` and, when non-empty, `grpc-message` into `headers`.
    pub fn write_metadata(&self, headers: &mut HeaderMap) {
        headers.insert(GRPC_STATUS, HeaderValue::from(self.code.value()));
        if self.message.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&percent_encode(&self.message)) {
            headers.insert(GRPC_MESSAGE, value);
        }
    }

    /// Read a status back from response metadata.
    ///
    /// Returns `None` when `grpc-status` is absent or unparsable.
    #[must_use]
    pub fn from_metadata(headers: &HeaderMap) -> Option<Self> {
        let code = headers
            .get(GRPC_STATUS)?
            .to_str()
            .ok()?
            .parse::<Code>()
            .ok()?;
        let message = headers
            .get(GRPC_MESSAGE)
            .and_then(|v| v.to_str().ok())
            .map(percent_decode)
            .unwrap_or_default();
        Some(Self::new(code, message))
    }
}

/// Percent-encode a status message for the `grpc-message` header.
///
/// Printable ASCII other than `%` passes through; every other byte of the
/// UTF-8 encoding becomes `%XX`.
#[must_use]
pub fn percent_encode(message: &str) -> String {
    use fmt::Write as _;

    let mut out = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Reverse [`percent_encode`]. Malformed escapes are kept verbatim.
#[must_use]
pub fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while let Some(&byte) = bytes.get(idx) {
        if byte == b'%'
            && let Some(hex) = bytes.get(idx + 1..idx + 3)
            && let Ok(hex) = std::str::from_utf8(hex)
            && let Ok(decoded) = u8::from_str_radix(hex, 16)
        {
            out.push(decoded);
            idx += 3;
            continue;
        }
        out.push(byte);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Code::Ok, 0)]
    #[case(Code::Cancelled, 1)]
    #[case(Code::ResourceExhausted, 8)]
    #[case(Code::Unimplemented, 12)]
    #[case(Code::Internal, 13)]
    #[case(Code::Unauthenticated, 16)]
    fn codes_map_to_wire_values(#[case] code: Code, #[case] value: i32) {
        assert_eq!(code.value(), value);
        assert_eq!(Code::from_i32(value), code);
        assert_eq!(value.to_string().parse::<Code>(), Ok(code));
    }

    #[rstest]
    #[case(-1)]
    #[case(17)]
    #[case(400)]
    fn out_of_range_values_are_unknown(#[case] value: i32) {
        assert_eq!(Code::from_i32(value), Code::Unknown);
    }

    #[test]
    fn non_numeric_status_is_rejected() {
        assert!("INTERNAL".parse::<Code>().is_err());
    }

    #[rstest]
    #[case("Method not found: pkg.Svc/Call", "Method not found: pkg.Svc/Call")]
    #[case("100%", "100%25")]
    #[case("line\nbreak", "line%0Abreak")]
    #[case("caf\u{e9}", "caf%C3%A9")]
    fn messages_are_percent_encoded(#[case] raw: &str, #[case] encoded: &str) {
        assert_eq!(percent_encode(raw), encoded);
        assert_eq!(percent_decode(encoded), raw);
    }

    #[test]
    fn malformed_escapes_survive_decoding() {
        assert_eq!(percent_decode("50%"), "50%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn status_round_trips_through_metadata() {
        let status = Status::internal("Encountered end-of-stream mid-frame");
        let mut headers = HeaderMap::new();
        status.write_metadata(&mut headers);

        assert_eq!(headers.get(GRPC_STATUS).expect("grpc-status"), "13");
        assert_eq!(Status::from_metadata(&headers), Some(status));
    }

    #[test]
    fn ok_status_omits_message() {
        let mut headers = HeaderMap::new();
        Status::ok().write_metadata(&mut headers);

        assert_eq!(headers.get(GRPC_STATUS).expect("grpc-status"), "0");
        assert!(headers.get(GRPC_MESSAGE).is_none());
    }

    #[test]
    fn display_includes_code_name() {
        let status = Status::unimplemented("Method not found: a/b");
        assert_eq!(status.to_string(), "UNIMPLEMENTED: Method not found: a/b");
    }
}
