//! Request validation performed before a call is started.

use http::{Method, StatusCode, header::CONTENT_TYPE};
use thiserror::Error;

use crate::{
    status::{Code, GRPC_CONTENT_TYPE, Status},
    transport::RequestHead,
};

/// Why a request was refused before reaching a handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestRejection {
    #[error("Expected path is missing")]
    MissingPath,
    #[error("Expected path to start with /: {0}")]
    InvalidPath(String),
    #[error("Content-Type is missing from the request")]
    MissingContentType,
    #[error("Content-Type '{0}' is not supported")]
    UnsupportedContentType(String),
    #[error("Method '{0}' is not supported")]
    MethodNotAllowed(Method),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Can't find decompressor for {0}")]
    UnsupportedEncoding(String),
}

impl RequestRejection {
    /// HTTP status of the trailers-only response.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingPath | Self::InvalidPath(_) | Self::MethodNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::MissingContentType | Self::UnsupportedContentType(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedEncoding(_) => StatusCode::OK,
        }
    }

    /// gRPC code carried in `grpc-status`.
    #[must_use]
    pub fn grpc_code(&self) -> Code {
        match self {
            Self::MissingPath
            | Self::InvalidPath(_)
            | Self::MethodNotFound(_)
            | Self::UnsupportedEncoding(_) => Code::Unimplemented,
            Self::MissingContentType
            | Self::UnsupportedContentType(_)
            | Self::MethodNotAllowed(_) => Code::Internal,
        }
    }

    /// Status reported to the peer.
    #[must_use]
    pub fn status(&self) -> Status { Status::new(self.grpc_code(), self.to_string()) }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingPath => "missing_path",
            Self::InvalidPath(_) => "invalid_path",
            Self::MissingContentType => "missing_content_type",
            Self::UnsupportedContentType(_) => "unsupported_content_type",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::MethodNotFound(_) => "method_not_found",
            Self::UnsupportedEncoding(_) => "unsupported_encoding",
        }
    }
}

/// Whether `content_type` is `application/grpc` or one of its variants.
#[must_use]
pub fn is_grpc_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix(GRPC_CONTENT_TYPE) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('+') || rest.starts_with(';')
}

/// Check path, content type and method, in that order, and return the
/// routing key.
///
/// # Errors
///
/// Returns the first [`RequestRejection`] that applies.
pub fn validate(head: &RequestHead) -> Result<&str, RequestRejection> {
    let path = head.path.as_deref().ok_or(RequestRejection::MissingPath)?;
    let Some(key) = path.strip_prefix('/') else {
        return Err(RequestRejection::InvalidPath(path.to_owned()));
    };

    let content_type = head
        .headers
        .get(CONTENT_TYPE)
        .ok_or(RequestRejection::MissingContentType)?;
    let content_type = String::from_utf8_lossy(content_type.as_bytes());
    if !is_grpc_content_type(&content_type) {
        return Err(RequestRejection::UnsupportedContentType(
            content_type.into_owned(),
        ));
    }

    if head.method != Method::POST {
        return Err(RequestRejection::MethodNotAllowed(head.method.clone()));
    }
    Ok(key)
}
