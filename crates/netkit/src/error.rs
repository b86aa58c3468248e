//! Error types for the request layer
//!
//! [`NetworkError`] is the closed set of terminal failures a caller can see
//! in a [`Response`](crate::Response). Nothing in this crate returns one
//! across the transport boundary; every failure is captured inside the
//! owning request and delivered through its callback.

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

/// Boxed error produced by caller-supplied code such as middleware
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by the transport for a single task
#[derive(Debug, Error)]
pub enum TransportError {
    /// The task was cancelled before it completed
    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was torn down and accepts no new tasks
    #[error("Transport invalidated")]
    Invalidated,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Failure to turn response bytes into the expected payload
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Custom(String),
}

/// Decoded body of a response whose status fell outside the acceptable set
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub status: StatusCode,
    /// Raw body as received
    pub body: Bytes,
    /// The body as JSON, when it is JSON
    pub json: Option<serde_json::Value>,
}

impl ErrorPayload {
    pub fn new(status: StatusCode, body: Bytes) -> Self {
        let json = serde_json::from_slice(&body).ok();
        Self { status, body, json }
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Terminal failure of a logical request
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parsing error: {0}")]
    Parsing(#[from] ParseError),

    /// Transport-level failure other than cancellation
    #[error("Response error: {0}")]
    Response(#[source] TransportError),

    #[error("Response contained no data")]
    DataMissing,

    #[error("No response received")]
    ResponseMissing,

    #[error("Server returned error status {}", .0.status)]
    ErrorResponse(ErrorPayload),

    #[error("Middleware error: {0}")]
    Middleware(#[source] BoxError),

    /// Status outside the acceptable set with nothing in the body
    #[error("Response status {0} failed validation")]
    Validate(StatusCode),

    #[error("Request cancelled")]
    Cancelled,
}

/// Payload-free discriminant of [`NetworkError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    InvalidUrl,
    Parsing,
    Response,
    DataMissing,
    ResponseMissing,
    ErrorResponse,
    Middleware,
    Validate,
    Cancelled,
}

impl NetworkError {
    /// Classify a transport failure; cancellation gets its own kind.
    pub fn from_transport(error: TransportError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Response(error)
        }
    }

    pub fn kind(&self) -> NetworkErrorKind {
        match self {
            Self::InvalidUrl(_) => NetworkErrorKind::InvalidUrl,
            Self::Parsing(_) => NetworkErrorKind::Parsing,
            Self::Response(_) => NetworkErrorKind::Response,
            Self::DataMissing => NetworkErrorKind::DataMissing,
            Self::ResponseMissing => NetworkErrorKind::ResponseMissing,
            Self::ErrorResponse(_) => NetworkErrorKind::ErrorResponse,
            Self::Middleware(_) => NetworkErrorKind::Middleware,
            Self::Validate(_) => NetworkErrorKind::Validate,
            Self::Cancelled => NetworkErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Status code carried by the error itself, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::ErrorResponse(payload) => Some(payload.status),
            Self::Validate(status) => Some(*status),
            _ => None,
        }
    }
}

/// Failure while constructing a [`Network`](crate::Network)
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Cache setup failed: {0}")]
    Cache(#[from] netkit_cache::CacheError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Runtime setup failed: {0}")]
    Runtime(#[from] std::io::Error),
}
