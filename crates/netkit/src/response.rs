//! The value handed to a request's callback

use bytes::Bytes;
use reqwest::{StatusCode, header::HeaderMap};
use std::fmt::Write as _;

use crate::descriptor::{RequestDescriptor, ResponseHead};
use crate::error::NetworkError;

/// Outcome of one logical request.
///
/// Carries the original request and, when they exist, the response head and
/// the raw body next to the parsed result. The body is kept even when the
/// result is an error so callers can inspect what the server actually sent.
#[derive(Debug)]
pub struct Response<T> {
    request: Option<RequestDescriptor>,
    response: Option<ResponseHead>,
    data: Option<Bytes>,
    result: Result<T, NetworkError>,
    from_cache: bool,
}

impl<T> Response<T> {
    pub(crate) fn new(
        request: Option<RequestDescriptor>,
        response: Option<ResponseHead>,
        data: Option<Bytes>,
        result: Result<T, NetworkError>,
    ) -> Self {
        Self {
            request,
            response,
            data,
            result,
            from_cache: false,
        }
    }

    /// A request that failed before anything was sent
    pub(crate) fn failed(request: Option<RequestDescriptor>, error: NetworkError) -> Self {
        Self::new(request, None, None, Err(error))
    }

    pub(crate) fn cached(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// `None` only when the request could not be constructed
    pub fn request(&self) -> Option<&RequestDescriptor> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&ResponseHead> {
        self.response.as_ref()
    }

    /// Raw body, `None` when nothing was received
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn result(&self) -> &Result<T, NetworkError> {
        &self.result
    }

    pub fn into_result(self) -> Result<T, NetworkError> {
        self.result
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&NetworkError> {
        self.result.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// True when served from the cache provider without a network round trip
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|head| head.status)
    }

    pub fn canonical_reason(&self) -> Option<&'static str> {
        self.status_code().and_then(|status| status.canonical_reason())
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.response.as_ref().map(|head| &head.headers)
    }

    /// Multi-line summary of the exchange for logs and bug reports
    pub fn debug_description(&self) -> String {
        let mut out = String::new();

        match &self.request {
            Some(request) => {
                let _ = writeln!(out, "[Request]: {} {}", request.method, request.url);
                for (name, value) in &request.headers {
                    let _ = writeln!(
                        out,
                        "    {name}: {}",
                        value.to_str().unwrap_or("<binary>")
                    );
                }
            }
            None => out.push_str("[Request]: None\n"),
        }

        match &self.response {
            Some(head) => {
                let _ = writeln!(out, "[Response]: {}", head.status);
                for (name, value) in &head.headers {
                    let _ = writeln!(
                        out,
                        "    {name}: {}",
                        value.to_str().unwrap_or("<binary>")
                    );
                }
            }
            None => out.push_str("[Response]: None\n"),
        }

        let _ = writeln!(
            out,
            "[Data]: {} bytes",
            self.data.as_ref().map_or(0, Bytes::len)
        );
        let _ = writeln!(out, "[Cached]: {}", self.from_cache);
        match &self.result {
            Ok(_) => out.push_str("[Result]: SUCCESS"),
            Err(e) => {
                let _ = write!(out, "[Result]: FAILURE {e}");
            }
        }
        out
    }
}
