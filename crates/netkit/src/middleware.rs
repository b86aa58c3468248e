//! Request/response interception hooks
//!
//! Middleware runs at three points of a request's life:
//!
//! 1. [`prepare`](Middleware::prepare) before dispatch, on the caller's
//!    thread. It may rewrite the request; an error fails the request with
//!    `Middleware` before anything is sent.
//! 2. [`on_response`](Middleware::on_response) when the response head
//!    arrives. An error cancels the transfer.
//! 3. [`process`](Middleware::process) once the body is complete, before
//!    status validation and parsing.
//!
//! Hooks 2 and 3 run on transport workers.

use std::sync::Arc;

use crate::descriptor::{RequestDescriptor, ResponseHead};
use crate::error::{BoxError, NetworkError};

pub trait Middleware: Send + Sync {
    fn prepare(&self, request: RequestDescriptor) -> Result<RequestDescriptor, BoxError> {
        Ok(request)
    }

    fn on_response(&self, _request: &RequestDescriptor, _head: &ResponseHead) -> Result<(), BoxError> {
        Ok(())
    }

    fn process(
        &self,
        _request: &RequestDescriptor,
        _head: &ResponseHead,
        _data: &[u8],
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Ordered list of middleware applied as one
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub(crate) fn prepare(&self, request: RequestDescriptor) -> Result<RequestDescriptor, NetworkError> {
        self.layers
            .iter()
            .try_fold(request, |request, layer| layer.prepare(request))
            .map_err(NetworkError::Middleware)
    }

    pub(crate) fn on_response(
        &self,
        request: &RequestDescriptor,
        head: &ResponseHead,
    ) -> Result<(), BoxError> {
        self.layers
            .iter()
            .try_for_each(|layer| layer.on_response(request, head))
    }

    pub(crate) fn process(
        &self,
        request: &RequestDescriptor,
        head: &ResponseHead,
        data: &[u8],
    ) -> Result<(), NetworkError> {
        self.layers
            .iter()
            .try_for_each(|layer| layer.process(request, head, data))
            .map_err(NetworkError::Middleware)
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// Adds headers to every request that doesn't already set them
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl Middleware for DefaultHeaders {
    fn prepare(&self, mut request: RequestDescriptor) -> Result<RequestDescriptor, BoxError> {
        for (name, value) in &self.headers {
            if request.header(name).is_none() {
                request = request.with_header(name, value)?;
            }
        }
        Ok(request)
    }
}
