//! Per-request state machine
//!
//! A [`Request`] owns everything needed to turn transport events for one
//! task into a single [`Response`]: the outbound descriptor, the response
//! head, the accumulated body, the parser, the cache target and the
//! callback. It is driven by the router and consumed by its completion, so
//! the callback can only ever be scheduled once.

use bytes::{Bytes, BytesMut};
use netkit_cache::{CacheKey, CacheProvider};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::delivery::DeliveryContext;
use crate::descriptor::{RequestDescriptor, ResponseHead};
use crate::error::{BoxError, ErrorPayload, NetworkError, TransportError};
use crate::middleware::MiddlewareChain;
use crate::parser::ResponseParser;
use crate::response::Response;
use crate::transport::{ResponseDisposition, TaskId};
use crate::validation::StatusValidation;

/// Receiver of one task's events, as seen by the router
pub(crate) trait TaskHandler: Send {
    fn did_receive_response(&mut self, head: ResponseHead) -> ResponseDisposition;

    fn did_receive_data(&mut self, data: Bytes);

    /// Consumes the handler; nothing can be delivered twice
    fn did_complete(self: Box<Self>, error: Option<TransportError>);
}

/// User callback for a request producing `T`
pub(crate) type Callback<T> = Box<dyn FnOnce(Response<T>) + Send + 'static>;

/// Callback bound to the context it must run on
pub(crate) struct Completion<T> {
    callback: Callback<T>,
    context: Arc<dyn DeliveryContext>,
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn new(callback: Callback<T>, context: Arc<dyn DeliveryContext>) -> Self {
        Self { callback, context }
    }

    pub(crate) fn deliver(self, response: Response<T>) {
        let Self { callback, context } = self;
        context.deliver(Box::new(move || callback(response)));
    }

    /// For callers already running on the delivery context
    pub(crate) fn run_inline(self, response: Response<T>) {
        (self.callback)(response);
    }
}

/// Post-transfer processing shared by network and file-backed requests
pub(crate) struct Pipeline<T> {
    pub(crate) parser: Arc<dyn ResponseParser<T>>,
    pub(crate) middleware: MiddlewareChain,
    pub(crate) validation: StatusValidation,
    /// Where to store the body on success, when the cache policy allows it
    pub(crate) cache: Option<(Arc<dyn CacheProvider>, CacheKey)>,
}

impl<T> Pipeline<T> {
    /// Classify a finished transfer that carried no transport error
    pub(crate) fn evaluate(
        &self,
        request: &RequestDescriptor,
        head: Option<&ResponseHead>,
        data: &Bytes,
    ) -> Result<T, NetworkError> {
        let head = head.ok_or(NetworkError::ResponseMissing)?;

        self.middleware.process(request, head, data)?;

        if !self.validation.accepts(head.status) {
            return Err(if data.is_empty() {
                NetworkError::Validate(head.status)
            } else {
                NetworkError::ErrorResponse(ErrorPayload::new(head.status, data.clone()))
            });
        }

        if data.is_empty() && self.parser.requires_data() {
            return Err(NetworkError::DataMissing);
        }

        let value = self.parser.parse(data)?;

        // Only 2xx bodies are cached, however wide the acceptable range is
        if let Some((cache, key)) = &self.cache
            && head.status.is_success()
        {
            match cache.store(key.clone(), data.clone(), head.to_metadata()) {
                Ok(()) => trace!(key = %key, bytes = data.len(), "response cached"),
                Err(e) => warn!(key = %key, error = %e, "failed to cache response"),
            }
        }

        Ok(value)
    }
}

/// One logical request in flight
pub(crate) struct Request<T> {
    task_id: Option<TaskId>,
    descriptor: RequestDescriptor,
    response: Option<ResponseHead>,
    buffer: BytesMut,
    /// Set when middleware refused the response head
    rejected: Option<BoxError>,
    pipeline: Pipeline<T>,
    completion: Completion<T>,
}

impl<T: Send + 'static> Request<T> {
    pub(crate) fn new(
        descriptor: RequestDescriptor,
        pipeline: Pipeline<T>,
        completion: Completion<T>,
    ) -> Self {
        Self {
            task_id: None,
            descriptor,
            response: None,
            buffer: BytesMut::new(),
            rejected: None,
            pipeline,
            completion,
        }
    }

    pub(crate) fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub(crate) fn set_task_id(&mut self, task: TaskId) {
        self.task_id = Some(task);
    }
}

impl<T: Send + 'static> TaskHandler for Request<T> {
    fn did_receive_response(&mut self, head: ResponseHead) -> ResponseDisposition {
        trace!(task = ?self.task_id, status = %head.status, "response head");

        let verdict = self.pipeline.middleware.on_response(&self.descriptor, &head);
        // A second head (e.g. after an informational response) replaces the first
        self.buffer.clear();
        self.response = Some(head);

        match verdict {
            Ok(()) => ResponseDisposition::Allow,
            Err(e) => {
                warn!(task = ?self.task_id, error = %e, "response rejected by middleware");
                self.rejected = Some(e);
                ResponseDisposition::Cancel
            }
        }
    }

    fn did_receive_data(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    fn did_complete(self: Box<Self>, error: Option<TransportError>) {
        let Self {
            task_id,
            descriptor,
            response,
            buffer,
            rejected,
            pipeline,
            completion,
        } = *self;
        let data = buffer.freeze();

        let result = if let Some(rejection) = rejected {
            Err(NetworkError::Middleware(rejection))
        } else if let Some(error) = error {
            Err(NetworkError::from_transport(error))
        } else {
            pipeline.evaluate(&descriptor, response.as_ref(), &data)
        };

        match &result {
            Ok(_) => debug!(task = ?task_id, url = %descriptor.url, bytes = data.len(), "request succeeded"),
            Err(e) if e.is_cancelled() => debug!(task = ?task_id, url = %descriptor.url, "request cancelled"),
            Err(e) => debug!(task = ?task_id, url = %descriptor.url, error = %e, "request failed"),
        }

        let data = (!data.is_empty()).then_some(data);
        completion.deliver(Response::new(Some(descriptor), response, data, result));
    }
}
