//! The network facade
//!
//! [`Network`] is the entry point callers use. Each `request*` call turns a
//! target into a [`RequestDescriptor`], consults the cache, and otherwise
//! creates a transport task, registers it with the router and starts it.
//! The callback always runs exactly once on the configured delivery
//! context, unless the `Network` is dropped first.

use bytes::Bytes;
use netkit_cache::{CacheKey, CacheProvider};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::NetworkConfig;
use crate::delivery::{DeliveryContext, MainQueue};
use crate::descriptor::{HttpMethod, RequestDescriptor, ResponseHead};
use crate::endpoint::IntoRequest;
use crate::error::{NetworkError, SetupError, TransportError};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::parser::{BytesParser, JsonParser, ResponseParser};
use crate::request::{Completion, Pipeline, Request, TaskHandler};
use crate::response::Response;
use crate::router::SessionRouter;
use crate::transport::{ReqwestTransport, SessionDelegate, TaskId, Transport};
use crate::validation::StatusValidation;

/// When responses are read from and written to the cache provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Serve matching requests from the cache when an entry exists
    pub read: bool,
    /// Store successful responses
    pub write: bool,
    /// Methods the policy applies to
    pub methods: Vec<HttpMethod>,
    /// Request headers that take part in the cache key
    pub vary_headers: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            methods: vec![HttpMethod::Get],
            vary_headers: Vec::new(),
        }
    }
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self {
            read: false,
            write: false,
            ..Self::default()
        }
    }

    /// Always go to the network but keep the cache fresh
    pub fn refresh() -> Self {
        Self {
            read: false,
            ..Self::default()
        }
    }

    pub fn vary_on(mut self, header: impl Into<String>) -> Self {
        self.vary_headers.push(header.into());
        self
    }

    fn applies_to(&self, method: &Method) -> bool {
        (self.read || self.write) && self.methods.iter().any(|m| m.to_method() == *method)
    }
}

/// Per-call overrides of the facade defaults
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub cache_policy: Option<CachePolicy>,
    pub acceptable_status: Option<StatusValidation>,
}

impl RequestOptions {
    pub fn no_cache() -> Self {
        Self {
            cache_policy: Some(CachePolicy::disabled()),
            ..Self::default()
        }
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    pub fn acceptable_status(mut self, validation: StatusValidation) -> Self {
        self.acceptable_status = Some(validation);
        self
    }
}

/// Callback-based HTTP client.
///
/// ```no_run
/// use netkit::{Network, NetworkConfig, Response};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Echo {
///     url: String,
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let network = Network::new(NetworkConfig::default())?;
/// network.request("https://httpbin.org/get", |response: Response<Echo>| {
///     match response.into_result() {
///         Ok(echo) => println!("fetched {}", echo.url),
///         Err(e) => eprintln!("request failed: {e}"),
///     }
/// });
/// # Ok(())
/// # }
/// ```
pub struct Network {
    transport: Arc<dyn Transport>,
    router: Arc<SessionRouter>,
    cache: Arc<dyn CacheProvider>,
    delivery: Arc<dyn DeliveryContext>,
    middleware: MiddlewareChain,
    cache_policy: CachePolicy,
    validation: StatusValidation,
}

impl Network {
    /// Facade with the reqwest transport, the cache described by `config`
    /// and callbacks on the shared [`MainQueue`]
    pub fn new(config: NetworkConfig) -> Result<Self, SetupError> {
        NetworkBuilder::new(config).build()
    }

    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new(NetworkConfig::default())
    }

    /// GET or send `target` and decode a JSON body into `T`.
    ///
    /// Returns the task id when a network task was started, `None` when the
    /// callback has already been scheduled (invalid request or cache hit).
    pub fn request<T>(
        &self,
        target: impl IntoRequest,
        callback: impl FnOnce(Response<T>) + Send + 'static,
    ) -> Option<TaskId>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request_with(target, JsonParser::new(), RequestOptions::default(), callback)
    }

    /// Like [`request`](Self::request) but hands back the raw body
    pub fn request_data(
        &self,
        target: impl IntoRequest,
        callback: impl FnOnce(Response<Bytes>) + Send + 'static,
    ) -> Option<TaskId> {
        self.request_with(target, BytesParser, RequestOptions::default(), callback)
    }

    /// Fully general form: any parser, per-call options
    pub fn request_with<T, P>(
        &self,
        target: impl IntoRequest,
        parser: P,
        options: RequestOptions,
        callback: impl FnOnce(Response<T>) + Send + 'static,
    ) -> Option<TaskId>
    where
        T: Send + 'static,
        P: ResponseParser<T> + 'static,
    {
        let completion = Completion::new(Box::new(callback), Arc::clone(&self.delivery));

        let descriptor = match target.into_request() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "request could not be constructed");
                completion.deliver(Response::failed(None, e));
                return None;
            }
        };

        let descriptor = match self.middleware.prepare(descriptor.clone()) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(url = %descriptor.url, error = %e, "request refused by middleware");
                completion.deliver(Response::failed(Some(descriptor), e));
                return None;
            }
        };

        let policy = options.cache_policy.as_ref().unwrap_or(&self.cache_policy);
        let parser: Arc<dyn ResponseParser<T>> = Arc::new(parser);
        let key = policy
            .applies_to(&descriptor.method)
            .then(|| descriptor.cache_key(&policy.vary_headers));

        if policy.read
            && let Some(key) = &key
        {
            match self.serve_cached(key, &descriptor, parser.as_ref()) {
                Some(Ok(response)) => {
                    completion.deliver(response);
                    return None;
                }
                Some(Err(e)) => {
                    warn!(key = %key, error = %e, "discarding unusable cache entry");
                    self.cache.remove(key);
                }
                None => {}
            }
        }

        let pipeline = Pipeline {
            parser,
            middleware: self.middleware.clone(),
            validation: options.acceptable_status.unwrap_or(self.validation),
            cache: key
                .filter(|_| policy.write)
                .map(|key| (Arc::clone(&self.cache), key)),
        };

        self.dispatch(Request::new(descriptor, pipeline, completion))
    }

    /// Look `key` up and decode the hit. `None` on a miss.
    fn serve_cached<T>(
        &self,
        key: &CacheKey,
        descriptor: &RequestDescriptor,
        parser: &dyn ResponseParser<T>,
    ) -> Option<Result<Response<T>, NetworkError>> {
        let hit = self.cache.lookup(key)?;

        let decoded = if hit.data.is_empty() && parser.requires_data() {
            Err(NetworkError::DataMissing)
        } else {
            parser.parse(&hit.data).map_err(NetworkError::from)
        };

        Some(decoded.map(|value| {
            debug!(key = %key, bytes = hit.data.len(), "served from cache");
            let head = ResponseHead::from_metadata(&hit.metadata, descriptor.url.clone());
            let data = (!hit.data.is_empty()).then_some(hit.data);
            Response::new(Some(descriptor.clone()), Some(head), data, Ok(value)).cached()
        }))
    }

    fn dispatch<T: Send + 'static>(&self, mut request: Request<T>) -> Option<TaskId> {
        let delegate: Arc<dyn SessionDelegate> = self.router.clone();

        let task = match self
            .transport
            .create_task(request.descriptor().clone(), delegate)
        {
            Ok(task) => task,
            Err(e) => {
                error!(url = %request.descriptor().url, error = %e, "transport refused the request");
                Box::new(request).did_complete(Some(e));
                return None;
            }
        };

        request.set_task_id(task);
        if let Err(refused) = self.router.register(task, Box::new(request)) {
            self.transport.discard(task);
            refused.did_complete(Some(TransportError::Other(format!(
                "{task} is already in use"
            ))));
            return None;
        }

        self.transport.resume(task);
        debug!(task = %task, "task started");
        Some(task)
    }

    /// Stop a running task. Its callback still runs, with `Cancelled`.
    /// Unknown or finished ids are ignored.
    pub fn cancel_task(&self, task: TaskId) {
        debug!(task = %task, "cancel requested");
        self.transport.cancel(task);
    }

    /// Tasks started and not yet completed
    pub fn active_task_count(&self) -> usize {
        self.router.len()
    }

    pub fn cache(&self) -> &Arc<dyn CacheProvider> {
        &self.cache
    }

    pub fn delivery_context(&self) -> &Arc<dyn DeliveryContext> {
        &self.delivery
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        let pending = self.router.len();
        self.router.invalidate();
        self.transport.invalidate_and_cancel();
        if pending > 0 {
            debug!(pending, "network dropped with requests in flight");
        }
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("active_tasks", &self.router.len())
            .field("middleware", &self.middleware)
            .field("cache_policy", &self.cache_policy)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Network`], replacing any of its parts
pub struct NetworkBuilder {
    config: NetworkConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn CacheProvider>>,
    delivery: Option<Arc<dyn DeliveryContext>>,
    middleware: MiddlewareChain,
}

impl NetworkBuilder {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            transport: None,
            cache: None,
            delivery: None,
            middleware: MiddlewareChain::new(),
        }
    }

    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn DeliveryContext>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Result<Network, SetupError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let cache = match self.cache {
            Some(cache) => cache,
            None => self.config.cache.build_provider()?,
        };
        let delivery = match self.delivery {
            Some(delivery) => delivery,
            None => MainQueue::shared(),
        };

        Ok(Network {
            transport,
            router: Arc::new(SessionRouter::new()),
            cache,
            delivery,
            middleware: self.middleware,
            cache_policy: self.config.cache_policy,
            validation: self.config.acceptable_status,
        })
    }
}
