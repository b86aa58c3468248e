//! # netkit - Callback-based HTTP request layer
//!
//! `netkit` runs HTTP requests on a background transport and hands each
//! result to a callback on a single, serial delivery context. It is built
//! for applications with one "main" thread that owns their state and wants
//! every network result to arrive there, in order, exactly once.
//!
//! ## Architecture
//!
//! 1. **Network facade** ([`Network`]): turns a URL, [`Endpoint`] or
//!    [`RequestDescriptor`] into a request, serves it from the cache when
//!    possible and otherwise starts a transport task.
//! 2. **Session event router**: maps each live [`TaskId`] to the request
//!    waiting on it and forwards transport events under one lock.
//! 3. **Request state machine**: accumulates the body, validates the
//!    status, parses, writes the cache, then schedules the callback once.
//! 4. **Transport** ([`Transport`], [`ReqwestTransport`]): reqwest on a
//!    dedicated tokio runtime.
//! 5. **Delivery** ([`DeliveryContext`], [`MainQueue`]): the serial
//!    executor callbacks run on.
//!
//! Caching is pluggable through [`netkit_cache::CacheProvider`].
//!
//! ## Failure model
//!
//! Every failure becomes a [`NetworkError`] inside the [`Response`] passed
//! to the callback. `request*` methods never return errors; they return the
//! started [`TaskId`], or `None` when no task was needed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use netkit::{Endpoint, HttpMethod, Network, NetworkConfig, Response};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let network = Network::new(NetworkConfig::from_env())?;
//!
//! let endpoint = Endpoint::new("https://httpbin.org", "post")
//!     .method(HttpMethod::Post)
//!     .json(serde_json::json!({"hello": "world"}));
//!
//! let task = network.request(endpoint, |response: Response<serde_json::Value>| {
//!     println!("{}", response.debug_description());
//! });
//!
//! if let Some(task) = task {
//!     network.cancel_task(task);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delivery;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod middleware;
pub mod mock;
pub mod network;
pub mod parser;
mod request;
pub mod response;
mod router;
pub mod transport;
pub mod validation;

pub use config::{CacheConfig, NetworkConfig};
pub use delivery::{DeliveryContext, Job, MainQueue};
pub use descriptor::{HttpMethod, RequestDescriptor, ResponseHead};
pub use endpoint::{BodyType, Endpoint, HttpHeaders, IntoRequest, QueryParameters};
pub use error::{
    BoxError, ErrorPayload, NetworkError, NetworkErrorKind, ParseError, SetupError, TransportError,
};
pub use middleware::{DefaultHeaders, Middleware, MiddlewareChain};
pub use mock::MockNetwork;
pub use network::{CachePolicy, Network, NetworkBuilder, RequestOptions};
pub use parser::{BytesParser, EmptyParser, FnParser, JsonParser, ResponseParser, TextParser};
pub use response::Response;
pub use transport::{
    DispositionSender, ReqwestTransport, ResponseDisposition, SessionDelegate, TaskId, Transport,
};
pub use validation::StatusValidation;

pub use netkit_cache as cache;
