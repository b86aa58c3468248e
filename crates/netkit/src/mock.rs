//! File-backed stand-in for [`Network`](crate::Network)
//!
//! Answers every request from the local filesystem instead of the network:
//! `file://` URLs are read directly, any other URL has its path joined onto
//! a root directory. A readable file is a `200 OK` whose body is the file
//! contents; the usual validation and parsing then apply. Useful for
//! fixtures and offline development.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::delivery::{DeliveryContext, MainQueue};
use crate::descriptor::{RequestDescriptor, ResponseHead};
use crate::endpoint::IntoRequest;
use crate::error::{NetworkError, TransportError};
use crate::middleware::MiddlewareChain;
use crate::parser::{BytesParser, JsonParser, ResponseParser};
use crate::request::{Completion, Pipeline};
use crate::response::Response;
use crate::transport::TaskId;
use crate::validation::StatusValidation;

pub struct MockNetwork {
    root: Option<PathBuf>,
    delivery: Arc<dyn DeliveryContext>,
}

impl MockNetwork {
    /// Serve non-`file://` URLs from below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            delivery: MainQueue::shared(),
        }
    }

    /// Only `file://` URLs can be served
    pub fn files_only() -> Self {
        Self {
            root: None,
            delivery: MainQueue::shared(),
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryContext>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn request<T>(
        &self,
        target: impl IntoRequest,
        callback: impl FnOnce(Response<T>) + Send + 'static,
    ) -> Option<TaskId>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request_with(target, JsonParser::new(), callback)
    }

    pub fn request_data(
        &self,
        target: impl IntoRequest,
        callback: impl FnOnce(Response<Bytes>) + Send + 'static,
    ) -> Option<TaskId> {
        self.request_with(target, BytesParser, callback)
    }

    /// Never starts a task, so always returns `None`; the callback is
    /// scheduled on the delivery context either way.
    pub fn request_with<T, P>(
        &self,
        target: impl IntoRequest,
        parser: P,
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
                completion.deliver(Response::failed(None, e));
                return None;
            }
        };

        let path = match self.resolve(&descriptor) {
            Ok(path) => path,
            Err(e) => {
                completion.deliver(Response::failed(Some(descriptor), e));
                return None;
            }
        };

        let pipeline = Pipeline {
            parser: Arc::new(parser),
            middleware: MiddlewareChain::new(),
            validation: StatusValidation::default(),
            cache: None,
        };

        // Read on the delivery context so the file is loaded when the
        // callback is about to run, in order with other deliveries
        self.delivery.deliver(Box::new(move || {
            let response = read_file(&path, descriptor, &pipeline);
            completion.run_inline(response);
        }));
        None
    }

    fn resolve(&self, descriptor: &RequestDescriptor) -> Result<PathBuf, NetworkError> {
        let url = &descriptor.url;
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map_err(|()| NetworkError::InvalidUrl(format!("{url}: not a local file path")));
        }

        let root = self.root.as_ref().ok_or_else(|| {
            NetworkError::InvalidUrl(format!("{url}: no root directory for non-file URLs"))
        })?;
        let relative = url.path().trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            return Err(NetworkError::InvalidUrl(format!(
                "{url}: path escapes the root directory"
            )));
        }
        Ok(root.join(relative))
    }
}

impl std::fmt::Debug for MockNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNetwork")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn read_file<T>(path: &Path, descriptor: RequestDescriptor, pipeline: &Pipeline<T>) -> Response<T> {
    match std::fs::read(path) {
        Ok(contents) => {
            debug!(path = %path.display(), bytes = contents.len(), "serving file");
            let data = Bytes::from(contents);
            let mut head = ResponseHead::new(StatusCode::OK, descriptor.url.clone());
            if let Some(content_type) = content_type_for(path) {
                head.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            let result = pipeline.evaluate(&descriptor, Some(&head), &data);
            let data = (!data.is_empty()).then_some(data);
            Response::new(Some(descriptor), Some(head), data, result)
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "file not readable");
            Response::new(
                Some(descriptor),
                None,
                None,
                Err(NetworkError::Response(TransportError::Io(e))),
            )
        }
    }
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "json" => Some("application/json"),
        "txt" => Some("text/plain; charset=utf-8"),
        "html" | "htm" => Some("text/html; charset=utf-8"),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::delivery::testing::InlineContext;
    use crate::parser::EmptyParser;
    use serde::Deserialize;
    use std::sync::mpsc;

    #[derive(Debug, Deserialize)]
    struct Echo {
        url: String,
    }

    fn mock(root: &Path) -> MockNetwork {
        MockNetwork::new(root).with_delivery(Arc::new(InlineContext))
    }

    #[test]
    fn test_path_is_served_from_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("api")).expect("mkdir");
        std::fs::write(dir.path().join("api/get.json"), br#"{"url":"local"}"#).expect("write");

        let (tx, rx) = mpsc::channel();
        let task = mock(dir.path()).request("https://example.com/api/get.json", move |r: Response<Echo>| {
            tx.send(r).expect("receiver alive");
        });
        assert_eq!(task, None);

        let response = rx.try_recv().expect("delivered");
        assert_eq!(response.value().map(|e| e.url.as_str()), Some("local"));
        assert_eq!(response.status_code(), Some(StatusCode::OK));
        assert_eq!(
            response.response().and_then(|h| h.header("content-type")),
            Some("application/json")
        );
    }

    #[test]
    fn test_file_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("note.txt");
        std::fs::write(&file, b"hello").expect("write");
        let url = url::Url::from_file_path(&file).expect("absolute path");

        let (tx, rx) = mpsc::channel();
        MockNetwork::files_only()
            .with_delivery(Arc::new(InlineContext))
            .request_data(url, move |r| tx.send(r).expect("receiver alive"));

        let response = rx.try_recv().expect("delivered");
        assert_eq!(
            response.value().map(|b| b.as_ref()),
            Some(&b"hello"[..])
        );
    }

    #[test]
    fn test_missing_file_is_a_response_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();
        mock(dir.path()).request_data("https://example.com/nope.json", move |r| {
            tx.send(r).expect("receiver alive");
        });

        let response = rx.try_recv().expect("delivered");
        assert!(matches!(
            response.error(),
            Some(NetworkError::Response(TransportError::Io(_)))
        ));
        assert!(response.response().is_none());
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("empty"), b"").expect("write");

        let (tx, rx) = mpsc::channel();
        mock(dir.path()).request_data("https://example.com/empty", move |r| {
            tx.send(r).expect("receiver alive");
        });
        assert!(matches!(
            rx.try_recv().expect("delivered").error(),
            Some(NetworkError::DataMissing)
        ));

        let (tx, rx) = mpsc::channel();
        mock(dir.path()).request_with("https://example.com/empty", EmptyParser, move |r: Response<()>| {
            tx.send(r).expect("receiver alive");
        });
        assert!(rx.try_recv().expect("delivered").is_success());
    }

    #[test]
    fn test_unresolvable_targets() {
        let (tx, rx) = mpsc::channel();
        MockNetwork::files_only()
            .with_delivery(Arc::new(InlineContext))
            .request_data("https://example.com/a", move |r| tx.send(r).expect("receiver alive"));
        assert!(matches!(
            rx.try_recv().expect("delivered").error(),
            Some(NetworkError::InvalidUrl(_))
        ));

        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();
        mock(dir.path()).request_data("https://example.com/%2E%2E/secret", move |r| {
            tx.send(r).expect("receiver alive");
        });
        assert!(rx.try_recv().expect("delivered").error().is_some());
    }
}
