//! Wire-level request and response descriptors

use bytes::Bytes;
use netkit_cache::{CacheKey, ResponseMetadata};
use reqwest::{
    Method, StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::NetworkError;

/// HTTP methods understood by the request builders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
        }
    }

    pub fn to_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
            Self::Patch => Method::PATCH,
            Self::Head => Method::HEAD,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound request: method, URL, headers and an optional body.
///
/// Retained by the request for diagnostics and handed to the transport
/// as-is.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and build a request for it
    pub fn parse(method: HttpMethod, url: &str) -> Result<Self, NetworkError> {
        let url = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::new(method.to_method(), url))
    }

    /// Add a header. Names and values that are not valid HTTP make the
    /// request unconstructible.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, NetworkError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NetworkError::InvalidUrl(format!("invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| NetworkError::InvalidUrl(format!("invalid value for header {name}: {e}")))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Canonical cache identity: method, URL and the given vary headers
    pub fn cache_key(&self, vary_headers: &[String]) -> CacheKey {
        let vary = vary_headers
            .iter()
            .filter_map(|name| self.header(name).map(|value| (name.as_str(), value)));
        CacheKey::new(self.method.as_str(), self.url.as_str(), vary)
    }

    pub(crate) fn to_reqwest(
        &self,
        client: &reqwest::Client,
    ) -> Result<reqwest::Request, reqwest::Error> {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        builder.build()
    }
}

/// Status line and headers of a response, recorded when they arrive
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: Url,
}

impl ResponseHead {
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url,
        }
    }

    pub(crate) fn from_reqwest(response: &reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url: response.url().clone(),
        }
    }

    /// Rebuild a head from cached metadata. Unknown statuses fall back to
    /// 200 and headers that are no longer valid are skipped.
    pub fn from_metadata(metadata: &ResponseMetadata, url: Url) -> Self {
        let status = StatusCode::from_u16(metadata.status).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::new();
        for (name, value) in &metadata.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        Self {
            status,
            headers,
            url,
        }
    }

    /// Metadata to store next to a cached body
    pub fn to_metadata(&self) -> ResponseMetadata {
        self.headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .fold(ResponseMetadata::new(self.status.as_u16()), |meta, (name, value)| {
                meta.with_header(name, value)
            })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
