//! Structured request descriptions and URL/body encoding
//!
//! [`Endpoint`] describes a call as base URL + path + method + headers +
//! body + query and turns itself into a [`RequestDescriptor`]. Anything
//! implementing [`IntoRequest`] can be handed to
//! [`Network::request`](crate::Network::request).

use reqwest::header::CONTENT_TYPE;
use url::{Url, form_urlencoded};

use crate::descriptor::{HttpMethod, RequestDescriptor};
use crate::error::NetworkError;

/// Header name/value pairs, applied in order
pub type HttpHeaders = Vec<(String, String)>;

/// How the body of an [`Endpoint`] is encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodyType {
    /// Serialize [`Endpoint::body`] as JSON
    Json,
    /// `application/x-www-form-urlencoded` from the given pairs
    FormEncoded(Vec<(String, String)>),
    #[default]
    None,
}

/// Ordered query string parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters(Vec<(String, String)>);

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A call described by its parts rather than a finished URL
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub base_url: String,
    pub path: String,
    pub method: HttpMethod,
    pub body_type: BodyType,
    pub headers: HttpHeaders,
    /// Encoded according to `body_type` when it is [`BodyType::Json`]
    pub body: Option<serde_json::Value>,
    pub query: QueryParameters,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body_type = BodyType::Json;
        self.body = Some(body);
        self
    }

    pub fn form<K, V>(mut self, parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body_type = BodyType::FormEncoded(
            parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn query(mut self, query: QueryParameters) -> Self {
        self.query = query;
        self
    }

    /// Base URL and path joined with exactly one slash between them
    fn joined_url(&self) -> Result<Url, NetworkError> {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        let raw = if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        };

        let mut url =
            Url::parse(&raw).map_err(|e| NetworkError::InvalidUrl(format!("{raw}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(NetworkError::InvalidUrl(format!("{raw}: not a hierarchical URL")));
        }

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// Anything that can be turned into a dispatchable request
pub trait IntoRequest {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError>;
}

impl IntoRequest for RequestDescriptor {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        Ok(self)
    }
}

impl IntoRequest for Result<RequestDescriptor, NetworkError> {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        self
    }
}

impl IntoRequest for Endpoint {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        let url = self.joined_url()?;
        let mut request = RequestDescriptor::new(self.method.to_method(), url);

        for (name, value) in &self.headers {
            request = request.with_header(name, value)?;
        }

        match &self.body_type {
            BodyType::Json => {
                if let Some(body) = &self.body {
                    // serde_json::Value always serializes
                    let encoded = serde_json::to_vec(body).unwrap_or_default();
                    request.headers.insert(
                        CONTENT_TYPE,
                        reqwest::header::HeaderValue::from_static("application/json"),
                    );
                    request = request.with_body(encoded);
                }
            }
            BodyType::FormEncoded(parameters) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(parameters)
                    .finish();
                request.headers.insert(
                    CONTENT_TYPE,
                    reqwest::header::HeaderValue::from_static(
                        "application/x-www-form-urlencoded; charset=utf-8",
                    ),
                );
                request = request.with_body(encoded);
            }
            BodyType::None => {}
        }

        Ok(request)
    }
}

/// A bare URL string is a GET
impl IntoRequest for &str {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        RequestDescriptor::parse(HttpMethod::Get, self)
    }
}

impl IntoRequest for String {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        self.as_str().into_request()
    }
}

impl IntoRequest for Url {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        Ok(RequestDescriptor::get(self))
    }
}

impl IntoRequest for (HttpMethod, &str) {
    fn into_request(self) -> Result<RequestDescriptor, NetworkError> {
        RequestDescriptor::parse(self.0, self.1)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_and_path_are_joined_with_one_slash() {
        for (base, path) in [
            ("https://httpbin.org/", "get"),
            ("https://httpbin.org", "/get"),
            ("https://httpbin.org/", "/get"),
        ] {
            let request = Endpoint::new(base, path).into_request().expect("valid");
            assert_eq!(request.url.as_str(), "https://httpbin.org/get");
        }

        let nested = Endpoint::new("https://api.example.com/v2/", "users/7")
            .into_request()
            .expect("valid");
        assert_eq!(nested.url.as_str(), "https://api.example.com/v2/users/7");
    }

    #[test]
    fn test_query_parameters_are_encoded() {
        let query: QueryParameters = [("test", "Hello world"), ("number", "23")]
            .into_iter()
            .collect();
        let request = Endpoint::new("https://httpbin.org", "get")
            .query(query)
            .into_request()
            .expect("valid");
        assert_eq!(
            request.url.as_str(),
            "https://httpbin.org/get?test=Hello+world&number=23"
        );
    }

    #[test]
    fn test_form_body() {
        let request = Endpoint::new("https://httpbin.org", "post")
            .method(HttpMethod::Post)
            .form([("message", "øåæ"), ("test", "Hello world")])
            .into_request()
            .expect("valid");

        assert_eq!(request.method, reqwest::Method::POST);
        assert_eq!(
            request.header("content-type"),
            Some("application/x-www-form-urlencoded; charset=utf-8")
        );
        let body = request.body.expect("form body");
        assert_eq!(
            std::str::from_utf8(&body).expect("utf8"),
            "message=%C3%B8%C3%A5%C3%A6&test=Hello+world"
        );
    }

    #[test]
    fn test_json_body() {
        let request = Endpoint::new("https://httpbin.org", "post")
            .method(HttpMethod::Post)
            .json(serde_json::json!({"face": "🤓"}))
            .header("Authorization", "Bearer t")
            .into_request()
            .expect("valid");

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("authorization"), Some("Bearer t"));
        let body: serde_json::Value =
            serde_json::from_slice(&request.body.expect("json body")).expect("json");
        assert_eq!(body["face"], "🤓");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(matches!(
            Endpoint::new("not a url", "get").into_request(),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            "mailto:someone@example.com".into_request().map(|_| ()),
            Ok(())
        ));
        assert!(matches!(
            Endpoint::new("mailto:someone@example.com", "x").into_request(),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            "::".into_request(),
            Err(NetworkError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_method_and_url_tuple() {
        let request = (HttpMethod::Delete, "https://x/items/1")
            .into_request()
            .expect("valid");
        assert_eq!(request.method, reqwest::Method::DELETE);
    }
}
