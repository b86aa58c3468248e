//! Response body parsers
//!
//! A [`ResponseParser`] turns the accumulated body of a successful response
//! into the caller's payload type. Parsers run on a transport worker, never
//! on the delivery context.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::error::ParseError;

/// Converts response bytes into a typed payload
pub trait ResponseParser<T>: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<T, ParseError>;

    /// Whether an empty body on an acceptable status is an error.
    ///
    /// When true the request fails with `DataMissing` instead of calling
    /// [`parse`](Self::parse) with an empty slice.
    fn requires_data(&self) -> bool {
        true
    }
}

/// Decodes the body as JSON into `T`
pub struct JsonParser<T>(PhantomData<fn() -> T>);

impl<T> JsonParser<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResponseParser<T> for JsonParser<T> {
    fn parse(&self, data: &[u8]) -> Result<T, ParseError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Hands back the raw body
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesParser;

impl ResponseParser<Bytes> for BytesParser {
    fn parse(&self, data: &[u8]) -> Result<Bytes, ParseError> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Body as UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

impl ResponseParser<String> for TextParser {
    fn parse(&self, data: &[u8]) -> Result<String, ParseError> {
        Ok(std::str::from_utf8(data)?.to_owned())
    }
}

/// Ignores the body entirely. Useful for `DELETE` and `204 No Content`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyParser;

impl ResponseParser<()> for EmptyParser {
    fn parse(&self, _data: &[u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn requires_data(&self) -> bool {
        false
    }
}

/// Adapts a closure into a parser
pub struct FnParser<F>(pub F);

impl<T, F> ResponseParser<T> for FnParser<F>
where
    F: Fn(&[u8]) -> Result<T, ParseError> + Send + Sync,
{
    fn parse(&self, data: &[u8]) -> Result<T, ParseError> {
        (self.0)(data)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echo {
        url: String,
    }

    #[test]
    fn test_json_parser() {
        let parser = JsonParser::<Echo>::new();
        let echo = parser
            .parse(br#"{"url":"https://httpbin.org/get","args":{}}"#)
            .expect("valid json");
        assert_eq!(echo.url, "https://httpbin.org/get");

        assert!(matches!(parser.parse(b"<html>"), Err(ParseError::Json(_))));
        assert!(parser.requires_data());
    }

    #[test]
    fn test_text_parser_rejects_invalid_utf8() {
        assert_eq!(TextParser.parse(b"hi").expect("utf8"), "hi");
        assert!(matches!(
            TextParser.parse(&[0xff, 0xfe]),
            Err(ParseError::Utf8(_))
        ));
    }

    #[test]
    fn test_empty_parser_accepts_no_data() {
        assert!(!EmptyParser.requires_data());
        EmptyParser.parse(b"").expect("always succeeds");
    }

    #[test]
    fn test_fn_parser() {
        let parser = FnParser(|data: &[u8]| {
            data.first()
                .copied()
                .ok_or_else(|| ParseError::Custom("empty".to_string()))
        });
        assert_eq!(parser.parse(b"A").expect("first byte"), b'A');
        assert!(parser.parse(b"").is_err());
    }
}
