//! Incoming request parsing over the [`httparse`] push parser.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
}

/// A parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body is whatever
/// followed the header terminator in the buffer; the server waits for
/// `Content-Length` bytes before dispatching.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers accepted per request.
    const MAX_HEADERS: usize = 64;

    /// Parses a raw HTTP/1.1 request.
    ///
    /// Returns the request and the byte offset at which the body begins in
    /// `buf` (immediately after the `\r\n\r\n` terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — headers are not fully buffered yet.
    /// - [`RequestError::Parse`] — the bytes are not valid HTTP.
    /// - [`RequestError::MissingField`] — method or path absent.
    /// - [`RequestError::UnknownMethod`] — a method this API does not accept.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut header_buf = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut header_buf);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()?;

        let target = raw
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };

        let mut headers = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                headers.insert(header.name, value);
            }
        }

        // Take at most Content-Length bytes so a pipelined follow-up request
        // never bleeds into this body.
        let available = &buf[body_offset..];
        let declared = headers
            .get("content-length")
            .and_then(|value| value.parse::<usize>().ok());
        let body = match declared {
            Some(len) if available.len() > len => Bytes::copy_from_slice(&available[..len]),
            _ => Bytes::copy_from_slice(available),
        };

        Ok((
            Self {
                method,
                path,
                query,
                headers,
                body,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// `Content-Length` parsed as `usize`, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// Whether the connection should stay open after this exchange.
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is sent.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => true,
        }
    }
}
