use bytes::BytesMut;

use crate::http::ascii::trim;
use crate::http::headers::Headers;
use crate::http::parser::{Cursor, Phase};

/// HTTP request methods.
///
/// The parser accepts any upper-cased token as a method; this enum only names
/// the ones application code usually matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
    CONNECT,
    TRACE,
}

impl Method {
    /// Maps an upper-case method token to a variant.
    ///
    /// # Example
    ///
    /// ```
    /// # use weft::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "CONNECT" => Some(Method::CONNECT),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
        }
    }
}

/// A request being read off the wire.
///
/// Every buffer here is reused across exchanges: [`Request::reset`] empties
/// them without giving their capacity back. Views returned by accessors are
/// valid until the next reset.
#[derive(Debug)]
pub struct Request {
    /// Upper-cased method token (e.g. "GET")
    pub method: String,
    /// Request target as sent, query string included
    pub raw_path: String,
    /// Percent-decoded path without the query string
    pub path: String,
    /// Everything after the first `?`, not decoded
    pub query: String,
    /// Protocol version, upper-cased (e.g. "HTTP/1.1")
    pub version: String,
    /// Request headers, looked up case-insensitively
    pub headers: Headers,
    /// Request body
    pub body: BytesMut,
    pub(crate) cursor: Cursor,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            method: String::new(),
            raw_path: String::new(),
            path: String::new(),
            query: String::new(),
            version: String::new(),
            headers: Headers::normalized(),
            body: BytesMut::new(),
            cursor: Cursor::default(),
        }
    }

    /// Current parser phase.
    pub fn phase(&self) -> Phase {
        self.cursor.phase
    }

    /// `true` once the parser consumed the whole request.
    pub fn is_complete(&self) -> bool {
        self.cursor.phase == Phase::Done
    }

    /// The method, if it is one of the well-known ones.
    pub fn known_method(&self) -> Option<Method> {
        Method::from_str(&self.method)
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// Retrieves a header value by name (case-insensitive).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get_str(key)
    }

    /// Value of the Content-Length header once headers are parsed.
    pub fn content_length(&self) -> usize {
        self.cursor.content_length
    }

    pub fn is_http11(&self) -> bool {
        self.version == "HTTP/1.1"
    }

    /// `true` if a `Connection` header lists `token`.
    pub fn connection_has(&self, token: &str) -> bool {
        connection_has(&self.headers, token)
    }

    /// Determines whether the client wants the connection kept open.
    ///
    /// `Connection: close` wins, `Connection: keep-alive` comes next, and
    /// otherwise HTTP/1.1 defaults to keep-alive while HTTP/1.0 does not.
    pub fn keep_alive(&self) -> bool {
        if self.connection_has("close") {
            return false;
        }
        if self.connection_has("keep-alive") {
            return true;
        }
        self.is_http11()
    }

    /// Empties the request for reuse, keeping buffer capacity.
    pub fn reset(&mut self) {
        self.method.clear();
        self.raw_path.clear();
        self.path.clear();
        self.query.clear();
        self.version.clear();
        self.headers.reset();
        self.body.clear();
        self.cursor.reset();
    }

    /// Resets and replaces buffers that grew past `ceiling` bytes.
    pub(crate) fn recycle(&mut self, ceiling: usize) {
        self.reset();
        self.headers.shrink_to_ceiling(ceiling);
        if self.body.capacity() > ceiling {
            self.body = BytesMut::new();
        }
        for s in [&mut self.raw_path, &mut self.path, &mut self.query] {
            if s.capacity() > ceiling {
                *s = String::new();
            }
        }
        self.cursor.shrink_to_ceiling(ceiling);
    }
}

/// Checks a comma separated `Connection` header for `token`.
pub(crate) fn connection_has(headers: &Headers, token: &str) -> bool {
    headers
        .iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(b"Connection"))
        .any(|(_, value)| {
            value
                .split(|&b| b == b',')
                .any(|t| trim(t).eq_ignore_ascii_case(token.as_bytes()))
        })
}
