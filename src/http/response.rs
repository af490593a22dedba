use std::io;

use bytes::BytesMut;

use crate::http::headers::Headers;
use crate::http::writer::WriteError;

/// Numeric HTTP status code.
///
/// Any value can be stored, but only codes with a known reason phrase can be
/// serialized; see [`StatusCode::reason_phrase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const CONTINUE: StatusCode = StatusCode(100);
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const PARTIAL_CONTENT: StatusCode = StatusCode(206);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const SEE_OTHER: StatusCode = StatusCode(303);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(308);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const LENGTH_REQUIRED: StatusCode = StatusCode(411);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const URI_TOO_LONG: StatusCode = StatusCode(414);
    pub const UNSUPPORTED_MEDIA_TYPE: StatusCode = StatusCode(415);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    pub const REQUEST_HEADER_FIELDS_TOO_LARGE: StatusCode = StatusCode(431);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);
    pub const HTTP_VERSION_NOT_SUPPORTED: StatusCode = StatusCode(505);

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use weft::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the standard reason phrase, or `None` for codes this engine
    /// does not know.
    ///
    /// # Example
    ///
    /// ```
    /// # use weft::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), Some("OK"));
    /// assert_eq!(StatusCode(299).reason_phrase(), None);
    /// ```
    pub fn reason_phrase(&self) -> Option<&'static str> {
        let phrase = match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            429 => "Too Many Requests",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => return None,
        };
        Some(phrase)
    }
}

/// Body encoder attached to a response, e.g. a gzip stream.
///
/// The engine only moves bytes through it; the codec itself lives outside
/// this crate.
pub trait Encoder: Send + Sync {
    /// Value for the `Content-Encoding` header.
    fn content_encoding(&self) -> &str;

    /// Encodes `input`, appending whatever output is ready to `out`.
    fn write(&mut self, input: &[u8], out: &mut BytesMut) -> io::Result<()>;

    /// Flushes the remaining encoded bytes into `out`.
    fn finish(&mut self, out: &mut BytesMut) -> io::Result<()>;
}

/// The response half of an exchange.
///
/// Status and headers may change freely until the head has been written to
/// the wire. After that, changing them is a caller bug: the plain accessors
/// panic, the `try_` variants return [`WriteError::HeadersAlreadyWritten`].
pub struct Response {
    status: StatusCode,
    headers: Headers,
    pub(crate) body: BytesMut,
    pub(crate) encoder: Option<Box<dyn Encoder>>,
    pub(crate) header_written: bool,
    pub(crate) buffered: bool,
    pub(crate) streamed: u64,
    connection_close: bool,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("encoder", &self.encoder.as_ref().map(|e| e.content_encoding()))
            .field("header_written", &self.header_written)
            .field("buffered", &self.buffered)
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Headers::new(),
            body: BytesMut::new(),
            encoder: None,
            header_written: false,
            buffered: true,
            streamed: 0,
            connection_close: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    ///
    /// # Panics
    ///
    /// If the head has already been written.
    pub fn set_status(&mut self, status: StatusCode) {
        assert!(
            !self.header_written,
            "response status changed after the head was written"
        );
        self.status = status;
    }

    pub fn try_set_status(&mut self, status: StatusCode) -> Result<(), WriteError> {
        if self.header_written {
            return Err(WriteError::HeadersAlreadyWritten);
        }
        self.status = status;
        Ok(())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the headers.
    ///
    /// # Panics
    ///
    /// If the head has already been written.
    pub fn headers_mut(&mut self) -> &mut Headers {
        assert!(
            !self.header_written,
            "response headers changed after the head was written"
        );
        &mut self.headers
    }

    pub fn try_headers_mut(&mut self) -> Result<&mut Headers, WriteError> {
        if self.header_written {
            return Err(WriteError::HeadersAlreadyWritten);
        }
        Ok(&mut self.headers)
    }

    pub(crate) fn headers_for_framing(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn set_content_type(&mut self, value: &str) {
        self.headers_mut().set("Content-Type", value);
    }

    /// Buffered body bytes, already encoded if an encoder is attached.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Appends to the buffered body through the encoder, if any.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.write(data, &mut self.body),
            None => {
                self.body.extend_from_slice(data);
                Ok(())
            }
        }
    }

    /// Replaces the buffered body.
    pub fn set_body(&mut self, data: impl AsRef<[u8]>) -> io::Result<()> {
        self.body.clear();
        self.write(data.as_ref())
    }

    /// Routes body bytes through `encoder` from now on.
    pub fn set_encoder(&mut self, encoder: Box<dyn Encoder>) {
        self.encoder = Some(encoder);
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn is_header_written(&self) -> bool {
        self.header_written
    }

    /// Buffered responses hold the whole body until the handler returns;
    /// unbuffered ones write the head on the first body write and stream
    /// the rest.
    pub fn set_buffered(&mut self, buffered: bool) {
        assert!(
            !self.header_written,
            "response mode changed after the head was written"
        );
        self.buffered = buffered;
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Asks the driver to close the connection after this response.
    pub fn set_connection_close(&mut self) {
        self.connection_close = true;
    }

    /// `true` if the connection must close after this response, either via
    /// [`set_connection_close`](Self::set_connection_close) or a
    /// `Connection: close` header.
    pub fn connection_close(&self) -> bool {
        self.connection_close || crate::http::request::connection_has(&self.headers, "close")
    }

    /// `true` if the caller declared chunked framing.
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get_ignore_ascii_case("Transfer-Encoding")
            .is_some_and(|v| crate::http::ascii::trim(v).eq_ignore_ascii_case(b"chunked"))
    }

    /// Declared Content-Length, if the caller set one.
    pub fn declared_content_length(&self) -> Option<u64> {
        self.headers
            .get_ignore_ascii_case("Content-Length")
            .and_then(|v| crate::http::ascii::parse_decimal(crate::http::ascii::trim(v)))
    }

    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.reset();
        self.body.clear();
        self.encoder = None;
        self.header_written = false;
        self.buffered = true;
        self.streamed = 0;
        self.connection_close = false;
    }

    pub(crate) fn recycle(&mut self, ceiling: usize) {
        self.reset();
        self.headers.shrink_to_ceiling(ceiling);
        if self.body.capacity() > ceiling {
            self.body = BytesMut::new();
        }
    }
}
