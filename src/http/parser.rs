//! Incremental HTTP/1.x message parser.
//!
//! [`Parser::feed`] consumes whatever bytes a socket read produced and
//! records all progress in the message's [`Cursor`], so a request may arrive
//! one byte at a time or together with the next pipelined request.

use bytes::BytesMut;

use crate::config::Limits;
use crate::http::ascii::{
    HEX_VALUE, NOT_HEX, TO_UPPER, canonical_header_byte, parse_decimal, percent_decode, trim,
};
use crate::http::headers::Headers;
use crate::http::request::Request;
use crate::http::response::StatusCode;

/// Stage of the parser state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    FirstLine,
    Headers,
    Body,
    Done,
}

/// Parse failures. All of them are fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The first line grew past the configured limit.
    #[error("request line too long")]
    RequestLineTooLong,

    /// Bad bytes in the first line, or a path/version that does not parse.
    #[error("malformed request line")]
    MalformedRequest,

    /// The status line of a response could not be parsed.
    #[error("malformed status line")]
    MalformedStatusLine,

    /// A header line without a colon, an empty or invalid name, or control
    /// bytes in a value.
    #[error("malformed header line")]
    MalformedHeader,

    /// The header block grew past the configured limit.
    #[error("request headers too large")]
    HeadersTooLarge,

    /// Content-Length is not a decimal number, or repeated with different
    /// values.
    #[error("invalid Content-Length header value")]
    InvalidContentLength,

    /// The declared body is larger than the configured limit.
    #[error("entity of {length} bytes exceeds limit of {limit}")]
    EntityTooLarge { length: u64, limit: usize },

    /// Transfer-Encoding bodies are not handled by this engine.
    #[error("unsupported transfer-encoding")]
    UnsupportedTransferEncoding,

    /// Bytes were fed to a message that was already complete.
    #[error("data received past the end of the message")]
    BodyOverrun,

    /// A chunk size line or chunk terminator of a chunked body is invalid.
    #[error("malformed chunked body")]
    InvalidChunk,

    /// The stream ended before the message was complete.
    #[error("stream ended before the message was complete")]
    IncompleteMessage,
}

impl ParseError {
    /// Status to answer with before closing the connection.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::RequestLineTooLong => StatusCode::URI_TOO_LONG,
            ParseError::HeadersTooLarge => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ParseError::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::UnsupportedTransferEncoding => StatusCode::NOT_IMPLEMENTED,
            ParseError::MalformedRequest
            | ParseError::MalformedStatusLine
            | ParseError::MalformedHeader
            | ParseError::InvalidContentLength
            | ParseError::BodyOverrun
            | ParseError::InvalidChunk
            | ParseError::IncompleteMessage => StatusCode::BAD_REQUEST,
        }
    }

    /// `true` for size-limit violations, `false` for protocol violations.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            ParseError::RequestLineTooLong
                | ParseError::HeadersTooLarge
                | ParseError::EntityTooLarge { .. }
        )
    }
}

/// How the end of the body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Framing {
    #[default]
    Length,
    Chunked,
    /// Everything up to the end of the stream, responses only
    UntilClose,
}

/// Position inside a chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Chunk {
    #[default]
    Size,
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    Trailer,
    TrailerLf,
}

/// Resumable parser position, owned by the message being parsed.
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    pub(crate) phase: Phase,
    first_line_bytes: usize,
    /// Bytes of empty lines skipped ahead of the first line
    skipped: usize,
    field: u8,
    header_bytes: usize,
    key: Vec<u8>,
    value: Vec<u8>,
    in_value: bool,
    /// A CR was read and the next byte must be LF
    saw_cr: bool,
    pub(crate) content_length: usize,
    pub(crate) body_remaining: usize,
    framing: Framing,
    chunk: Chunk,
    chunk_size: u64,
    chunk_digits: bool,
    trailer_line: usize,
    scratch: Vec<u8>,
}

impl Cursor {
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::FirstLine;
        self.first_line_bytes = 0;
        self.skipped = 0;
        self.field = 0;
        self.header_bytes = 0;
        self.key.clear();
        self.value.clear();
        self.in_value = false;
        self.saw_cr = false;
        self.content_length = 0;
        self.body_remaining = 0;
        self.framing = Framing::Length;
        self.chunk = Chunk::Size;
        self.chunk_size = 0;
        self.chunk_digits = false;
        self.trailer_line = 0;
        self.scratch.clear();
    }

    pub(crate) fn shrink_to_ceiling(&mut self, ceiling: usize) {
        for buf in [&mut self.key, &mut self.value, &mut self.scratch] {
            if buf.capacity() > ceiling {
                *buf = Vec::new();
            }
        }
    }
}

/// Shared first-line + headers + body shape of requests and responses.
pub(crate) trait Message {
    fn cursor(&mut self) -> &mut Cursor;
    fn parts(&mut self) -> (&mut Cursor, &mut Headers, &mut BytesMut);
    /// Stores one byte of first-line field `field` (0, 1 or 2).
    fn push_first_line(&mut self, field: u8, b: u8);
    /// Validates the completed first line.
    fn finish_first_line(&mut self) -> Result<(), ParseError>;
    /// Requests may not use Transfer-Encoding; responses may.
    fn rejects_transfer_encoding(&self) -> bool;
}

/// Size limits applied while parsing.
#[derive(Debug, Clone)]
pub struct Parser {
    max_first_line_size: usize,
    max_header_size: usize,
    max_body_size: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(&Limits::default())
    }
}

impl Parser {
    pub fn new(limits: &Limits) -> Self {
        Self {
            max_first_line_size: limits.max_first_line_size,
            max_header_size: limits.max_header_size,
            max_body_size: limits.max_body_size,
        }
    }

    /// Feeds a chunk of request bytes.
    ///
    /// Returns how many bytes of `buf` were consumed. This is less than
    /// `buf.len()` only when the request completed and the rest of `buf`
    /// belongs to the next request.
    pub fn feed(&self, req: &mut Request, buf: &[u8]) -> Result<usize, ParseError> {
        self.feed_message(req, buf)
    }

    /// Feeds a chunk of response bytes, see [`feed`](Self::feed).
    pub fn feed_response(
        &self,
        resp: &mut IncomingResponse,
        buf: &[u8],
    ) -> Result<usize, ParseError> {
        self.feed_message(resp, buf)
    }

    /// Tells the parser the peer closed the stream.
    ///
    /// Completes a response whose body runs until the connection closes.
    /// Any other unfinished response is an [`ParseError::IncompleteMessage`].
    pub fn end_of_stream(&self, resp: &mut IncomingResponse) -> Result<(), ParseError> {
        let cursor = &mut resp.cursor;
        match cursor.phase {
            Phase::Done => Ok(()),
            Phase::Body if cursor.framing == Framing::UntilClose => {
                cursor.phase = Phase::Done;
                Ok(())
            }
            _ => Err(ParseError::IncompleteMessage),
        }
    }

    fn feed_message<M: Message>(&self, msg: &mut M, buf: &[u8]) -> Result<usize, ParseError> {
        if msg.cursor().phase == Phase::Done && !buf.is_empty() {
            return Err(ParseError::BodyOverrun);
        }

        let mut pos = 0;
        while pos < buf.len() {
            let rest = &buf[pos..];
            let phase = msg.cursor().phase;
            pos += match phase {
                Phase::FirstLine => self.first_line(msg, rest)?,
                Phase::Headers => self.headers(msg, rest)?,
                Phase::Body => self.body(msg, rest)?,
                Phase::Done => break,
            };
        }
        Ok(pos)
    }

    fn first_line<M: Message>(&self, msg: &mut M, buf: &[u8]) -> Result<usize, ParseError> {
        for (i, &b) in buf.iter().enumerate() {
            match b {
                b'\n' => {
                    let cursor = msg.cursor();
                    cursor.saw_cr = false;
                    if cursor.first_line_bytes == 0 {
                        // empty line ahead of a message
                        self.skip_leading(cursor)?;
                        continue;
                    }
                    msg.finish_first_line()?;
                    msg.cursor().phase = Phase::Headers;
                    return Ok(i + 1);
                }
                _ if msg.cursor().saw_cr => return Err(ParseError::MalformedRequest),
                b'\r' => {
                    let cursor = msg.cursor();
                    cursor.saw_cr = true;
                    if cursor.first_line_bytes == 0 {
                        self.skip_leading(cursor)?;
                    }
                }
                b' '..=b'~' => {
                    let cursor = msg.cursor();
                    cursor.first_line_bytes += 1;
                    if cursor.first_line_bytes + cursor.skipped > self.max_first_line_size {
                        return Err(ParseError::RequestLineTooLong);
                    }
                    if b == b' ' && cursor.field < 2 {
                        cursor.field += 1;
                        continue;
                    }
                    let field = cursor.field;
                    msg.push_first_line(field, b);
                }
                _ => return Err(ParseError::MalformedRequest),
            }
        }
        Ok(buf.len())
    }

    /// Skipped empty lines share the first-line budget.
    fn skip_leading(&self, cursor: &mut Cursor) -> Result<(), ParseError> {
        cursor.skipped += 1;
        if cursor.skipped > self.max_first_line_size {
            return Err(ParseError::RequestLineTooLong);
        }
        Ok(())
    }

    fn headers<M: Message>(&self, msg: &mut M, buf: &[u8]) -> Result<usize, ParseError> {
        let (cursor, headers, _) = msg.parts();
        for (i, &b) in buf.iter().enumerate() {
            cursor.header_bytes += 1;
            if cursor.header_bytes > self.max_header_size {
                return Err(ParseError::HeadersTooLarge);
            }

            match b {
                b'\n' if !cursor.in_value => {
                    if !cursor.key.is_empty() {
                        return Err(ParseError::MalformedHeader);
                    }
                    cursor.saw_cr = false;
                    self.end_of_headers(msg)?;
                    return Ok(i + 1);
                }
                b'\n' => {
                    cursor.saw_cr = false;
                    headers.append_raw(&cursor.key, trim(&cursor.value));
                    cursor.key.clear();
                    cursor.value.clear();
                    cursor.in_value = false;
                }
                _ if cursor.saw_cr => return Err(ParseError::MalformedHeader),
                b'\r' => cursor.saw_cr = true,
                b':' if !cursor.in_value => {
                    if cursor.key.is_empty() {
                        return Err(ParseError::MalformedHeader);
                    }
                    cursor.in_value = true;
                }
                _ if !cursor.in_value => {
                    if b <= b' ' || b >= 127 {
                        return Err(ParseError::MalformedHeader);
                    }
                    let c = canonical_header_byte(cursor.key.last().copied(), b);
                    cursor.key.push(c);
                }
                _ => {
                    if (b < b' ' && b != b'\t') || b == 127 {
                        return Err(ParseError::MalformedHeader);
                    }
                    if cursor.value.is_empty() && (b == b' ' || b == b'\t') {
                        continue;
                    }
                    cursor.value.push(b);
                }
            }
        }
        Ok(buf.len())
    }

    fn end_of_headers<M: Message>(&self, msg: &mut M) -> Result<(), ParseError> {
        let rejects_transfer_encoding = msg.rejects_transfer_encoding();
        let (cursor, headers, body) = msg.parts();

        if let Some(&codings) = headers.get_all("Transfer-Encoding").last() {
            if rejects_transfer_encoding {
                return Err(ParseError::UnsupportedTransferEncoding);
            }
            // chunked must be the final coding, anything else runs to close
            let chunked = codings
                .rsplit(|&b| b == b',')
                .next()
                .is_some_and(|c| trim(c).eq_ignore_ascii_case(b"chunked"));
            cursor.framing = if chunked {
                Framing::Chunked
            } else {
                Framing::UntilClose
            };
            cursor.chunk = Chunk::Size;
            cursor.phase = Phase::Body;
            return Ok(());
        }

        let mut declared: Option<u64> = None;
        for value in headers.get_all("Content-Length") {
            let n = parse_decimal(trim(value)).ok_or(ParseError::InvalidContentLength)?;
            match declared {
                Some(prev) if prev != n => return Err(ParseError::InvalidContentLength),
                _ => declared = Some(n),
            }
        }

        let length = declared.unwrap_or(0);
        if length > self.max_body_size as u64 {
            return Err(ParseError::EntityTooLarge {
                length,
                limit: self.max_body_size,
            });
        }

        let length = length as usize;
        cursor.content_length = length;
        cursor.body_remaining = length;
        if length == 0 {
            cursor.phase = Phase::Done;
        } else {
            body.reserve(length);
            cursor.phase = Phase::Body;
        }
        Ok(())
    }

    fn body<M: Message>(&self, msg: &mut M, buf: &[u8]) -> Result<usize, ParseError> {
        let (cursor, _, body) = msg.parts();
        match cursor.framing {
            Framing::Length => {
                let n = buf.len().min(cursor.body_remaining);
                body.extend_from_slice(&buf[..n]);
                cursor.body_remaining -= n;
                if cursor.body_remaining == 0 {
                    cursor.phase = Phase::Done;
                }
                Ok(n)
            }
            Framing::UntilClose => {
                let length = (body.len() + buf.len()) as u64;
                if length > self.max_body_size as u64 {
                    return Err(ParseError::EntityTooLarge {
                        length,
                        limit: self.max_body_size,
                    });
                }
                body.extend_from_slice(buf);
                Ok(buf.len())
            }
            Framing::Chunked => self.chunked(cursor, body, buf),
        }
    }

    /// Decodes chunked framing into `body`. Trailer fields are counted
    /// against the header limit and discarded.
    fn chunked(
        &self,
        cursor: &mut Cursor,
        body: &mut BytesMut,
        buf: &[u8],
    ) -> Result<usize, ParseError> {
        let mut i = 0;
        while i < buf.len() {
            if cursor.chunk == Chunk::Data {
                let n = (buf.len() - i).min(cursor.body_remaining);
                body.extend_from_slice(&buf[i..i + n]);
                cursor.body_remaining -= n;
                i += n;
                if cursor.body_remaining == 0 {
                    cursor.chunk = Chunk::DataCr;
                }
                continue;
            }

            let b = buf[i];
            i += 1;
            match (cursor.chunk, b) {
                (Chunk::Size, b'\r') if cursor.chunk_digits => cursor.chunk = Chunk::SizeLf,
                (Chunk::Size, b'\n') if cursor.chunk_digits => {
                    self.end_of_chunk_size(cursor, body)?
                }
                (Chunk::Size, b';') if cursor.chunk_digits => cursor.chunk = Chunk::Extension,
                (Chunk::Size, _) => {
                    let digit = HEX_VALUE[b as usize];
                    if digit == NOT_HEX {
                        return Err(ParseError::InvalidChunk);
                    }
                    cursor.chunk_size = cursor
                        .chunk_size
                        .checked_mul(16)
                        .and_then(|n| n.checked_add(digit as u64))
                        .ok_or(ParseError::InvalidChunk)?;
                    cursor.chunk_digits = true;
                }
                (Chunk::Extension, b'\r') => cursor.chunk = Chunk::SizeLf,
                (Chunk::Extension, b'\n') | (Chunk::SizeLf, b'\n') => {
                    self.end_of_chunk_size(cursor, body)?
                }
                (Chunk::Extension, _) if b >= b' ' || b == b'\t' => {}
                (Chunk::DataCr, b'\r') => cursor.chunk = Chunk::DataLf,
                (Chunk::DataCr, b'\n') | (Chunk::DataLf, b'\n') => cursor.chunk = Chunk::Size,
                (Chunk::Trailer, b'\r') => cursor.chunk = Chunk::TrailerLf,
                (Chunk::Trailer, b'\n') | (Chunk::TrailerLf, b'\n') => {
                    if cursor.trailer_line == 0 {
                        cursor.phase = Phase::Done;
                        return Ok(i);
                    }
                    cursor.trailer_line = 0;
                    cursor.chunk = Chunk::Trailer;
                }
                (Chunk::Trailer, _) => {
                    cursor.trailer_line += 1;
                    cursor.header_bytes += 1;
                    if cursor.header_bytes > self.max_header_size {
                        return Err(ParseError::HeadersTooLarge);
                    }
                }
                _ => return Err(ParseError::InvalidChunk),
            }
        }
        Ok(buf.len())
    }

    fn end_of_chunk_size(&self, cursor: &mut Cursor, body: &BytesMut) -> Result<(), ParseError> {
        let size = cursor.chunk_size;
        cursor.chunk_size = 0;
        cursor.chunk_digits = false;

        if size == 0 {
            cursor.trailer_line = 0;
            cursor.chunk = Chunk::Trailer;
            return Ok(());
        }

        let length = (body.len() as u64).saturating_add(size);
        if length > self.max_body_size as u64 {
            return Err(ParseError::EntityTooLarge {
                length,
                limit: self.max_body_size,
            });
        }
        cursor.body_remaining = size as usize;
        cursor.chunk = Chunk::Data;
        Ok(())
    }
}

/// Checks `HTTP/<digit>.<digit>` and upper-cases the prefix in place.
fn normalize_version(version: &mut String) -> bool {
    let bytes = version.as_bytes();
    let valid = bytes.len() == 8
        && bytes[..5].eq_ignore_ascii_case(b"HTTP/")
        && bytes[5].is_ascii_digit()
        && bytes[6] == b'.'
        && bytes[7].is_ascii_digit();
    if valid {
        version.make_ascii_uppercase();
    }
    valid
}

impl Message for Request {
    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn parts(&mut self) -> (&mut Cursor, &mut Headers, &mut BytesMut) {
        (&mut self.cursor, &mut self.headers, &mut self.body)
    }

    fn push_first_line(&mut self, field: u8, b: u8) {
        match field {
            0 => self.method.push(TO_UPPER[b as usize] as char),
            1 => self.raw_path.push(b as char),
            _ => self.version.push(b as char),
        }
    }

    fn finish_first_line(&mut self) -> Result<(), ParseError> {
        if self.cursor.field < 2 || self.method.is_empty() || !self.raw_path.starts_with('/') {
            return Err(ParseError::MalformedRequest);
        }
        if !normalize_version(&mut self.version) {
            return Err(ParseError::MalformedRequest);
        }

        let (path, query) = match self.raw_path.split_once('?') {
            Some((path, query)) => (path, query),
            None => (self.raw_path.as_str(), ""),
        };
        self.query.push_str(query);

        let scratch = &mut self.cursor.scratch;
        scratch.clear();
        percent_decode(path.as_bytes(), scratch).ok_or(ParseError::MalformedRequest)?;
        let decoded = std::str::from_utf8(scratch).map_err(|_| ParseError::MalformedRequest)?;
        self.path.push_str(decoded);
        Ok(())
    }

    fn rejects_transfer_encoding(&self) -> bool {
        true
    }
}

/// A response read off the wire, the client-side mirror of [`Request`].
#[derive(Debug)]
pub struct IncomingResponse {
    /// Protocol version, upper-cased
    pub version: String,
    /// Numeric status code
    pub status: u16,
    /// Reason phrase as sent
    pub reason: String,
    /// Response headers, looked up case-insensitively
    pub headers: Headers,
    /// Response body
    pub body: BytesMut,
    status_text: String,
    cursor: Cursor,
}

impl Default for IncomingResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl IncomingResponse {
    pub fn new() -> Self {
        Self {
            version: String::new(),
            status: 0,
            reason: String::new(),
            headers: Headers::normalized(),
            body: BytesMut::new(),
            status_text: String::new(),
            cursor: Cursor::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.cursor.phase
    }

    pub fn is_complete(&self) -> bool {
        self.cursor.phase == Phase::Done
    }

    pub fn reset(&mut self) {
        self.version.clear();
        self.status = 0;
        self.reason.clear();
        self.headers.reset();
        self.body.clear();
        self.status_text.clear();
        self.cursor.reset();
    }
}

impl Message for IncomingResponse {
    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn parts(&mut self) -> (&mut Cursor, &mut Headers, &mut BytesMut) {
        (&mut self.cursor, &mut self.headers, &mut self.body)
    }

    fn push_first_line(&mut self, field: u8, b: u8) {
        match field {
            0 => self.version.push(b as char),
            1 => self.status_text.push(b as char),
            _ => self.reason.push(b as char),
        }
    }

    fn finish_first_line(&mut self) -> Result<(), ParseError> {
        if self.cursor.field < 1 || !normalize_version(&mut self.version) {
            return Err(ParseError::MalformedStatusLine);
        }
        let text = self.status_text.as_bytes();
        if text.len() != 3 {
            return Err(ParseError::MalformedStatusLine);
        }
        let code = parse_decimal(text).ok_or(ParseError::MalformedStatusLine)?;
        self.status = code as u16;
        Ok(())
    }

    fn rejects_transfer_encoding(&self) -> bool {
        false
    }
}
