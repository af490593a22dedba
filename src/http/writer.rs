//! Response serialization.
//!
//! Buffered responses are turned into one contiguous byte run by
//! [`serialize`]. Unbuffered responses go through [`stream_body`] and
//! [`finish_stream`], which emit the head on the first body write and frame
//! every later write with Content-Length accounting or chunked encoding.

use std::fmt::Write as _;
use std::io;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

pub const HTTP_VERSION: &str = "HTTP/1.1";

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The status code has no reason phrase mapping.
    #[error("status code {0} has no reason phrase")]
    UnknownStatus(u16),

    /// An unbuffered response declared neither Content-Length nor chunked
    /// transfer encoding.
    #[error("unbuffered response without Content-Length")]
    NilContentLength,

    /// Status or headers were changed after the head went out.
    #[error("response head already written")]
    HeadersAlreadyWritten,

    /// More body bytes were streamed than Content-Length declared.
    #[error("body exceeds declared Content-Length of {declared}")]
    BodyExceedsContentLength { declared: u64 },

    /// The stream ended before Content-Length bytes were written.
    #[error("body ended after {written} of {declared} declared bytes")]
    IncompleteBody { written: u64, declared: u64 },

    /// The write deadline expired.
    #[error("write deadline exceeded")]
    Timeout,

    /// The peer stopped accepting bytes.
    #[error("connection closed while writing")]
    Closed,

    /// An error occurred during string formatting.
    #[error("error during string format")]
    Format,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<std::fmt::Error> for WriteError {
    fn from(_: std::fmt::Error) -> Self {
        WriteError::Format
    }
}

/// Appends the status line and header block of `resp` to `out`.
pub fn write_head(resp: &Response, out: &mut BytesMut) -> Result<(), WriteError> {
    let status = resp.status();
    let reason = status
        .reason_phrase()
        .ok_or(WriteError::UnknownStatus(status.as_u16()))?;

    write!(out, "{} {} {}\r\n", HTTP_VERSION, status.as_u16(), reason)?;

    for (key, value) in resp.headers().iter() {
        out.extend_from_slice(key);
        out.extend_from_slice(b": ");
        push_escaped(value, out);
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"\r\n");
    Ok(())
}

/// Control bytes other than HTAB would end the header line early, so they
/// go out as spaces.
fn push_escaped(value: &[u8], out: &mut BytesMut) {
    if value.iter().all(|&b| !is_header_ctl(b)) {
        out.extend_from_slice(value);
        return;
    }
    out.reserve(value.len());
    for &b in value {
        out.put_u8(if is_header_ctl(b) { b' ' } else { b });
    }
}

fn is_header_ctl(b: u8) -> bool {
    (b < b' ' && b != b'\t') || b == 127
}

/// Serializes a buffered response into `out`.
///
/// Finishes the encoder, replaces any Content-Length with the real body
/// length and marks the head as written. `head_only` leaves the body bytes
/// out, for answers to HEAD requests.
pub fn serialize(resp: &mut Response, head_only: bool, out: &mut BytesMut) -> Result<(), WriteError> {
    let status = resp.status();
    if status.reason_phrase().is_none() {
        return Err(WriteError::UnknownStatus(status.as_u16()));
    }
    if resp.header_written {
        return Err(WriteError::HeadersAlreadyWritten);
    }

    if let Some(mut encoder) = resp.encoder.take() {
        encoder.finish(&mut resp.body)?;
        let headers = resp.headers_for_framing();
        if headers.get_ignore_ascii_case("Content-Encoding").is_none() {
            headers.append("Content-Encoding", encoder.content_encoding());
        }
    }

    let len = resp.body.len();
    let headers = resp.headers_for_framing();
    headers.delete_ignore_ascii_case("Transfer-Encoding");
    headers.delete_ignore_ascii_case("Content-Length");
    headers.append("Content-Length", len.to_string());

    write_head(resp, out)?;
    resp.header_written = true;

    if !head_only {
        out.extend_from_slice(&resp.body);
    }
    Ok(())
}

fn begin_stream(resp: &mut Response, out: &mut BytesMut) -> Result<(), WriteError> {
    if !resp.is_chunked() && resp.declared_content_length().is_none() {
        return Err(WriteError::NilContentLength);
    }
    if let Some(encoding) = resp.encoder.as_ref().map(|e| e.content_encoding().to_owned()) {
        let headers = resp.headers_for_framing();
        if headers.get_ignore_ascii_case("Content-Encoding").is_none() {
            headers.append("Content-Encoding", encoding);
        }
    }
    write_head(resp, out)?;
    resp.header_written = true;
    Ok(())
}

/// Appends the wire bytes for one unbuffered body write to `out`, writing
/// the head first if it has not gone out yet.
///
/// `scratch` receives encoder output before framing.
pub fn stream_body(
    resp: &mut Response,
    data: &[u8],
    head_only: bool,
    scratch: &mut BytesMut,
    out: &mut BytesMut,
) -> Result<(), WriteError> {
    if !resp.header_written {
        begin_stream(resp, out)?;
    }
    if head_only {
        return Ok(());
    }

    let payload: &[u8] = match resp.encoder.as_mut() {
        Some(encoder) => {
            scratch.clear();
            encoder.write(data, scratch)?;
            &scratch[..]
        }
        None => data,
    };
    push_payload(resp, payload, out)
}

/// Completes an unbuffered response: flushes the encoder, writes the last
/// chunk or checks that Content-Length was honoured.
pub fn finish_stream(
    resp: &mut Response,
    head_only: bool,
    scratch: &mut BytesMut,
    out: &mut BytesMut,
) -> Result<(), WriteError> {
    if head_only {
        return Ok(());
    }

    if let Some(mut encoder) = resp.encoder.take() {
        scratch.clear();
        encoder.finish(scratch)?;
        push_payload(resp, &scratch[..], out)?;
    }

    if resp.is_chunked() {
        out.extend_from_slice(b"0\r\n\r\n");
        return Ok(());
    }

    let declared = resp.declared_content_length().unwrap_or(0);
    if resp.streamed != declared {
        return Err(WriteError::IncompleteBody {
            written: resp.streamed,
            declared,
        });
    }
    Ok(())
}

fn push_payload(resp: &mut Response, payload: &[u8], out: &mut BytesMut) -> Result<(), WriteError> {
    if payload.is_empty() {
        return Ok(());
    }

    if resp.is_chunked() {
        write!(out, "{:x}\r\n", payload.len())?;
        out.extend_from_slice(payload);
        out.extend_from_slice(b"\r\n");
    } else {
        let declared = resp.declared_content_length().unwrap_or(0);
        if resp.streamed + payload.len() as u64 > declared {
            return Err(WriteError::BodyExceedsContentLength { declared });
        }
        out.extend_from_slice(payload);
    }
    resp.streamed += payload.len() as u64;
    Ok(())
}

/// Writes `buf` completely, bounded by `deadline` when one is given.
pub async fn write_all<W>(
    stream: &mut W,
    buf: &[u8],
    deadline: Option<Duration>,
) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        let mut written = 0;
        while written < buf.len() {
            let n = stream.write(&buf[written..]).await?;

            if n == 0 {
                return Err(WriteError::Closed);
            }

            written += n;
        }
        stream.flush().await?;
        Ok::<(), WriteError>(())
    };

    match deadline {
        Some(limit) => tokio::time::timeout(limit, write)
            .await
            .map_err(|_| WriteError::Timeout)?,
        None => write.await,
    }
}
