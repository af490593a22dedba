//! Handler-facing view of one request/response cycle.

use std::time::Duration;

use tokio::io::AsyncWrite;

use crate::http::connection::announce_connection;
use crate::http::context::Context;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::{self, WriteError};

/// Writable half of the connection as seen by a handler.
pub type Sink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// What a [`Handler`](crate::http::connection::Handler) gets to work with:
/// the pooled [`Context`] and, for unbuffered responses, the socket.
pub struct Exchange<'a> {
    ctx: &'a mut Context,
    io: &'a mut Sink<'a>,
    write_timeout: Option<Duration>,
}

impl<'a> Exchange<'a> {
    pub fn new(ctx: &'a mut Context, io: &'a mut Sink<'a>, write_timeout: Option<Duration>) -> Self {
        Self {
            ctx,
            io,
            write_timeout,
        }
    }

    pub fn request(&self) -> &Request {
        &self.ctx.request
    }

    pub fn response(&self) -> &Response {
        &self.ctx.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.ctx.response
    }

    pub fn context(&self) -> &Context {
        &*self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }

    pub fn is_tls(&self) -> bool {
        self.ctx.is_tls
    }

    /// Writes body bytes.
    ///
    /// Buffered responses collect the bytes until the handler returns.
    /// Unbuffered responses send the head with the first call and every
    /// chunk immediately, bounded by the write deadline.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), WriteError> {
        if self.ctx.response.buffered {
            self.ctx.response.write(data)?;
            return Ok(());
        }

        let head_only = self.ctx.request.is_head();
        let ctx = &mut *self.ctx;
        if !ctx.response.header_written {
            let keep_alive = ctx.keep_alive();
            announce_connection(ctx, keep_alive);
        }
        ctx.out.clear();
        writer::stream_body(&mut ctx.response, data, head_only, &mut ctx.scratch, &mut ctx.out)?;
        writer::write_all(&mut *self.io, &ctx.out, self.write_timeout).await
    }

    /// Takes the connection away from the engine once the handler returns.
    ///
    /// No response is serialized; the connection is passed to
    /// [`Handler::upgrade`](crate::http::connection::Handler::upgrade)
    /// instead.
    pub fn hijack(&mut self) {
        self.ctx.hijacked = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.cancel.is_cancelled()
    }

    /// Resolves when the server shuts down or the exchange deadline passes.
    pub async fn cancelled(&mut self) {
        self.ctx.cancel.cancelled().await
    }
}
