use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::{Config, Timeouts};
use crate::http::context::{Cancellation, Context};
use crate::http::exchange::Exchange;
use crate::http::parser::{ParseError, Parser};
use crate::http::pool::{BufferPool, ContextPool};
use crate::http::response::StatusCode;
use crate::http::writer;

/// Byte stream a connection can run over: a TCP socket, a TLS stream, or an
/// in-memory pipe in tests.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

/// A connection the engine gave up after a handler hijacked it.
pub struct Upgraded {
    pub io: Box<dyn Transport>,
    /// Bytes already read from the peer but not consumed by the parser
    pub read_ahead: BytesMut,
}

/// Application code invoked once per parsed request.
pub trait Handler: Send + Sync + 'static {
    /// Fills in the response. Returning an error answers with 500 when the
    /// head has not been written yet and closes the connection.
    fn handle(&self, exchange: &mut Exchange<'_>) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Takes over a connection after [`Exchange::hijack`]. The default drops
    /// it.
    fn upgrade(&self, upgraded: Upgraded) -> impl Future<Output = ()> + Send {
        async move {
            drop(upgraded);
        }
    }
}

/// State shared by every connection of a server.
pub struct Engine<H> {
    parser: Parser,
    timeouts: Timeouts,
    contexts: ContextPool,
    buffers: BufferPool,
    handler: H,
    shutdown: watch::Sender<bool>,
}

impl<H: Handler> Engine<H> {
    pub fn new(config: &Config, handler: H) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            parser: Parser::new(&config.limits),
            timeouts: config.timeouts.clone(),
            contexts: ContextPool::new(&config.pool),
            buffers: BufferPool::new(config.limits.read_buffer_size, &config.pool),
            handler,
            shutdown,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn contexts(&self) -> &ContextPool {
        &self.contexts
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Stops accepting, ends keep-alive after the current exchanges and
    /// cancels running handlers.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequest,
    Parsing,
    Dispatching,
    Responding,
    Closed,
}

enum Outcome {
    Closed,
    Hijacked(BytesMut),
}

pub struct Connection<IO, H> {
    io: IO,
    is_tls: bool,
    engine: Arc<Engine<H>>,
    state: ConnectionState,
    exchanges: u64,
}

impl<IO: Transport, H: Handler> Connection<IO, H> {
    pub fn new(io: IO, is_tls: bool, engine: Arc<Engine<H>>) -> Self {
        Self {
            io,
            is_tls,
            engine,
            state: ConnectionState::AwaitingRequest,
            exchanges: 0,
        }
    }

    /// Serves exchanges until the connection closes or is hijacked.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let engine = self.engine.clone();

        let mut ctx = engine.contexts.acquire();
        ctx.is_tls = self.is_tls;
        ctx.connection_established = Instant::now();

        let mut buf = engine.buffers.acquire();
        buf.resize(engine.buffers.buffer_size(), 0);

        let outcome = self.drive(&mut ctx, &mut buf[..]).await;

        engine.buffers.release(buf);
        engine.contexts.release(ctx);

        match outcome? {
            Outcome::Closed => {
                tracing::debug!(exchanges = self.exchanges, "Connection closed");
                Ok(())
            }
            Outcome::Hijacked(read_ahead) => {
                tracing::debug!(exchanges = self.exchanges, "Connection hijacked");
                let upgraded = Upgraded {
                    io: Box::new(self.io),
                    read_ahead,
                };
                engine.handler.upgrade(upgraded).await;
                Ok(())
            }
        }
    }

    async fn drive(&mut self, ctx: &mut Context, buf: &mut [u8]) -> anyhow::Result<Outcome> {
        // unparsed bytes live in buf[start..end]
        let mut start = 0;
        let mut end = 0;
        let mut handler_failed = false;

        loop {
            match self.state {
                ConnectionState::AwaitingRequest => {
                    if start == end {
                        match self.await_request(buf).await? {
                            Some(n) => {
                                start = 0;
                                end = n;
                            }
                            None => {
                                self.state = ConnectionState::Closed;
                                continue;
                            }
                        }
                    }
                    ctx.request_received = Some(Instant::now());
                    self.state = ConnectionState::Parsing;
                }

                ConnectionState::Parsing => {
                    if start == end {
                        let n = self.read(buf, self.engine.timeouts.read()).await?;
                        if n == 0 {
                            tracing::debug!("Peer closed connection mid-request");
                            self.state = ConnectionState::Closed;
                            continue;
                        }
                        start = 0;
                        end = n;
                    }

                    match self.engine.parser.feed(&mut ctx.request, &buf[start..end]) {
                        Ok(used) => {
                            start += used;
                            if ctx.request.is_complete() {
                                self.state = ConnectionState::Dispatching;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                status = e.status().as_u16(),
                                limit = e.is_limit(),
                                "Rejecting request"
                            );
                            self.reject(ctx, &e).await;
                            self.state = ConnectionState::Closed;
                        }
                    }
                }

                ConnectionState::Dispatching => {
                    ctx.cancel = Cancellation::new(
                        Some(self.engine.subscribe_shutdown()),
                        self.engine.timeouts.handler().map(|d| Instant::now() + d),
                    );

                    let result = {
                        let mut exchange =
                            Exchange::new(&mut *ctx, &mut self.io, self.engine.timeouts.write());
                        self.engine.handler.handle(&mut exchange).await
                    };

                    handler_failed = false;
                    if let Err(e) = result {
                        tracing::error!(
                            error = %e,
                            method = %ctx.request.method,
                            path = %ctx.request.path,
                            "Handler failed"
                        );
                        if ctx.response.is_header_written() {
                            self.state = ConnectionState::Closed;
                            continue;
                        }
                        handler_failed = true;
                        ctx.response.reset();
                        ctx.response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                        ctx.response.set_connection_close();
                    } else if ctx.is_hijacked() {
                        return Ok(Outcome::Hijacked(BytesMut::from(&buf[start..end])));
                    }

                    self.state = ConnectionState::Responding;
                }

                ConnectionState::Responding => {
                    let keep_alive =
                        !handler_failed && ctx.keep_alive() && !self.engine.is_shutting_down();

                    self.respond(ctx, keep_alive).await?;
                    self.exchanges += 1;

                    if keep_alive {
                        ctx.reset();
                        self.state = ConnectionState::AwaitingRequest;
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    return Ok(Outcome::Closed);
                }
            }
        }
    }

    /// Waits for the first bytes of the next request.
    ///
    /// Returns `None` when the peer closed the connection, the idle deadline
    /// expired or the server is shutting down.
    async fn await_request(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<usize>> {
        let engine = self.engine.clone();
        let timeouts = &engine.timeouts;
        let mut shutdown = engine.subscribe_shutdown();

        let idle = match timeouts.idle() {
            Some(idle) if self.exchanges > 0 => idle,
            _ => {
                let n = tokio::select! {
                    n = self.read(buf, timeouts.read()) => n?,
                    _ = shutdown.wait_for(|stop| *stop) => 0,
                };
                return Ok((n > 0).then_some(n));
            }
        };

        let probe = timeouts.pipeline_probe();
        if !probe.is_zero() {
            if let Ok(read) = timeout(probe, self.io.read(buf)).await {
                let n = read.context("Failed to read from peer")?;
                return Ok((n > 0).then_some(n));
            }
            tracing::trace!("No pipelined request, waiting for idle deadline");
        }

        tokio::select! {
            read = timeout(idle, self.io.read(buf)) => match read {
                Ok(read) => {
                    let n = read.context("Failed to read from peer")?;
                    Ok((n > 0).then_some(n))
                }
                Err(_) => {
                    tracing::debug!(idle_ms = idle.as_millis() as u64, "Idle timeout");
                    Ok(None)
                }
            },
            _ = shutdown.wait_for(|stop| *stop) => Ok(None),
        }
    }

    async fn read(&mut self, buf: &mut [u8], deadline: Option<Duration>) -> anyhow::Result<usize> {
        let n = match deadline {
            Some(limit) => timeout(limit, self.io.read(buf))
                .await
                .context("Read deadline exceeded")?,
            None => self.io.read(buf).await,
        }
        .context("Failed to read from peer")?;
        tracing::trace!(bytes = n, "Read from peer");
        Ok(n)
    }

    async fn respond(&mut self, ctx: &mut Context, keep_alive: bool) -> anyhow::Result<()> {
        let head_only = ctx.request.is_head();
        ctx.out.clear();

        if ctx.response.is_header_written() {
            writer::finish_stream(&mut ctx.response, head_only, &mut ctx.scratch, &mut ctx.out)
                .context("Failed to finish streamed response")?;
        } else {
            announce_connection(ctx, keep_alive);
            writer::serialize(&mut ctx.response, head_only, &mut ctx.out)
                .context("Failed to serialize response")?;
        }

        writer::write_all(&mut self.io, &ctx.out, self.engine.timeouts.write())
            .await
            .context("Failed to write response")?;

        tracing::debug!(
            method = %ctx.request.method,
            path = %ctx.request.path,
            status = ctx.response.status().as_u16(),
            keep_alive,
            "Request served"
        );
        Ok(())
    }

    /// Best-effort error answer before the connection is dropped.
    async fn reject(&mut self, ctx: &mut Context, err: &ParseError) {
        let response = &mut ctx.response;
        response.reset();
        response.set_status(err.status());
        response.set_content_type("text/plain; charset=utf-8");
        response.headers_mut().set("Connection", "close");
        if response.write(format!("{}\n", err).as_bytes()).is_err() {
            return;
        }

        ctx.out.clear();
        if let Err(e) = writer::serialize(&mut ctx.response, false, &mut ctx.out) {
            tracing::debug!(error = %e, "Could not build error response");
            return;
        }
        if let Err(e) = writer::write_all(&mut self.io, &ctx.out, self.engine.timeouts.write()).await {
            tracing::debug!(error = %e, "Could not send error response");
        }
    }
}

/// Adds the `Connection` header a client would not assume by default.
pub(crate) fn announce_connection(ctx: &mut Context, keep_alive: bool) {
    let http11 = ctx.request.is_http11();
    let headers = ctx.response.headers_mut();
    if headers.get_ignore_ascii_case("Connection").is_some() {
        return;
    }
    if keep_alive && !http11 {
        headers.append("Connection", "keep-alive");
    } else if !keep_alive && http11 {
        headers.append("Connection", "close");
    }
}
