//! The pooled per-exchange aggregate.

use std::time::Instant;

use bytes::BytesMut;
use tokio::sync::watch;

use crate::http::request::Request;
use crate::http::response::Response;

/// Cooperative cancellation for a running handler.
///
/// Fires when the server starts shutting down or when the per-exchange
/// deadline passes. The engine never interrupts a handler by itself.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    shutdown: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new(shutdown: Option<watch::Receiver<bool>>, deadline: Option<Instant>) -> Self {
        Self { shutdown, deadline }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        let shutting_down = self.shutdown.as_ref().is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        shutting_down || expired
    }

    /// Resolves once the exchange is cancelled. Never resolves if neither a
    /// shutdown signal nor a deadline is attached.
    pub async fn cancelled(&mut self) {
        let deadline = self.deadline;
        let expire = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        let shutdown = async {
            match self.shutdown.as_mut() {
                Some(rx) => {
                    if rx.wait_for(|stop| *stop).await.is_err() {
                        // sender gone without signalling
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = expire => {}
            _ = shutdown => {}
        }
    }

    fn clear(&mut self) {
        self.shutdown = None;
        self.deadline = None;
    }
}

/// One request/response pair plus the scratch space needed to serve it.
///
/// A context is reused in place for every exchange on a keep-alive
/// connection and goes back to the pool when the connection ends.
#[derive(Debug)]
pub struct Context {
    pub request: Request,
    pub response: Response,
    /// Whether the connection runs over TLS
    pub is_tls: bool,
    pub connection_established: Instant,
    /// When the first byte of the current request was read
    pub request_received: Option<Instant>,
    pub(crate) cancel: Cancellation,
    pub(crate) out: BytesMut,
    pub(crate) scratch: BytesMut,
    pub(crate) hijacked: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            request: Request::new(),
            response: Response::new(),
            is_tls: false,
            connection_established: Instant::now(),
            request_received: None,
            cancel: Cancellation::default(),
            out: BytesMut::new(),
            scratch: BytesMut::new(),
            hijacked: false,
        }
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    /// Decides whether the connection may serve another exchange.
    ///
    /// The response can force a close, then the request can, then an explicit
    /// `Connection: keep-alive` keeps it, and otherwise the protocol version
    /// decides.
    pub fn keep_alive(&self) -> bool {
        if self.response.connection_close() {
            return false;
        }
        self.request.keep_alive()
    }

    /// Prepares the context for the next exchange on the same connection.
    pub fn reset(&mut self) {
        self.request.reset();
        self.response.reset();
        self.request_received = None;
        self.cancel.clear();
        self.out.clear();
        self.scratch.clear();
        self.hijacked = false;
    }

    /// Resets the context and drops buffers that grew past `ceiling` bytes.
    pub(crate) fn recycle(&mut self, ceiling: usize) {
        self.request.recycle(ceiling);
        self.response.recycle(ceiling);
        self.request_received = None;
        self.cancel.clear();
        self.hijacked = false;
        self.is_tls = false;
        for buf in [&mut self.out, &mut self.scratch] {
            buf.clear();
            if buf.capacity() > ceiling {
                *buf = BytesMut::new();
            }
        }
    }
}
