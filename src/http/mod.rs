//! HTTP/1.x wire protocol engine.
//!
//! # Architecture
//!
//! - **`ascii`**: Static byte classification tables (case folding, whitespace, hex)
//! - **`headers`**: Ordered key/value store with tombstone deletion
//! - **`parser`**: Incremental, resumable request and response parser
//! - **`request`** / **`response`**: The two halves of an exchange
//! - **`writer`**: Serializes responses, buffered or streamed
//! - **`context`**: The pooled aggregate that owns one request/response pair
//! - **`pool`**: Context and read-buffer pools with a retention ceiling
//! - **`exchange`**: What a handler sees while serving one request
//! - **`connection`**: The per-connection driver
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingRequest  │ ← Wait for the first bytes (read / idle deadline)
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │     Parsing      │ ← Feed every read to the parser
//!        └──────┬───────────┘
//!               │ Request complete (parse error → error response → Closed)
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Run the handler (hijack → Upgraded)
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │    Responding    │ ← Serialize and write (write deadline)
//!        └──────┬───────────┘
//!               ├─ Keep-Alive → AwaitingRequest (same context, reset in place)
//!               └─ Close → Closed (context back to the pool)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weft::config::Config;
//! use weft::http::connection::{Connection, Engine, Handler};
//! use weft::http::exchange::Exchange;
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
//!         ex.write(b"hello\n").await?;
//!         Ok(())
//!     }
//! }
//!
//! let engine = Arc::new(Engine::new(&Config::default(), Hello));
//! tokio::spawn(Connection::new(socket, false, engine).run());
//! ```

pub mod ascii;
pub mod connection;
pub mod context;
pub mod exchange;
pub mod headers;
pub mod parser;
pub mod pool;
pub mod request;
pub mod response;
pub mod writer;
