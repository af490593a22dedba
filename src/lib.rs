//! weft - HTTP/1.x wire protocol engine
//!
//! Incremental request parsing, response serialization and a pooled
//! keep-alive connection driver.

pub mod config;
pub mod http;
pub mod server;
