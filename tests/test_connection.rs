use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use weft::config::{Config, Limits, Timeouts};
use weft::http::connection::{Connection, Engine, Handler, Upgraded};
use weft::http::exchange::Exchange;
use weft::http::response::StatusCode;

/// Answers with the method and path, followed by the request body.
struct Echo;

impl Handler for Echo {
    async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
        let req = ex.request();
        let mut text = format!("{} {}", req.method, req.path);
        if !req.body.is_empty() {
            text.push(' ');
            text.push_str(&String::from_utf8_lossy(&req.body));
        }
        ex.response_mut().set_content_type("text/plain");
        ex.write(text.as_bytes()).await?;
        Ok(())
    }
}

struct Failing;

impl Handler for Failing {
    async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
        ex.response_mut().headers_mut().append("X-Partial", "yes");
        anyhow::bail!("backend unavailable")
    }
}

struct Streaming;

impl Handler for Streaming {
    async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
        let resp = ex.response_mut();
        resp.set_buffered(false);
        resp.headers_mut().set("Transfer-Encoding", "chunked");
        ex.write(b"hello").await?;
        ex.write(b"world").await?;
        Ok(())
    }
}

/// Switches to a raw echo protocol on `Upgrade: echo`.
struct Upgrading;

impl Handler for Upgrading {
    async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
        if ex.request().header("Upgrade") == Some("echo") {
            ex.hijack();
        } else {
            ex.response_mut().set_status(StatusCode::BAD_REQUEST);
        }
        Ok(())
    }

    async fn upgrade(&self, mut upgraded: Upgraded) {
        let mut rest = Vec::new();
        let _ = upgraded
            .io
            .write_all(b"HTTP/1.1 101 Switching Protocols\r\n\r\n")
            .await;
        let _ = upgraded.io.write_all(&upgraded.read_ahead).await;
        let _ = upgraded.io.read_to_end(&mut rest).await;
        let _ = upgraded.io.write_all(&rest).await;
        let _ = upgraded.io.shutdown().await;
    }
}

/// Waits for cancellation before answering.
struct Patient;

impl Handler for Patient {
    async fn handle(&self, ex: &mut Exchange<'_>) -> anyhow::Result<()> {
        ex.cancelled().await;
        assert!(ex.is_cancelled());
        ex.write(b"cancelled").await?;
        Ok(())
    }
}

fn config(limits: Limits, timeouts: Timeouts) -> Config {
    Config {
        limits,
        timeouts,
        ..Config::default()
    }
}

fn spawn<H: Handler>(
    engine: &Arc<Engine<H>>,
) -> (DuplexStream, JoinHandle<anyhow::Result<()>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::new(server, false, engine.clone());
    (client, tokio::spawn(conn.run()))
}

async fn exchange<H: Handler>(engine: &Arc<Engine<H>>, input: &[u8]) -> String {
    let (mut client, task) = spawn(engine);
    client.write_all(input).await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    let _ = task.await.unwrap();
    String::from_utf8(out).unwrap()
}

fn echo_engine() -> Arc<Engine<Echo>> {
    Arc::new(Engine::new(&config(Limits::default(), Timeouts::none()), Echo))
}

#[tokio::test]
async fn test_pipelined_keep_alive() {
    let engine = echo_engine();
    let out = exchange(
        &engine,
        b"GET /one HTTP/1.1\r\nHost: a\r\n\r\nPOST /two HTTP/1.1\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc",
    )
    .await;

    assert_eq!(
        out,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 8\r\n\r\nGET /one\
         HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\nContent-Length: 13\r\n\r\nPOST /two abc"
    );
    assert_eq!(engine.contexts().idle_count(), 1);
    assert_eq!(engine.buffers().idle_count(), 1);
}

#[tokio::test]
async fn test_http10_closes_by_default() {
    let out = exchange(&echo_engine(), b"GET /old HTTP/1.0\r\n\r\nGET /never HTTP/1.0\r\n\r\n").await;
    assert_eq!(
        out,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 8\r\n\r\nGET /old"
    );
}

#[tokio::test]
async fn test_http10_keep_alive_is_announced() {
    let out = exchange(
        &echo_engine(),
        b"GET /a HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /b HTTP/1.0\r\n\r\n",
    )
    .await;
    assert_eq!(
        out,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\nContent-Length: 6\r\n\r\nGET /a\
         HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nGET /b"
    );
}

#[tokio::test]
async fn test_head_request_gets_no_body() {
    let out = exchange(
        &echo_engine(),
        b"HEAD /h HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(
        out,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\nContent-Length: 7\r\n\r\n"
    );
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let engine = echo_engine();
    let (mut client, task) = spawn(&engine);

    let parts: &[&[u8]] = &[b"GET /sl", b"ow HTTP/1.1\r\nConn", b"ection: close\r\n", b"\r\n"];
    for part in parts {
        client.write_all(part).await.unwrap();
        tokio::task::yield_now().await;
    }

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();
    assert!(out.ends_with("\r\n\r\nGET /slow"), "{}", out);
}

#[tokio::test]
async fn test_malformed_request_gets_400() {
    let out = exchange(&echo_engine(), b"GET / HTTP/1.1\r\nBad Header\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", out);
    assert!(out.contains("Connection: close\r\n"));
}

#[tokio::test]
async fn test_limit_violations_map_to_statuses() {
    let limits = Limits {
        max_first_line_size: 32,
        max_header_size: 64,
        max_body_size: 8,
        ..Limits::default()
    };
    let engine = Arc::new(Engine::new(&config(limits, Timeouts::none()), Echo));

    let long_line = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(64));
    let out = exchange(&engine, long_line.as_bytes()).await;
    assert!(out.starts_with("HTTP/1.1 414 URI Too Long\r\n"), "{}", out);

    let big_headers = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "b".repeat(128));
    let out = exchange(&engine, big_headers.as_bytes()).await;
    assert!(
        out.starts_with("HTTP/1.1 431 Request Header Fields Too Large\r\n"),
        "{}",
        out
    );

    let out = exchange(&engine, b"POST / HTTP/1.1\r\nContent-Length: 9\r\n\r\n123456789").await;
    assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{}", out);
}

#[tokio::test]
async fn test_transfer_encoding_gets_501() {
    let out = exchange(
        &echo_engine(),
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n",
    )
    .await;
    assert!(out.starts_with("HTTP/1.1 501 Not Implemented\r\n"), "{}", out);
}

#[tokio::test]
async fn test_handler_error_becomes_500() {
    let engine = Arc::new(Engine::new(&config(Limits::default(), Timeouts::none()), Failing));
    let out = exchange(&engine, b"GET / HTTP/1.1\r\n\r\nGET /again HTTP/1.1\r\n\r\n").await;
    assert_eq!(
        out,
        "HTTP/1.1 500 Internal Server Error\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
}

#[tokio::test]
async fn test_unbuffered_chunked_stream() {
    let engine = Arc::new(Engine::new(&config(Limits::default(), Timeouts::none()), Streaming));
    let out = exchange(&engine, b"GET /stream HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert_eq!(
        out,
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
         5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n"
    );
}

#[tokio::test]
async fn test_hijack_hands_over_connection() {
    let engine = Arc::new(Engine::new(&config(Limits::default(), Timeouts::none()), Upgrading));
    let (mut client, task) = spawn(&engine);

    client
        .write_all(b"GET /ws HTTP/1.1\r\nUpgrade: echo\r\nConnection: Upgrade\r\n\r\nEARLY")
        .await
        .unwrap();
    client.write_all(b" LATE").await.unwrap();
    client.shutdown().await.unwrap();

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(out, "HTTP/1.1 101 Switching Protocols\r\n\r\nEARLY LATE");
}

#[tokio::test]
async fn test_shutdown_closes_idle_connection() {
    let engine = echo_engine();
    let (mut client, task) = spawn(&engine);

    client.write_all(b"GET /a HTTP/1.1\r\n\r\n").await.unwrap();
    let expected = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nGET /a";
    let mut first = vec![0u8; expected.len()];
    client.read_exact(&mut first).await.unwrap();
    assert_eq!(String::from_utf8(first).unwrap(), expected);

    engine.shutdown();
    assert!(engine.is_shutting_down());

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_idle_timeout_closes_connection() {
    let timeouts = Timeouts {
        idle_ms: Some(50),
        ..Timeouts::none()
    };
    let engine = Arc::new(Engine::new(&config(Limits::default(), timeouts), Echo));
    let (mut client, task) = spawn(&engine);

    client.write_all(b"GET /a HTTP/1.1\r\n\r\n").await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();
    assert!(String::from_utf8(out).unwrap().ends_with("GET /a"));
}

#[tokio::test]
async fn test_read_deadline_fails_connection() {
    let timeouts = Timeouts {
        read_ms: Some(50),
        ..Timeouts::none()
    };
    let engine = Arc::new(Engine::new(&config(Limits::default(), timeouts), Echo));
    let (mut client, task) = spawn(&engine);

    client.write_all(b"GET /stalled HTTP/1.1\r\nHo").await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());
    assert!(task.await.unwrap().is_err());
}

#[tokio::test]
async fn test_handler_deadline_cancels() {
    let timeouts = Timeouts {
        handler_ms: Some(20),
        ..Timeouts::none()
    };
    let engine = Arc::new(Engine::new(&config(Limits::default(), timeouts), Patient));
    let out = exchange(&engine, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(out.ends_with("\r\n\r\ncancelled"), "{}", out);
}

#[tokio::test]
async fn test_peer_closing_mid_request() {
    let engine = echo_engine();
    let (mut client, task) = spawn(&engine);
    client.write_all(b"GET /half HTTP/1.1\r\n").await.unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());
    task.await.unwrap().unwrap();
}
