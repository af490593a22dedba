use weft::config::PoolConfig;
use weft::http::context::Context;
use weft::http::parser::{Parser, Phase};
use weft::http::pool::{BufferPool, ContextPool};
use weft::http::response::StatusCode;

fn pool_config() -> PoolConfig {
    PoolConfig {
        max_idle_contexts: 4,
        buffer_retention: 1024,
    }
}

fn dirty(ctx: &mut Context) {
    Parser::default()
        .feed(
            &mut ctx.request,
            b"POST /x?y=1 HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabc",
        )
        .unwrap();
    ctx.response.set_status(StatusCode::CREATED);
    ctx.response.headers_mut().append("X-Test", "1");
    ctx.response.write(b"body").unwrap();
    ctx.response.set_connection_close();
}

fn assert_clean(ctx: &Context) {
    assert_eq!(ctx.request.phase(), Phase::FirstLine);
    assert!(ctx.request.method.is_empty());
    assert!(ctx.request.path.is_empty());
    assert!(ctx.request.query.is_empty());
    assert!(ctx.request.headers.is_empty());
    assert!(ctx.request.body.is_empty());
    assert_eq!(ctx.response.status(), StatusCode::OK);
    assert!(ctx.response.headers().is_empty());
    assert!(ctx.response.body().is_empty());
    assert!(!ctx.response.is_header_written());
    assert!(!ctx.response.connection_close());
    assert!(!ctx.is_hijacked());
    assert!(ctx.request_received.is_none());
}

#[test]
fn test_released_context_comes_back_clean() {
    let pool = ContextPool::new(&pool_config());
    let mut ctx = pool.acquire();
    dirty(&mut ctx);
    pool.release(ctx);
    assert_eq!(pool.idle_count(), 1);

    let ctx = pool.acquire();
    assert_eq!(pool.idle_count(), 0);
    assert_clean(&ctx);
}

#[test]
fn test_context_reset_is_idempotent() {
    let mut ctx = Context::new();
    dirty(&mut ctx);
    ctx.reset();
    assert_clean(&ctx);
    ctx.reset();
    assert_clean(&ctx);
}

#[test]
fn test_oversized_context_buffers_are_dropped() {
    let pool = ContextPool::new(&pool_config());
    let mut ctx = pool.acquire();
    ctx.response.write(&vec![b'x'; 64 * 1024]).unwrap();
    ctx.request.body.reserve(64 * 1024);
    pool.release(ctx);

    let ctx = pool.acquire();
    assert!(ctx.response.body().is_empty());
    assert!(ctx.request.body.capacity() <= 1024);
}

#[test]
fn test_small_buffers_keep_capacity() {
    let pool = ContextPool::new(&pool_config());
    let mut ctx = pool.acquire();
    ctx.request.body.reserve(512);
    let capacity = ctx.request.body.capacity();
    pool.release(ctx);

    let ctx = pool.acquire();
    assert_eq!(ctx.request.body.capacity(), capacity);
}

#[test]
fn test_idle_contexts_are_capped() {
    let pool = ContextPool::new(&pool_config());
    let held: Vec<Context> = (0..6).map(|_| pool.acquire()).collect();
    for ctx in held {
        pool.release(ctx);
    }
    assert_eq!(pool.idle_count(), 4);
}

#[test]
fn test_buffer_pool_round_trip() {
    let pool = BufferPool::new(4096, &pool_config());
    let mut buf = pool.acquire();
    assert!(buf.capacity() >= 4096);
    buf.extend_from_slice(b"leftover");
    pool.release(buf);

    let buf = pool.acquire();
    assert!(buf.is_empty());
    assert!(buf.capacity() >= 4096);
}

#[test]
fn test_buffer_pool_drops_grown_buffers() {
    let pool = BufferPool::new(512, &pool_config());
    let mut buf = pool.acquire();
    buf.reserve(1 << 20);
    pool.release(buf);
    assert_eq!(pool.idle_count(), 0);
}
