use weft::http::context::Context;
use weft::http::parser::Parser;
use weft::http::request::{Method, Request};

fn parse(raw: &[u8]) -> Request {
    let mut req = Request::new();
    Parser::default().feed(&mut req, raw).unwrap();
    req
}

#[test]
fn test_method_from_str() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("DELETE"), Some(Method::DELETE));
    assert_eq!(Method::from_str("get"), None);
    assert_eq!(Method::from_str("BREW"), None);
    assert_eq!(Method::PATCH.as_str(), "PATCH");
}

#[test]
fn test_keep_alive_decision_table() {
    let cases: &[(&[u8], bool)] = &[
        (b"GET / HTTP/1.1\r\n\r\n", true),
        (b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n", false),
        (b"GET / HTTP/1.1\r\nConnection: Close\r\n\r\n", false),
        (b"GET / HTTP/1.0\r\n\r\n", false),
        (b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n", true),
        (b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n", true),
        (b"GET / HTTP/1.1\r\nConnection: keep-alive, close\r\n\r\n", false),
        (b"GET / HTTP/1.1\r\nConnection: Upgrade\r\n\r\n", true),
    ];

    for (raw, expected) in cases {
        let req = parse(raw);
        assert_eq!(
            req.keep_alive(),
            *expected,
            "{}",
            String::from_utf8_lossy(raw)
        );
    }
}

#[test]
fn test_response_close_overrides_request() {
    let mut ctx = Context::new();
    Parser::default()
        .feed(&mut ctx.request, b"GET / HTTP/1.1\r\n\r\n")
        .unwrap();
    assert!(ctx.keep_alive());

    ctx.response.headers_mut().set("Connection", "close");
    assert!(!ctx.keep_alive());

    ctx.response.reset();
    ctx.response.set_connection_close();
    assert!(!ctx.keep_alive());
}

#[test]
fn test_connection_tokens() {
    let req = parse(b"GET / HTTP/1.1\r\nConnection: Upgrade, HTTP2-Settings\r\n\r\n");
    assert!(req.connection_has("upgrade"));
    assert!(req.connection_has("http2-settings"));
    assert!(!req.connection_has("close"));
}

#[test]
fn test_head_detection() {
    assert!(parse(b"HEAD / HTTP/1.1\r\n\r\n").is_head());
    assert!(!parse(b"GET / HTTP/1.1\r\n\r\n").is_head());
    assert!(parse(b"GET / HTTP/1.1\r\n\r\n").is_http11());
    assert!(!parse(b"GET / HTTP/1.0\r\n\r\n").is_http11());
}
