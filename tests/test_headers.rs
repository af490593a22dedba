use weft::http::headers::Headers;

#[test]
fn test_normalized_lookup_ignores_case_both_ways() {
    let mut headers = Headers::normalized();
    headers.append("content-TYPE", "text/html");

    let keys: Vec<&[u8]> = headers.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![&b"Content-Type"[..]]);

    assert_eq!(headers.get_str("Content-Type"), Some("text/html"));
    assert_eq!(headers.get_str("content-type"), Some("text/html"));
    assert_eq!(headers.get_str("CONTENT-TYPE"), Some("text/html"));
    assert!(headers.contains("cOnTeNt-TyPe"));
}

#[test]
fn test_exact_store_keeps_casing() {
    let mut headers = Headers::new();
    headers.append("x-lower", "1");

    assert!(!headers.is_normalized());
    assert_eq!(headers.get_str("x-lower"), Some("1"));
    assert_eq!(headers.get_str("X-Lower"), None);
    assert_eq!(headers.get_ignore_ascii_case("X-LOWER"), Some(&b"1"[..]));

    let keys: Vec<&[u8]> = headers.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![&b"x-lower"[..]]);
}

#[test]
fn test_multiple_values_keep_insertion_order() {
    let mut headers = Headers::new();
    headers.append("Set-Cookie", "a=1");
    headers.append("Vary", "Accept");
    headers.append("Set-Cookie", "b=2");
    headers.append("Set-Cookie", "c=3");

    assert_eq!(headers.get_str("Set-Cookie"), Some("a=1"));
    assert_eq!(
        headers.get_all("Set-Cookie"),
        vec![&b"a=1"[..], &b"b=2"[..], &b"c=3"[..]]
    );

    let mut seen = Vec::new();
    headers.each_live(|k, v| seen.push(format!("{}={}", String::from_utf8_lossy(k), String::from_utf8_lossy(v))));
    assert_eq!(
        seen,
        vec!["Set-Cookie=a=1", "Vary=Accept", "Set-Cookie=b=2", "Set-Cookie=c=3"]
    );
}

#[test]
fn test_delete_removes_every_match() {
    let mut headers = Headers::normalized();
    headers.append("X-A", "1");
    headers.append("X-B", "2");
    headers.append("x-a", "3");

    assert_eq!(headers.delete("x-a"), 2);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get("X-A"), None);
    assert_eq!(headers.get_str("X-B"), Some("2"));
    assert_eq!(headers.delete("X-A"), 0);
}

#[test]
fn test_set_replaces_all_values() {
    let mut headers = Headers::new();
    headers.append("Cache-Control", "no-cache");
    headers.append("Cache-Control", "no-store");
    headers.append("Server", "weft");

    headers.set("Cache-Control", "max-age=60");

    assert_eq!(headers.get_all("Cache-Control"), vec![&b"max-age=60"[..]]);
    let keys: Vec<&[u8]> = headers.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![&b"Server"[..], &b"Cache-Control"[..]]);
}

#[test]
fn test_delete_ignore_ascii_case_on_exact_store() {
    let mut headers = Headers::new();
    headers.append("content-length", "3");
    headers.append("Content-Length", "4");

    assert_eq!(headers.delete("CONTENT-LENGTH"), 0);
    assert_eq!(headers.delete_ignore_ascii_case("CONTENT-LENGTH"), 2);
    assert!(headers.is_empty());
}

#[test]
fn test_reset_empties_and_reuses_storage() {
    let mut headers = Headers::normalized();
    for i in 0..8 {
        headers.append(format!("X-Header-{}", i), "some value");
    }
    let retained = headers.retained_bytes();

    headers.reset();
    assert!(headers.is_empty());
    assert_eq!(headers.len(), 0);
    assert_eq!(headers.get("X-Header-0"), None);

    headers.append("X-Header-0", "v");
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get_str("x-header-0"), Some("v"));
    assert_eq!(headers.retained_bytes(), retained);
}

#[test]
fn test_reset_is_idempotent() {
    let mut headers = Headers::new();
    headers.append("A", "1");
    headers.reset();
    headers.reset();
    assert!(headers.is_empty());
    headers.append("B", "2");
    assert_eq!(headers.len(), 1);
}

#[test]
fn test_non_utf8_value() {
    let mut headers = Headers::new();
    headers.append("X-Bin", [0xffu8, 0xfe]);
    assert_eq!(headers.get("X-Bin"), Some(&[0xffu8, 0xfe][..]));
    assert_eq!(headers.get_str("X-Bin"), None);
}
