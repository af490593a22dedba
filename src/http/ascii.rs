//! Byte classification tables.
//!
//! Every table is a `static` computed at compile time and never mutated, so
//! lookups need no synchronization.

/// Marker in [`HEX_VALUE`] for bytes that are not hexadecimal digits.
pub const NOT_HEX: u8 = 0xff;

pub static TO_UPPER: [u8; 256] = build_upper();
pub static TO_LOWER: [u8; 256] = build_lower();
pub static IS_SPACE: [bool; 256] = build_space();
pub static HEX_VALUE: [u8; 256] = build_hex();

const fn build_upper() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = if b >= b'a' && b <= b'z' { b - 32 } else { b };
        i += 1;
    }
    table
}

const fn build_lower() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = if b >= b'A' && b <= b'Z' { b + 32 } else { b };
        i += 1;
    }
    table
}

const fn build_space() -> [bool; 256] {
    let mut table = [false; 256];
    table[b' ' as usize] = true;
    table[b'\t' as usize] = true;
    table[b'\r' as usize] = true;
    table[b'\n' as usize] = true;
    table
}

const fn build_hex() -> [u8; 256] {
    let mut table = [NOT_HEX; 256];
    let mut i = 0;
    while i < 10 {
        table[b'0' as usize + i] = i as u8;
        i += 1;
    }
    let mut i = 0;
    while i < 6 {
        table[b'a' as usize + i] = 10 + i as u8;
        table[b'A' as usize + i] = 10 + i as u8;
        i += 1;
    }
    table
}

#[inline]
pub fn is_space(b: u8) -> bool {
    IS_SPACE[b as usize]
}

/// Canonical form of a header-name byte given the byte before it.
///
/// The first letter and every letter after `-` are upper-cased, all others
/// lower-cased, so `content-TYPE` becomes `Content-Type`.
#[inline]
pub fn canonical_header_byte(prev: Option<u8>, b: u8) -> u8 {
    match prev {
        None | Some(b'-') => TO_UPPER[b as usize],
        Some(_) => TO_LOWER[b as usize],
    }
}

/// Trims leading and trailing whitespace using [`IS_SPACE`].
pub fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| !is_space(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| !is_space(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Percent-decodes `src` into `out`, returning `None` on a broken escape.
pub fn percent_decode(src: &[u8], out: &mut Vec<u8>) -> Option<()> {
    let mut i = 0;
    while i < src.len() {
        let b = src[i];
        if b == b'%' {
            let hi = HEX_VALUE[*src.get(i + 1)? as usize];
            let lo = HEX_VALUE[*src.get(i + 2)? as usize];
            if hi == NOT_HEX || lo == NOT_HEX {
                return None;
            }
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(b);
            i += 1;
        }
    }
    Some(())
}

/// Parses an unsigned decimal made only of ASCII digits.
pub fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_tables() {
        assert_eq!(TO_UPPER[b'a' as usize], b'A');
        assert_eq!(TO_UPPER[b'-' as usize], b'-');
        assert_eq!(TO_LOWER[b'Z' as usize], b'z');
        assert_eq!(TO_LOWER[0xC0], 0xC0);
    }

    #[test]
    fn hex_table() {
        assert_eq!(HEX_VALUE[b'f' as usize], 15);
        assert_eq!(HEX_VALUE[b'F' as usize], 15);
        assert_eq!(HEX_VALUE[b'9' as usize], 9);
        assert_eq!(HEX_VALUE[b'g' as usize], NOT_HEX);
    }

    #[test]
    fn decodes_escapes() {
        let mut out = Vec::new();
        percent_decode(b"/a%20b%2Fc", &mut out).unwrap();
        assert_eq!(out, b"/a b/c");

        out.clear();
        assert!(percent_decode(b"/bad%2", &mut out).is_none());
        out.clear();
        assert!(percent_decode(b"/bad%zz", &mut out).is_none());
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(trim(b"  text/plain \t"), b"text/plain");
        assert_eq!(trim(b"   "), b"");
    }

    #[test]
    fn decimal() {
        assert_eq!(parse_decimal(b"42"), Some(42));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"4a"), None);
        assert_eq!(parse_decimal(b"99999999999999999999999"), None);
    }
}
