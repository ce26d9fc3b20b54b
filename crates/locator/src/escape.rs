//! Object-store key escaping
//!
//! Object-store URLs encode keys with query-string rules rather than plain
//! path rules: space becomes `+` and a literal `+` becomes `%2B`. A `/` is a
//! key separator and is never escaped.

use url::form_urlencoded::byte_serialize;

/// Escape a key for use in an object-store URL.
///
/// Each `/`-delimited segment is escaped on its own and the segments are
/// joined back with `/`.
#[must_use]
pub fn key_escape(key: &str) -> String {
    key.split('/')
        .map(|segment| byte_serialize(segment.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode a query-escaped string (`+` is a space, `%XX` is a byte).
///
/// Fails on a truncated or non-hex escape and on byte sequences that are not
/// valid UTF-8.
pub fn query_unescape(input: &str) -> Result<String, String> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_value);
                let lo = bytes.get(i + 2).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => decoded.push(hi << 4 | lo),
                    _ => {
                        let end = (i + 3).min(bytes.len());
                        return Err(format!(
                            "invalid URL escape {:?}",
                            String::from_utf8_lossy(&bytes[i..end])
                        ));
                    }
                }
                i += 3;
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|e| format!("decoded key is not UTF-8: {e}"))
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
