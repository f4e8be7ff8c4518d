//! Quoting and literal formatting for SQL text.
//!
//! Values should be bound as parameters where possible. These helpers
//! cover the remaining cases where a literal has to be written into the
//! statement itself, such as the value lists assembled by the batch writer.

use std::fmt::Write;

/// Double every apostrophe so the result can sit inside `'...'`.
#[must_use]
pub fn quote(string: &str) -> String {
    let quotes = string.bytes().filter(|b| *b == b'\'').count();
    let mut quoted = String::with_capacity(string.len() + quotes);
    for c in string.chars() {
        if c == '\'' {
            quoted.push('\'');
        }
        quoted.push(c);
    }
    quoted
}

/// Quote the first `length` bytes of `string`.
///
/// Embedded NULs are kept. A length that falls inside a multi-byte
/// character is shortened to the previous character boundary.
#[must_use]
pub fn nquote(string: &str, length: usize) -> String {
    let mut end = length.min(string.len());
    while !string.is_char_boundary(end) {
        end -= 1;
    }
    quote(&string[..end])
}

/// Quote text that may not be valid UTF-8.
///
/// Well-formed text is quoted as is. Anything else has its control and
/// non-ASCII bytes escaped first, so foreign encodings survive without
/// breaking the statement.
#[must_use]
pub fn escape_and_quote(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => quote(text),
        Err(_) => quote(&escape(bytes)),
    }
}

/// Escape everything outside printable ASCII, then quote.
#[must_use]
pub fn ascii_escape_and_quote(bytes: &[u8]) -> String {
    quote(&escape(bytes))
}

/// Render an INSERT-ready literal: `'quoted'`, or `NULL` when absent.
#[must_use]
pub fn insert_literal(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| format!("'{}'", quote(v)))
}

/// C-style escaping of control characters, backslash, double quote and
/// bytes outside printable ASCII (as three-digit octal).
fn escape(bytes: &[u8]) -> String {
    let mut escaped = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'\x08' => escaped.push_str("\\b"),
            b'\x0c' => escaped.push_str("\\f"),
            b'\n' => escaped.push_str("\\n"),
            b'\r' => escaped.push_str("\\r"),
            b'\t' => escaped.push_str("\\t"),
            b'\x0b' => escaped.push_str("\\v"),
            b'\\' => escaped.push_str("\\\\"),
            b'"' => escaped.push_str("\\\""),
            0x20..=0x7e => escaped.push(char::from(byte)),
            _ => {
                let _ = write!(escaped, "\\{byte:03o}");
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_apostrophes() {
        assert_eq!(quote("O'Brien"), "O''Brien");
        assert_eq!(quote("''"), "''''");
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote(""), "");
    }

    #[test]
    fn test_quote_unescapes_back() {
        for s in ["it's", "'", "a''b", "no quotes", "ünïcode'"] {
            assert_eq!(quote(s).replace("''", "'"), s);
        }
    }

    #[test]
    fn test_nquote_keeps_embedded_nul() {
        let s = "a'\0b'c";
        assert_eq!(nquote(s, 4), "a''\0b");
        assert_eq!(nquote(s, 100), "a''\0b''c");
    }

    #[test]
    fn test_nquote_char_boundary() {
        // 'é' is two bytes; cutting through it drops the whole char
        assert_eq!(nquote("é'", 1), "");
        assert_eq!(nquote("é'", 3), "é''");
    }

    #[test]
    fn test_insert_literal() {
        assert_eq!(insert_literal(None), "NULL");
        assert_eq!(insert_literal(Some("x")), "'x'");
        assert_eq!(insert_literal(Some("it's")), "'it''s'");
    }

    #[test]
    fn test_escape_and_quote_valid_utf8() {
        assert_eq!(escape_and_quote("naïve 'x'\n".as_bytes()), "naïve ''x''\n");
    }

    #[test]
    fn test_escape_and_quote_invalid_utf8() {
        // Latin-1 'é' followed by an apostrophe
        assert_eq!(escape_and_quote(b"caf\xe9'\n"), "caf\\351''\\n");
    }

    #[test]
    fn test_ascii_escape_and_quote() {
        assert_eq!(ascii_escape_and_quote("é'".as_bytes()), "\\303\\251''");
        assert_eq!(ascii_escape_and_quote(b"tab\there"), "tab\\there");
    }
}
