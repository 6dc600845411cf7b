//! Go string literal quoting and unquoting.

use std::fmt::Write as _;

/// Decodes a Go string literal (interpreted `"..."` or raw `` `...` ``).
pub fn unquote(lit: &str) -> Result<String, String> {
    if lit.len() >= 2 && lit.starts_with('`') && lit.ends_with('`') {
        return Ok(lit[1..lit.len() - 1].replace('\r', ""));
    }
    if !(lit.len() >= 2 && lit.starts_with('"') && lit.ends_with('"')) {
        return Err("invalid syntax".to_string());
    }
    let body = &lit[1..lit.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut bytes: Vec<u8> = Vec::new();
    let mut chars = body.chars().peekable();

    // Octal and hex escapes produce raw bytes that may combine into UTF-8.
    let flush = |bytes: &mut Vec<u8>, out: &mut String| {
        if !bytes.is_empty() {
            out.push_str(&String::from_utf8_lossy(bytes));
            bytes.clear();
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return Err("invalid syntax".to_string()),
            '\\' => {
                let Some(esc) = chars.next() else {
                    return Err("invalid syntax".to_string());
                };
                match esc {
                    'x' => bytes.push(take_hex(&mut chars, 2)? as u8),
                    '0'..='7' => {
                        let mut v = esc.to_digit(8).unwrap_or(0);
                        for _ in 0..2 {
                            let d = chars
                                .next()
                                .and_then(|d| d.to_digit(8))
                                .ok_or_else(|| "invalid syntax".to_string())?;
                            v = v * 8 + d;
                        }
                        if v > 255 {
                            return Err("invalid syntax".to_string());
                        }
                        bytes.push(v as u8);
                    }
                    _ => {
                        flush(&mut bytes, &mut out);
                        let decoded = match esc {
                            'a' => '\u{07}',
                            'b' => '\u{08}',
                            'f' => '\u{0c}',
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            'v' => '\u{0b}',
                            '\\' => '\\',
                            '"' => '"',
                            'u' => char::from_u32(take_hex(&mut chars, 4)?)
                                .ok_or_else(|| "invalid syntax".to_string())?,
                            'U' => char::from_u32(take_hex(&mut chars, 8)?)
                                .ok_or_else(|| "invalid syntax".to_string())?,
                            _ => return Err("invalid syntax".to_string()),
                        };
                        out.push(decoded);
                    }
                }
            }
            other => {
                flush(&mut bytes, &mut out);
                out.push(other);
            }
        }
    }
    flush(&mut bytes, &mut out);
    Ok(out)
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, n: usize) -> Result<u32, String> {
    let mut v: u32 = 0;
    for _ in 0..n {
        let d = chars
            .next()
            .and_then(|d| d.to_digit(16))
            .ok_or_else(|| "invalid syntax".to_string())?;
        v = v * 16 + d;
    }
    Ok(v)
}

/// Encodes `s` as an interpreted Go string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            // Byte order marks and other format characters are legal in
            // strings but confuse readers of the generated file.
            '\u{feff}' | '\u{2028}' | '\u{2029}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Like [`quote`], but accepts arbitrary bytes: invalid UTF-8 sequences are
/// kept byte for byte as `\xNN` escapes.
pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    let mut rest = bytes;
    while !rest.is_empty() {
        let (valid, invalid) = match std::str::from_utf8(rest) {
            Ok(s) => (s, 0),
            Err(e) => {
                let (head, _) = rest.split_at(e.valid_up_to());
                let head = std::str::from_utf8(head).unwrap_or_default();
                (head, e.error_len().unwrap_or(rest.len() - e.valid_up_to()))
            }
        };
        let q = quote(valid);
        out.push_str(&q[1..q.len() - 1]);
        let start = valid.len();
        for b in &rest[start..start + invalid] {
            let _ = write!(out, "\\x{b:02x}");
        }
        rest = &rest[start + invalid..];
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquotes_raw_and_interpreted_literals() {
        assert_eq!(unquote("`json:\"foo\"`").unwrap(), "json:\"foo\"");
        assert_eq!(unquote("\"env:\\\"FOO\\\"\"").unwrap(), "env:\"FOO\"");
        assert_eq!(unquote("\"\\u00e9\\x41\\101\"").unwrap(), "éAA");
        assert_eq!(unquote("\"\\xc3\\xa9\"").unwrap(), "é");
    }

    #[test]
    fn rejects_malformed_literals() {
        assert!(unquote("json:\"foo\"").is_err());
        assert!(unquote("\"\\q\"").is_err());
        assert!(unquote("\"a\"b\"").is_err());
    }

    #[test]
    fn quote_escapes_what_go_requires() {
        assert_eq!(quote("a\"b\\c\nd\u{1}"), "\"a\\\"b\\\\c\\nd\\x01\"");
        assert_eq!(unquote(&quote("{\"foo\": \"bär\"}\n")).unwrap(), "{\"foo\": \"bär\"}\n");
    }

    #[test]
    fn quote_bytes_escapes_invalid_utf8() {
        assert_eq!(quote_bytes(b"a\xffb\xc3"), "\"a\\xffb\\xc3\"");
        assert_eq!(quote_bytes("é\n".as_bytes()), quote("é\n"));
    }
}
