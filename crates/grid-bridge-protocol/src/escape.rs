//! Keeping frame bodies on one ASCII line.
//!
//! The host reads frames line by line and looks for the first closing
//! sentinel, so a body may contain neither a line break nor a `#`. Two
//! encodings enforce that:
//!
//! - JSON bodies (write and image frames) go through [`AsciiFormatter`], which
//!   writes every non-ASCII character and every `#` as a `\uXXXX` escape. The
//!   result is still plain JSON.
//! - Text bodies (diagnostics and function results) use [`escape_line`]:
//!   `\` becomes `\\`, line feed `\n`, carriage return `\r`, and `#`, other
//!   control characters and non-ASCII characters become `\uXXXX` (UTF-16
//!   units, as in JSON). Tabs and quotes are kept.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;

use crate::{ProtocolError, Result};

/// JSON formatter producing ASCII output with no `#`
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '#' {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` as single-line ASCII JSON
pub fn to_ascii_json<T: Serialize>(value: &T) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}

/// Encode text as a single-line frame body
pub fn escape_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push('\t'),
            c if c == '#' || c.is_ascii_control() || !c.is_ascii() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Decode a body written by [`escape_line`]
pub fn unescape_line(body: &str) -> Result<String> {
    let malformed = || ProtocolError::MalformedFrame(format!("bad escape in '{body}'"));

    let mut out = String::with_capacity(body.len());
    // UTF-16 units of consecutive \u escapes, so surrogate pairs decode together
    let mut units: Vec<u16> = Vec::new();
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            flush_units(&mut units, &mut out).map_err(|_| malformed())?;
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(malformed());
                }
                units.push(u16::from_str_radix(&hex, 16).map_err(|_| malformed())?);
            }
            Some(escaped) => {
                flush_units(&mut units, &mut out).map_err(|_| malformed())?;
                match escaped {
                    '\\' => out.push('\\'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    _ => return Err(malformed()),
                }
            }
            None => return Err(malformed()),
        }
    }
    flush_units(&mut units, &mut out).map_err(|_| malformed())?;
    Ok(out)
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) -> std::result::Result<(), ()> {
    if units.is_empty() {
        return Ok(());
    }
    let text = String::from_utf16(units).map_err(|_| ())?;
    out.push_str(&text);
    units.clear();
    Ok(())
}
