//! Deterministic, ASCII-only JSON output.
//!
//! Object keys come out sorted because `serde_json::Map` is ordered by key in this crate's
//! configuration; non-ASCII characters are written as `\uXXXX` escapes (UTF-16 surrogate
//! pairs above the BMP).

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Encode `value` as compact ASCII JSON
pub fn to_ascii_string(value: &Value) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut serializer)?;
    // Only ASCII bytes were written
    Ok(String::from_utf8_lossy(&out).into_owned())
}
