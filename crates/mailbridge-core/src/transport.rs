//! Transport sanitizer.
//!
//! Response bodies travel over a byte channel that writes each character of
//! the payload as a single byte. Payloads are therefore flattened before
//! writing: invalid control characters are dropped and every non-ASCII
//! character is expanded into one character per UTF-8 byte. The resulting
//! byte stream is plain UTF-8 that any JSON parser reads back unchanged.
//!
//! Inbound bodies are decoded strictly as UTF-8.

use crate::rpc::JsonRpcRequest;

/// Reasons a request body is rejected before dispatch.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Body is not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// Body is not a JSON-RPC envelope.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

const fn is_dropped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}' | '\u{7f}')
}

/// Flattens serialized JSON for the byte-oriented response channel.
///
/// Control characters other than tab, newline and carriage return are
/// removed, as is DEL. Each non-ASCII character is replaced by the
/// characters `U+0080..=U+00FF` matching its UTF-8 bytes.
#[must_use]
pub fn sanitize_for_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut buf = [0u8; 4];
    for c in text.chars() {
        if is_dropped_control(c) {
            continue;
        }
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        for byte in c.encode_utf8(&mut buf).bytes() {
            out.push(char::from(byte));
        }
    }
    out
}

/// Writes sanitized text as bytes, one byte per character.
///
/// Characters outside the single-byte range (text that was not sanitized)
/// are written as their UTF-8 encoding.
#[must_use]
pub fn to_wire_bytes(sanitized: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(sanitized.len());
    let mut buf = [0u8; 4];
    for c in sanitized.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(byte) => bytes.push(byte),
            Err(_) => bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
    bytes
}

/// Serializes a value into the bytes sent on the wire.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_response<T: serde::Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let json = serde_json::to_string(value)?;
    Ok(to_wire_bytes(&sanitize_for_json(&json)))
}

/// Decodes a request body as UTF-8 JSON.
///
/// # Errors
///
/// Returns an error if the body is not UTF-8 or not a JSON-RPC object.
pub fn decode_request(body: &[u8]) -> Result<JsonRpcRequest, RequestError> {
    let text = std::str::from_utf8(body)?;
    Ok(serde_json::from_str(text)?)
}

/// Best-effort repair of a response that failed to parse.
///
/// Drops invalid control characters and escapes raw carriage returns,
/// newlines and tabs that appear inside string literals.
#[must_use]
pub fn repair_json(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in data.chars() {
        if is_dropped_control(c) {
            continue;
        }
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
