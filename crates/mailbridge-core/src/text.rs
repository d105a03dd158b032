//! Text and HTML helpers shared by the reader and the compose engine.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Compiles a hard-coded pattern.
#[allow(clippy::unwrap_used)]
fn pattern(source: &str) -> Regex {
    Regex::new(source).unwrap()
}

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<style[^>]*>.*?</style>"));
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<script[^>]*>.*?</script>"));
static TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"<[^>]+>"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"&(nbsp|amp|lt|gt|quot|apos|#[0-9]+|#[xX][0-9a-fA-F]+);"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s+"));
// Commas inside a quoted display name do not split.
static ADDRESS_TOKEN: LazyLock<Regex> = LazyLock::new(|| pattern(r#"(?:[^,"]|"[^"]*")+"#));
static ANGLE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| pattern(r"<([^>]+)>"));

/// Escapes `&`, `<` and `>`.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes plain text and turns newlines into `<br>`.
#[must_use]
pub fn plain_to_html(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

/// Replaces every non-ASCII character with a decimal character reference.
#[must_use]
pub fn encode_non_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(&format!("&#{};", u32::from(c)));
        }
    }
    out
}

/// Formats a caller-supplied body as an HTML fragment.
///
/// Plain text is escaped with line breaks preserved. HTML has its newlines
/// removed, since the compose surface turns each one into a break, and its
/// non-ASCII characters entity-encoded.
#[must_use]
pub fn format_body(body: &str, is_html: bool) -> String {
    if is_html {
        encode_non_ascii(&body.replace('\n', ""))
    } else {
        plain_to_html(body)
    }
}

/// Wraps an HTML fragment in a minimal UTF-8 document.
#[must_use]
pub fn html_document(fragment: &str) -> String {
    format!("<html><head><meta charset=\"UTF-8\"></head><body>{fragment}</body></html>")
}

/// Builds the final compose body for a new message.
///
/// HTML input that already carries a document root is used as is.
#[must_use]
pub fn compose_document(body: &str, is_html: bool) -> String {
    let formatted = format_body(body, is_html);
    if is_html && formatted.contains("<html") {
        formatted
    } else {
        html_document(&formatted)
    }
}

fn decode_entity(caps: &Captures<'_>) -> String {
    let name = &caps[1];
    let decoded = match name {
        "nbsp" => Some(' '),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = &name[1..];
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => digits.parse().ok(),
            };
            code.and_then(char::from_u32)
        }
    };
    decoded.map_or_else(|| caps[0].to_string(), String::from)
}

/// Reduces an HTML document to readable plain text.
///
/// Style and script blocks are dropped, remaining tags become spaces,
/// common and numeric entities are decoded in a single pass, and runs of
/// whitespace collapse to one space.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let text = STYLE_BLOCK.replace_all(html, "");
    let text = SCRIPT_BLOCK.replace_all(&text, "");
    let text = TAG.replace_all(&text, " ");
    let text = ENTITY.replace_all(&text, decode_entity);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Splits an address header on commas that are not inside quotes.
///
/// Tokens are trimmed and empty tokens dropped.
#[must_use]
pub fn split_addresses(header: &str) -> Vec<&str> {
    ADDRESS_TOKEN
        .find_iter(header)
        .map(|m| m.as_str().trim())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Extracts the lowercased email from `Name <addr>` or a bare address.
#[must_use]
pub fn extract_email(token: &str) -> String {
    ANGLE_ADDRESS
        .captures(token)
        .and_then(|caps| caps.get(1))
        .map_or(token.trim(), |m| m.as_str())
        .to_lowercase()
}
