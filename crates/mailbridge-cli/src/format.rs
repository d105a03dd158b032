//! Terminal rendering of tool results.

use std::fmt::Write;

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The `error` member of an operation result, if present.
#[must_use]
pub fn operation_error(result: &Value) -> Option<&str> {
    result.get("error").and_then(Value::as_str)
}

fn parse<T: DeserializeOwned>(result: &Value) -> anyhow::Result<T> {
    Ok(T::deserialize(result)?)
}

fn local_date(iso: Option<&str>) -> String {
    iso.and_then(|iso| DateTime::parse_from_rfc3339(iso).ok())
        .map(|date| {
            date.with_timezone(&Local)
                .format("%d %b %Y %H:%M")
                .to_string()
        })
        .unwrap_or_default()
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.replace('\n', " ");
    let text = text.trim();
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn flags(read: bool, flagged: bool) -> String {
    let labels: Vec<&str> = [(!read, "UNREAD"), (flagged, "FLAGGED")]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect();
    if labels.is_empty() {
        String::new()
    } else {
        format!(" [{}]", labels.join(" "))
    }
}

fn subject_or_placeholder(subject: &str) -> &str {
    if subject.is_empty() { "(no subject)" } else { subject }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessageRow {
    id: String,
    subject: String,
    author: String,
    date: Option<String>,
    folder_path: String,
    read: bool,
    flagged: bool,
}

/// Renders a search result list.
///
/// # Errors
///
/// Returns an error if the result is not a message list.
pub fn messages(result: &Value) -> anyhow::Result<String> {
    let rows: Vec<MessageRow> = parse(result)?;
    if rows.is_empty() {
        return Ok("No messages found.\n".to_string());
    }

    let mut out = String::new();
    for row in &rows {
        writeln!(out, "{}  {}", local_date(row.date.as_deref()), truncate(&row.author, 30))?;
        writeln!(
            out,
            "  {}{}",
            subject_or_placeholder(&row.subject),
            flags(row.read, row.flagged)
        )?;
        writeln!(out, "  id: {}  folder: {}", row.id, row.folder_path)?;
        writeln!(out)?;
    }
    writeln!(out, "{} message(s)", rows.len())?;
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AttachmentRow {
    name: String,
    size: u64,
    file_path: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessageView {
    id: String,
    subject: String,
    author: String,
    recipients: String,
    cc_list: String,
    date: Option<String>,
    read: bool,
    flagged: bool,
    body: String,
    attachments: Vec<AttachmentRow>,
}

/// Renders a full message.
///
/// # Errors
///
/// Returns an error if the result is not a message.
#[allow(clippy::cast_precision_loss)]
pub fn message(result: &Value) -> anyhow::Result<String> {
    let view: MessageView = parse(result)?;
    let mut out = String::new();

    writeln!(
        out,
        "Subject: {}{}",
        subject_or_placeholder(&view.subject),
        flags(view.read, view.flagged)
    )?;
    writeln!(out, "From:    {}", view.author)?;
    writeln!(out, "To:      {}", view.recipients)?;
    if !view.cc_list.is_empty() {
        writeln!(out, "CC:      {}", view.cc_list)?;
    }
    writeln!(out, "Date:    {}", local_date(view.date.as_deref()))?;
    writeln!(out, "ID:      {}", view.id)?;

    if !view.attachments.is_empty() {
        writeln!(out, "\nAttachments ({}):", view.attachments.len())?;
        for attachment in &view.attachments {
            write!(out, "  {}", attachment.name)?;
            if attachment.size > 0 {
                write!(out, " ({:.1}KB)", attachment.size as f64 / 1024.0)?;
            }
            if let Some(path) = &attachment.file_path {
                write!(out, " -> {path}")?;
            }
            if let Some(error) = &attachment.error {
                write!(out, " [{error}]")?;
            }
            writeln!(out)?;
        }
    }

    let body = if view.body.is_empty() { "(empty body)" } else { view.body.as_str() };
    writeln!(out, "\n{body}")?;
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FolderRow {
    name: String,
    path: String,
    total_messages: u32,
    unread_messages: u32,
    depth: usize,
}

/// Renders a folder tree.
///
/// # Errors
///
/// Returns an error if the result is not a folder list.
pub fn folders(result: &Value) -> anyhow::Result<String> {
    let rows: Vec<FolderRow> = parse(result)?;
    if rows.is_empty() {
        return Ok("No folders found.\n".to_string());
    }

    let mut out = String::new();
    for row in &rows {
        let indent = "  ".repeat(row.depth);
        let unread = if row.unread_messages > 0 {
            format!(" ({} unread)", row.unread_messages)
        } else {
            String::new()
        };
        writeln!(out, "{indent}{}  [{} msgs{unread}]", row.name, row.total_messages)?;
        writeln!(out, "{indent}  {}", row.path)?;
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdentityRow {
    name: String,
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountRow {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    identities: Vec<IdentityRow>,
}

/// Renders accounts with their identities.
///
/// # Errors
///
/// Returns an error if the result is not an account list.
pub fn accounts(result: &Value) -> anyhow::Result<String> {
    let rows: Vec<AccountRow> = parse(result)?;
    if rows.is_empty() {
        return Ok("No accounts found.\n".to_string());
    }

    let mut out = String::new();
    for row in &rows {
        writeln!(out, "{} ({})", row.name, row.kind)?;
        for identity in &row.identities {
            writeln!(out, "  {} <{}>", identity.name, identity.email)?;
        }
        writeln!(out)?;
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContactRow {
    display_name: String,
    email: String,
    first_name: String,
    last_name: String,
}

/// Renders contact search hits.
///
/// # Errors
///
/// Returns an error if the result is not a contact list.
pub fn contacts(result: &Value) -> anyhow::Result<String> {
    let rows: Vec<ContactRow> = parse(result)?;
    if rows.is_empty() {
        return Ok("No contacts found.\n".to_string());
    }

    let mut out = String::new();
    for row in &rows {
        let full = [row.first_name.as_str(), row.last_name.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = if full.is_empty() { &row.display_name } else { &full };
        writeln!(out, "{name}  <{}>", row.email)?;
    }
    writeln!(out, "\n{} contact(s)", rows.len())?;
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CalendarRow {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    read_only: bool,
}

/// Renders the calendar list.
///
/// # Errors
///
/// Returns an error if the result is not a calendar list.
pub fn calendars(result: &Value) -> anyhow::Result<String> {
    let rows: Vec<CalendarRow> = parse(result)?;
    if rows.is_empty() {
        return Ok("No calendars found.\n".to_string());
    }

    let mut out = String::new();
    for row in &rows {
        let kind = if row.kind.is_empty() { "unknown" } else { row.kind.as_str() };
        let access = if row.read_only { " [read-only]" } else { "" };
        writeln!(out, "{} ({kind}){access}", row.name)?;
        writeln!(out, "  id: {}", row.id)?;
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolRow {
    name: String,
    description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Catalog {
    tools: Vec<ToolRow>,
}

/// Renders the tool catalog.
///
/// # Errors
///
/// Returns an error if the result is not a tool catalog.
pub fn tools(result: &Value) -> anyhow::Result<String> {
    let catalog: Catalog = parse(result)?;
    let mut out = String::new();
    for tool in &catalog.tools {
        writeln!(out, "{:<16}{}", tool.name, tool.description)?;
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateResult {
    actions: Vec<String>,
}

/// Renders the actions applied by `updateMessage`.
///
/// # Errors
///
/// Returns an error if the result is not an update report.
pub fn update(result: &Value) -> anyhow::Result<String> {
    let report: UpdateResult = parse(result)?;
    Ok(format!("Done: {}\n", report.actions.join(", ")))
}

/// Renders the summary of a compose or event request.
#[must_use]
pub fn outcome(result: &Value, fallback: &str) -> String {
    let message = result
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback);
    format!("{message}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_operation_errors() {
        assert_eq!(
            operation_error(&json!({"error": "Message not found: x"})),
            Some("Message not found: x")
        );
        assert_eq!(operation_error(&json!([])), None);
        assert_eq!(operation_error(&json!({"success": true})), None);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("short", 30), "short");
        assert_eq!(truncate("line\nbreak ", 30), "line break");
        assert_eq!(truncate("\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}", 5), "\u{e9}\u{e9}...");
    }

    #[test]
    fn message_list() {
        let out = messages(&json!([{
            "id": "m1@x", "subject": "", "author": "Alice <alice@x>",
            "folderPath": "imap://a/INBOX", "read": false, "flagged": true,
        }]))
        .unwrap();
        assert_eq!(
            out,
            "  Alice <alice@x>\n  (no subject) [UNREAD FLAGGED]\n  id: m1@x  folder: imap://a/INBOX\n\n1 message(s)\n"
        );
        assert_eq!(messages(&json!([])).unwrap(), "No messages found.\n");
    }

    #[test]
    fn full_message() {
        let out = message(&json!({
            "id": "m1@x", "subject": "Hi", "author": "a@x", "recipients": "b@x",
            "ccList": "", "read": true, "flagged": false, "body": "Hello",
            "attachments": [
                {"name": "a.txt", "size": 2048, "filePath": "/tmp/a.txt"},
                {"name": "big.bin", "size": 0, "error": "Exceeds 50MB size limit"},
            ],
        }))
        .unwrap();
        assert!(out.starts_with("Subject: Hi\nFrom:    a@x\nTo:      b@x\nDate:    \n"));
        assert!(out.contains("\nAttachments (2):\n  a.txt (2.0KB) -> /tmp/a.txt\n"));
        assert!(out.contains("  big.bin [Exceeds 50MB size limit]\n"));
        assert!(out.ends_with("\nHello\n"));
    }

    #[test]
    fn folder_tree() {
        let out = folders(&json!([
            {"name": "Inbox", "path": "imap://a/INBOX", "totalMessages": 4, "unreadMessages": 2, "depth": 0},
            {"name": "Sub", "path": "imap://a/INBOX/Sub", "totalMessages": 1, "unreadMessages": 0, "depth": 1},
        ]))
        .unwrap();
        assert_eq!(
            out,
            "Inbox  [4 msgs (2 unread)]\n  imap://a/INBOX\n  Sub  [1 msgs]\n    imap://a/INBOX/Sub\n"
        );
    }

    #[test]
    fn accounts_and_contacts() {
        let out = accounts(&json!([{
            "id": "account1", "name": "Work", "type": "imap",
            "identities": [{"id": "id1", "email": "me@w", "name": "Me", "isDefault": true}],
        }]))
        .unwrap();
        assert_eq!(out, "Work (imap)\n  Me <me@w>\n\n");

        let out = contacts(&json!([
            {"displayName": "Ally", "email": "a@x", "firstName": "Alice", "lastName": "Smith"},
            {"displayName": "Bob", "email": "b@x", "firstName": "", "lastName": ""},
        ]))
        .unwrap();
        assert_eq!(out, "Alice Smith  <a@x>\nBob  <b@x>\n\n2 contact(s)\n");
    }

    #[test]
    fn calendar_list() {
        let out = calendars(&json!([
            {"id": "h", "name": "Holidays", "type": "ics", "readOnly": true},
        ]))
        .unwrap();
        assert_eq!(out, "Holidays (ics) [read-only]\n  id: h\n");
    }

    #[test]
    fn update_and_outcome() {
        assert_eq!(
            update(&json!({"success": true, "actions": ["marked read", "trashed"]})).unwrap(),
            "Done: marked read, trashed\n"
        );
        assert_eq!(
            outcome(&json!({"success": true, "message": "Reply window opened"}), "x"),
            "Reply window opened\n"
        );
        assert_eq!(outcome(&json!({}), "Compose window opened"), "Compose window opened\n");
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(messages(&json!({"not": "a list"})).is_err());
    }
}
