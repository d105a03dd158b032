//! Tool catalog returned by `listTools`.

use serde::Serialize;
use serde_json::{Value, json};

/// Descriptor of one callable tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Method name on the wire.
    pub name: &'static str,
    /// Short human-readable title.
    pub title: &'static str,
    /// What the tool does.
    pub description: &'static str,
    /// JSON-schema object describing the arguments.
    pub input_schema: Value,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn tool(
    name: &'static str,
    title: &'static str,
    description: &'static str,
    input_schema: Value,
) -> ToolDescriptor {
    ToolDescriptor {
        name,
        title,
        description,
        input_schema,
    }
}

const MESSAGE_ID: &str = "The message ID (from searchMessages results)";
const FOLDER_PATH: &str = "The folder URI path (from searchMessages results)";
const IS_HTML: &str = "Set to true if body contains HTML markup (default: false)";
const FROM: &str = "Sender identity (email address or identity ID from listAccounts)";
const CC: &str = "CC recipients (comma-separated)";
const BCC: &str = "BCC recipients (comma-separated)";

/// All tools, in catalog order.
#[must_use]
pub fn catalog() -> Vec<ToolDescriptor> {
    vec![
        tool(
            "listAccounts",
            "List Accounts",
            "List all email accounts and their identities",
            schema(json!({}), &[]),
        ),
        tool(
            "searchMessages",
            "Search Mail",
            "Search message headers and return IDs/folder paths you can use with getMessage to read full email content",
            schema(
                json!({
                    "query": {"type": "string", "description": "Text to search in subject, author, or recipients (use empty string to match all)"},
                    "startDate": {"type": "string", "description": "Filter messages on or after this ISO 8601 date"},
                    "endDate": {"type": "string", "description": "Filter messages on or before this ISO 8601 date (a date without time includes the whole day)"},
                    "maxResults": {"type": "number", "description": "Maximum number of results to return (default 50, max 200)"},
                    "sortOrder": {"type": "string", "description": "Date sort order: asc (oldest first) or desc (newest first, default)"},
                }),
                &["query"],
            ),
        ),
        tool(
            "getMessage",
            "Get Message",
            "Read the full content of an email message by its ID, with optional attachment saving to disk",
            schema(
                json!({
                    "messageId": {"type": "string", "description": MESSAGE_ID},
                    "folderPath": {"type": "string", "description": FOLDER_PATH},
                    "saveAttachments": {"type": "boolean", "description": "Save attachments to temp files and return file paths (default: false, returns metadata only)"},
                }),
                &["messageId", "folderPath"],
            ),
        ),
        tool(
            "sendMail",
            "Compose Mail",
            "Open a compose window with pre-filled recipient, subject, and body for user review before sending",
            schema(
                json!({
                    "to": {"type": "string", "description": "Recipient email address"},
                    "subject": {"type": "string", "description": "Email subject line"},
                    "body": {"type": "string", "description": "Email body text"},
                    "cc": {"type": "string", "description": CC},
                    "bcc": {"type": "string", "description": BCC},
                    "isHtml": {"type": "boolean", "description": IS_HTML},
                    "from": {"type": "string", "description": FROM},
                    "attachments": {"type": "array", "items": {"type": "string"}, "description": "Array of file paths to attach"},
                }),
                &["to", "subject", "body"],
            ),
        ),
        tool(
            "listCalendars",
            "List Calendars",
            "Return the user's calendars",
            schema(json!({}), &[]),
        ),
        tool(
            "createEvent",
            "Create Event",
            "Open a pre-filled event dialog for user review before saving",
            schema(
                json!({
                    "title": {"type": "string", "description": "Event title"},
                    "startDate": {"type": "string", "description": "Start date/time in ISO 8601 format"},
                    "endDate": {"type": "string", "description": "End date/time in ISO 8601 (defaults to startDate + 1h for timed, +1 day for all-day)"},
                    "location": {"type": "string", "description": "Event location"},
                    "description": {"type": "string", "description": "Event description"},
                    "calendarId": {"type": "string", "description": "Target calendar ID (from listCalendars, defaults to first writable calendar)"},
                    "allDay": {"type": "boolean", "description": "Create an all-day event (default: false)"},
                }),
                &["title", "startDate"],
            ),
        ),
        tool(
            "searchContacts",
            "Search Contacts",
            "Find contacts the user interacted with",
            schema(
                json!({
                    "query": {"type": "string", "description": "Email address or name to search for"},
                }),
                &["query"],
            ),
        ),
        tool(
            "replyToMessage",
            "Reply to Message",
            "Open a reply compose window for a specific message with proper threading",
            schema(
                json!({
                    "messageId": {"type": "string", "description": "The message ID to reply to (from searchMessages results)"},
                    "folderPath": {"type": "string", "description": FOLDER_PATH},
                    "body": {"type": "string", "description": "Reply body text"},
                    "replyAll": {"type": "boolean", "description": "Reply to all recipients (default: false)"},
                    "isHtml": {"type": "boolean", "description": IS_HTML},
                    "to": {"type": "string", "description": "Override recipient email (default: original sender)"},
                    "cc": {"type": "string", "description": CC},
                    "bcc": {"type": "string", "description": BCC},
                    "from": {"type": "string", "description": FROM},
                    "attachments": {"type": "array", "items": {"type": "string"}, "description": "Array of file paths to attach"},
                }),
                &["messageId", "folderPath", "body"],
            ),
        ),
        tool(
            "forwardMessage",
            "Forward Message",
            "Open a forward compose window for a message with attachments preserved",
            schema(
                json!({
                    "messageId": {"type": "string", "description": "The message ID to forward (from searchMessages results)"},
                    "folderPath": {"type": "string", "description": FOLDER_PATH},
                    "to": {"type": "string", "description": "Recipient email address"},
                    "body": {"type": "string", "description": "Additional text to prepend (optional)"},
                    "isHtml": {"type": "boolean", "description": IS_HTML},
                    "cc": {"type": "string", "description": CC},
                    "bcc": {"type": "string", "description": BCC},
                    "from": {"type": "string", "description": FROM},
                    "attachments": {"type": "array", "items": {"type": "string"}, "description": "Array of additional file paths to attach"},
                }),
                &["messageId", "folderPath", "to"],
            ),
        ),
        tool(
            "listFolders",
            "List Folders",
            "List all mail folders with URIs and message counts",
            schema(
                json!({
                    "accountId": {"type": "string", "description": "Filter to a specific account ID (optional)"},
                }),
                &[],
            ),
        ),
        tool(
            "updateMessage",
            "Update Message",
            "Mark a message as read/unread, flag/unflag, move to another folder, or trash it",
            schema(
                json!({
                    "messageId": {"type": "string", "description": MESSAGE_ID},
                    "folderPath": {"type": "string", "description": FOLDER_PATH},
                    "read": {"type": "boolean", "description": "Mark as read (true) or unread (false)"},
                    "flagged": {"type": "boolean", "description": "Mark as flagged (true) or unflagged (false)"},
                    "moveTo": {"type": "string", "description": "Folder URI to move the message to (from listFolders)"},
                    "trash": {"type": "boolean", "description": "Move the message to the Trash folder"},
                }),
                &["messageId", "folderPath"],
            ),
        ),
    ]
}
