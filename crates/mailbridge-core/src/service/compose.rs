//! Outbound message construction.
//!
//! Builds fully populated [`ComposeRequest`]s for new messages, replies and
//! forwards and hands them to the store's compose surface. Nothing is sent
//! directly; the user reviews every message before it goes out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::reader::extract_body;
use super::{MailService, ServiceError};
use crate::store::{
    AttachmentSource, ComposeAttachment, ComposeKind, ComposeRequest, Identity, MailStore,
    MessageHeader, MimeMessage,
};
use crate::text;

/// Arguments of `sendMail`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendParams {
    /// Recipients.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// CC recipients.
    #[serde(default)]
    pub cc: Option<String>,
    /// BCC recipients.
    #[serde(default)]
    pub bcc: Option<String>,
    /// Whether `body` is HTML.
    #[serde(default)]
    pub is_html: Option<bool>,
    /// Sender identity, by email or identity key.
    #[serde(default)]
    pub from: Option<String>,
    /// Local file paths to attach.
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Arguments of `replyToMessage`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyParams {
    /// Message-ID of the original.
    pub message_id: String,
    /// Folder URI of the original.
    pub folder_path: String,
    /// Reply text.
    pub body: String,
    /// Copy every original recipient.
    #[serde(default)]
    pub reply_all: Option<bool>,
    /// Whether `body` is HTML.
    #[serde(default)]
    pub is_html: Option<bool>,
    /// Recipient override; defaults to the original author.
    #[serde(default)]
    pub to: Option<String>,
    /// CC override.
    #[serde(default)]
    pub cc: Option<String>,
    /// BCC recipients.
    #[serde(default)]
    pub bcc: Option<String>,
    /// Sender identity, by email or identity key.
    #[serde(default)]
    pub from: Option<String>,
    /// Local file paths to attach.
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Arguments of `forwardMessage`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardParams {
    /// Message-ID of the original.
    pub message_id: String,
    /// Folder URI of the original.
    pub folder_path: String,
    /// Recipients.
    pub to: String,
    /// Introductory text placed above the forwarded message.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is HTML.
    #[serde(default)]
    pub is_html: Option<bool>,
    /// CC recipients.
    #[serde(default)]
    pub cc: Option<String>,
    /// BCC recipients.
    #[serde(default)]
    pub bcc: Option<String>,
    /// Sender identity, by email or identity key.
    #[serde(default)]
    pub from: Option<String>,
    /// Additional local file paths to attach.
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Result of a compose operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeOutcome {
    /// Always `true`; failures are reported as errors.
    pub success: bool,
    /// Human-readable summary, including warnings.
    pub message: String,
}

impl ComposeOutcome {
    fn new(summary: String, warning: Option<&str>, failed: &[String]) -> Self {
        let mut message = summary;
        if let Some(warning) = warning {
            message.push_str(&format!(" ({warning})"));
        }
        if !failed.is_empty() {
            message.push_str(&format!(" (failed to attach: {})", failed.join(", ")));
        }
        Self {
            success: true,
            message,
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn with_prefix(subject: &str, prefix: &str) -> String {
    let already = subject
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
    if already {
        subject.to_string()
    } else {
        format!("{prefix} {subject}")
    }
}

fn local_date(header: &MessageHeader) -> String {
    header
        .date()
        .map(|date| {
            date.with_timezone(&Local)
                .format("%a, %d %b %Y %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

fn original_text(mime: Option<&MimeMessage>) -> String {
    mime.map(|mime| extract_body(mime).0).unwrap_or_default()
}

/// Computes the CC list of a reply-all.
///
/// Original recipients and CC entries are combined, the replying address is
/// removed and duplicates collapse onto their first occurrence, comparing
/// addresses case-insensitively.
#[must_use]
pub fn reply_all_cc(recipients: &str, cc_list: &str, own_email: &str) -> String {
    let own = own_email.to_lowercase();
    let mut seen = HashSet::new();
    text::split_addresses(recipients)
        .into_iter()
        .chain(text::split_addresses(cc_list))
        .filter(|token| {
            let email = text::extract_email(token);
            (own.is_empty() || email != own) && seen.insert(email)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves local file paths into attachments, collecting the ones that do
/// not name a file.
fn attach_files(paths: Option<&Vec<String>>) -> (Vec<ComposeAttachment>, Vec<String>) {
    let mut attached = Vec::new();
    let mut failed = Vec::new();
    for raw in paths.into_iter().flatten() {
        let path = Path::new(raw);
        if !path.is_file() {
            debug!(path = %raw, "Attachment path is not a file");
            failed.push(raw.clone());
            continue;
        }
        let name = path
            .file_name()
            .map_or_else(|| raw.clone(), |name| name.to_string_lossy().into_owned());
        attached.push(ComposeAttachment {
            name,
            content_type: None,
            source: AttachmentSource::File(PathBuf::from(raw)),
        });
    }
    (attached, failed)
}

impl<S: MailStore> MailService<S> {
    /// Finds the sender identity for a compose request.
    ///
    /// A hint matching any identity's key or email wins. Otherwise the
    /// default identity of `account_key` (or of the default account) is
    /// used, with a warning when a hint was given.
    fn resolve_identity(
        &self,
        hint: Option<&str>,
        account_key: Option<&str>,
    ) -> Result<(Identity, Option<String>), ServiceError> {
        let accounts = self.store.accounts();
        let hint = hint.filter(|h| !h.is_empty());

        if let Some(hint) = hint
            && let Some(identity) = accounts
                .iter()
                .flat_map(|account| &account.identities)
                .find(|identity| identity.matches(hint))
        {
            return Ok((identity.clone(), None));
        }

        let from_account = account_key
            .and_then(|key| accounts.iter().find(|account| account.key == key))
            .and_then(|account| account.default_identity().cloned());
        let identity = from_account
            .or_else(|| {
                self.store
                    .default_account()
                    .and_then(|account| account.default_identity().cloned())
            })
            .or_else(|| {
                accounts
                    .iter()
                    .find_map(|account| account.identities.first().cloned())
            })
            .ok_or(ServiceError::NoIdentity)?;

        let warning = hint.map(|hint| format!("unknown identity: {hint}, using default"));
        Ok((identity, warning))
    }

    /// Opens a compose window for a new message.
    ///
    /// # Errors
    ///
    /// Returns an error if no sender identity exists or the compose surface fails.
    pub fn send(&self, params: &SendParams) -> Result<ComposeOutcome, ServiceError> {
        let (identity, warning) = self.resolve_identity(params.from.as_deref(), None)?;
        let (attachments, failed) = attach_files(params.attachments.as_ref());

        let request = ComposeRequest {
            kind: ComposeKind::New,
            identity,
            to: params.to.clone(),
            cc: params.cc.clone().unwrap_or_default(),
            bcc: params.bcc.clone().unwrap_or_default(),
            subject: params.subject.clone(),
            body: text::compose_document(&params.body, params.is_html.unwrap_or(false)),
            references: None,
            headers: Vec::new(),
            attachments,
        };
        self.store.open_compose(request)?;

        Ok(ComposeOutcome::new(
            "Compose window opened".to_string(),
            warning.as_deref(),
            &failed,
        ))
    }

    /// Opens a reply to an existing message, quoting the original.
    ///
    /// # Errors
    ///
    /// Returns an error if the original cannot be found, no sender identity
    /// exists or the compose surface fails.
    pub async fn reply(&self, params: &ReplyParams) -> Result<ComposeOutcome, ServiceError> {
        let (folder, header) = self.find_message(&params.message_id, &params.folder_path)?;
        let mime = self.store.fetch_mime(&folder.uri, header.key).await?;
        let (identity, warning) =
            self.resolve_identity(params.from.as_deref(), Some(&folder.account_key))?;

        let to = non_empty(params.to.as_ref()).unwrap_or_else(|| header.author());
        let cc_override = non_empty(params.cc.as_ref());
        let cc = if params.reply_all.unwrap_or(false) {
            cc_override.map_or_else(
                || reply_all_cc(&header.recipients, &header.cc_list, &identity.email),
                str::to_string,
            )
        } else {
            cc_override.unwrap_or_default().to_string()
        };

        let thread_id = format!("<{}>", header.message_id);
        let quoted = text::plain_to_html(&original_text(mime.as_ref()));
        let quote_block = format!(
            "<br><br>On {}, {} wrote:<br><blockquote type=\"cite\">{quoted}</blockquote>",
            local_date(&header),
            text::escape_html(header.author()),
        );
        let body = text::html_document(&format!(
            "{}{quote_block}",
            text::format_body(&params.body, params.is_html.unwrap_or(false))
        ));
        let (attachments, failed) = attach_files(params.attachments.as_ref());

        let request = ComposeRequest {
            kind: ComposeKind::Reply,
            identity,
            to: to.to_string(),
            cc,
            bcc: params.bcc.clone().unwrap_or_default(),
            subject: with_prefix(header.subject(), "Re:"),
            body,
            references: Some(thread_id.clone()),
            headers: vec![("In-Reply-To".to_string(), thread_id)],
            attachments,
        };
        self.store.open_compose(request)?;
        info!(message_id = %header.message_id, "Reply window opened");

        Ok(ComposeOutcome::new(
            "Reply window opened".to_string(),
            warning.as_deref(),
            &failed,
        ))
    }

    /// Opens a forward of an existing message, keeping its attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the original cannot be found, no sender identity
    /// exists or the compose surface fails.
    pub async fn forward(&self, params: &ForwardParams) -> Result<ComposeOutcome, ServiceError> {
        let (folder, header) = self.find_message(&params.message_id, &params.folder_path)?;
        let mime = self.store.fetch_mime(&folder.uri, header.key).await?;
        let (identity, warning) =
            self.resolve_identity(params.from.as_deref(), Some(&folder.account_key))?;

        let forward_block = format!(
            "-------- Forwarded Message --------<br>\
             Subject: {}<br>\
             Date: {}<br>\
             From: {}<br>\
             To: {}<br><br>{}",
            text::escape_html(header.subject()),
            local_date(&header),
            text::escape_html(header.author()),
            text::escape_html(header.recipients()),
            text::plain_to_html(&original_text(mime.as_ref())),
        );
        let intro = non_empty(params.body.as_ref())
            .map(|body| format!("{}<br><br>", text::format_body(body, params.is_html.unwrap_or(false))))
            .unwrap_or_default();

        let mut attachments: Vec<ComposeAttachment> = Vec::new();
        for original in mime.iter().flat_map(|mime| &mime.attachments) {
            if original.url.is_empty() {
                debug!(attachment = %original.name, "Skipping unreadable original attachment");
                continue;
            }
            attachments.push(ComposeAttachment {
                name: original.name.clone(),
                content_type: Some(original.content_type.clone()),
                source: AttachmentSource::Url(original.url.clone()),
            });
        }
        let (files, failed) = attach_files(params.attachments.as_ref());
        attachments.extend(files);
        let count = attachments.len();

        let request = ComposeRequest {
            kind: ComposeKind::Forward,
            identity,
            to: params.to.clone(),
            cc: params.cc.clone().unwrap_or_default(),
            bcc: params.bcc.clone().unwrap_or_default(),
            subject: with_prefix(header.subject(), "Fwd:"),
            body: text::html_document(&format!("{intro}{forward_block}")),
            references: None,
            headers: Vec::new(),
            attachments,
        };
        self.store.open_compose(request)?;
        info!(message_id = %header.message_id, attachments = count, "Forward window opened");

        Ok(ComposeOutcome::new(
            format!("Forward window opened with {count} attachment(s)"),
            warning.as_deref(),
            &failed,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::service::fixtures::{self, INBOX};
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn send_params(value: serde_json::Value) -> SendParams {
        serde_json::from_value(value).unwrap()
    }

    fn reply_params(value: serde_json::Value) -> ReplyParams {
        serde_json::from_value(value).unwrap()
    }

    fn forward_params(value: serde_json::Value) -> ForwardParams {
        serde_json::from_value(value).unwrap()
    }

    mod send_tests {
        use super::*;

        #[test]
        fn opens_compose_with_default_identity() {
            let (service, store) = fixtures::service(fixtures::store());
            let outcome = service
                .send(&send_params(json!({
                    "to": "bob@example.com",
                    "subject": "Hi",
                    "body": "a < b\nc",
                })))
                .unwrap();
            assert!(outcome.success);
            assert_eq!(outcome.message, "Compose window opened");

            let composed = store.composed();
            assert_eq!(composed.len(), 1);
            let request = &composed[0];
            assert_eq!(request.kind, ComposeKind::New);
            assert_eq!(request.identity.email, "me@work.com");
            assert_eq!(request.to, "bob@example.com");
            assert_eq!(request.cc, "");
            assert_eq!(
                request.body,
                "<html><head><meta charset=\"UTF-8\"></head><body>a &lt; b<br>c</body></html>"
            );
        }

        #[test]
        fn identity_by_email_or_key() {
            let (service, store) = fixtures::service(fixtures::store());
            service
                .send(&send_params(json!({
                    "to": "x@y", "subject": "s", "body": "b", "from": "ALIAS@work.com",
                })))
                .unwrap();
            service
                .send(&send_params(json!({
                    "to": "x@y", "subject": "s", "body": "b", "from": "id2",
                })))
                .unwrap();
            let composed = store.composed();
            assert_eq!(composed[0].identity.key, "id2");
            assert_eq!(composed[1].identity.key, "id2");
        }

        #[test]
        fn unknown_identity_warns_and_falls_back() {
            let (service, store) = fixtures::service(fixtures::store());
            let outcome = service
                .send(&send_params(json!({
                    "to": "x@y", "subject": "s", "body": "b", "from": "ghost@nowhere",
                })))
                .unwrap();
            assert_eq!(
                outcome.message,
                "Compose window opened (unknown identity: ghost@nowhere, using default)"
            );
            assert_eq!(store.composed()[0].identity.key, "id1");
        }

        #[test]
        fn missing_files_are_reported() {
            let dir = tempfile::tempdir().unwrap();
            let file = dir.path().join("notes.txt");
            std::fs::write(&file, "hello").unwrap();
            let file = file.to_str().unwrap().to_string();

            let (service, store) = fixtures::service(fixtures::store());
            let outcome = service
                .send(&send_params(json!({
                    "to": "x@y", "subject": "s", "body": "b",
                    "attachments": [file, "/no/such/file.pdf"],
                })))
                .unwrap();
            assert_eq!(
                outcome.message,
                "Compose window opened (failed to attach: /no/such/file.pdf)"
            );

            let attachments = &store.composed()[0].attachments;
            assert_eq!(attachments.len(), 1);
            assert_eq!(attachments[0].name, "notes.txt");
            assert_eq!(attachments[0].source, AttachmentSource::File(PathBuf::from(&file)));
        }

        #[test]
        fn html_document_is_kept() {
            let (service, store) = fixtures::service(fixtures::store());
            service
                .send(&send_params(json!({
                    "to": "x@y", "subject": "s", "isHtml": true,
                    "body": "<html>\n<body>caf\u{e9}</body></html>",
                })))
                .unwrap();
            assert_eq!(store.composed()[0].body, "<html><body>caf&#233;</body></html>");
        }

        #[test]
        fn no_identity_anywhere() {
            let store = MemoryStore::from_json(
                &json!({"accounts": [{"key": "a", "name": "A", "root": {"name": "R", "uri": "r"}}]})
                    .to_string(),
            )
            .unwrap();
            let (service, _) = fixtures::service(store);
            let err = service
                .send(&send_params(json!({"to": "x@y", "subject": "s", "body": "b"})))
                .unwrap_err();
            assert_eq!(err.to_string(), "No sender identity available");
        }
    }

    mod reply_tests {
        use super::*;

        #[tokio::test]
        async fn reply_threads_and_quotes() {
            let (service, store) = fixtures::service(fixtures::store());
            let outcome = service
                .reply(&reply_params(json!({
                    "messageId": "m1@example.com",
                    "folderPath": INBOX,
                    "body": "Thanks!",
                })))
                .await
                .unwrap();
            assert_eq!(outcome.message, "Reply window opened");

            let request = &store.composed()[0];
            assert_eq!(request.kind, ComposeKind::Reply);
            assert_eq!(request.to, "Alice <alice@example.com>");
            assert_eq!(request.cc, "");
            assert_eq!(request.subject, "Re: Quarterly report");
            assert_eq!(request.references.as_deref(), Some("<m1@example.com>"));
            assert_eq!(request.header("in-reply-to"), Some("<m1@example.com>"));
            assert_eq!(request.identity.key, "id1");

            assert!(request.body.starts_with(
                "<html><head><meta charset=\"UTF-8\"></head><body>Thanks!<br><br>On "
            ));
            assert!(request.body.contains(", Alice &lt;alice@example.com&gt; wrote:<br>"));
            assert!(request.body.ends_with(
                "<blockquote type=\"cite\">Numbers attached.<br>See you &lt;soon&gt; &amp; later</blockquote></body></html>"
            ));
        }

        #[tokio::test]
        async fn reply_all_removes_self_and_duplicates() {
            let (service, store) = fixtures::service(fixtures::store());
            service
                .reply(&reply_params(json!({
                    "messageId": "m1@example.com", "folderPath": INBOX,
                    "body": "ok", "replyAll": true,
                })))
                .await
                .unwrap();
            service
                .reply(&reply_params(json!({
                    "messageId": "m3@example.com", "folderPath": INBOX,
                    "body": "ok", "replyAll": true,
                })))
                .await
                .unwrap();

            let composed = store.composed();
            assert_eq!(
                composed[0].cc,
                "\"Doe, Bob\" <bob@example.com>, carol@example.com"
            );
            assert_eq!(composed[1].cc, "alice@example.com");
        }

        #[tokio::test]
        async fn reply_all_uses_the_sending_identity() {
            let (service, store) = fixtures::service(fixtures::store());
            service
                .reply(&reply_params(json!({
                    "messageId": "m1@example.com", "folderPath": INBOX,
                    "body": "ok", "replyAll": true, "from": "id2",
                })))
                .await
                .unwrap();
            let request = &store.composed()[0];
            assert_eq!(request.identity.key, "id2");
            assert!(request.cc.starts_with("me@work.com, "));
        }

        #[tokio::test]
        async fn explicit_recipients_override() {
            let (service, store) = fixtures::service(fixtures::store());
            service
                .reply(&reply_params(json!({
                    "messageId": "m1@example.com", "folderPath": INBOX,
                    "body": "ok", "replyAll": true,
                    "to": "boss@example.com", "cc": "team@example.com",
                })))
                .await
                .unwrap();
            let request = &store.composed()[0];
            assert_eq!(request.to, "boss@example.com");
            assert_eq!(request.cc, "team@example.com");
        }

        #[tokio::test]
        async fn unparseable_original_quotes_nothing() {
            let (service, store) = fixtures::service(fixtures::store());
            service
                .reply(&reply_params(json!({
                    "messageId": "m5@example.com", "folderPath": INBOX, "body": "hm",
                })))
                .await
                .unwrap();
            assert!(
                store.composed()[0]
                    .body
                    .contains("<blockquote type=\"cite\"></blockquote>")
            );
        }

        #[tokio::test]
        async fn missing_message_opens_nothing() {
            let (service, store) = fixtures::service(fixtures::store());
            let err = service
                .reply(&reply_params(json!({
                    "messageId": "nope", "folderPath": INBOX, "body": "x",
                })))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Message not found: nope");
            assert!(store.composed().is_empty());
        }

        #[test]
        fn reply_all_cc_from_plain_addresses() {
            assert_eq!(reply_all_cc("a@x.com, b@x.com", "a@x.com", "b@x.com"), "a@x.com");
            assert_eq!(reply_all_cc("", "", "me@x.com"), "");
            assert_eq!(reply_all_cc("A <a@x.com>", "a@X.com", ""), "A <a@x.com>");
        }

        #[test]
        fn prefixes_are_not_doubled() {
            assert_eq!(with_prefix("Hello", "Re:"), "Re: Hello");
            assert_eq!(with_prefix("Re: Hello", "Re:"), "Re: Hello");
            assert_eq!(with_prefix("RE: Hello", "Re:"), "RE: Hello");
            assert_eq!(with_prefix("Fwd: x", "Fwd:"), "Fwd: x");
            assert_eq!(with_prefix("", "Fwd:"), "Fwd: ");
            assert_eq!(with_prefix("\u{e9}t\u{e9}", "Re:"), "Re: \u{e9}t\u{e9}");
        }
    }

    mod forward_tests {
        use super::*;

        #[tokio::test]
        async fn forward_copies_attachments_and_headers() {
            let dir = tempfile::tempdir().unwrap();
            let extra = dir.path().join("extra.csv");
            std::fs::write(&extra, "a,b").unwrap();

            let (service, store) = fixtures::service(fixtures::store());
            let outcome = service
                .forward(&forward_params(json!({
                    "messageId": "m1@example.com",
                    "folderPath": INBOX,
                    "to": "dana@example.com",
                    "attachments": [extra.to_str().unwrap()],
                })))
                .await
                .unwrap();
            assert_eq!(outcome.message, "Forward window opened with 4 attachment(s)");

            let request = &store.composed()[0];
            assert_eq!(request.kind, ComposeKind::Forward);
            assert_eq!(request.to, "dana@example.com");
            assert_eq!(request.subject, "Fwd: Quarterly report");
            assert!(request.references.is_none());

            let sources: Vec<&AttachmentSource> =
                request.attachments.iter().map(|a| &a.source).collect();
            assert!(matches!(sources[0], AttachmentSource::Url(url) if url == "memory:attachment/0"));
            assert!(matches!(sources[3], AttachmentSource::File(_)));

            assert!(request.body.contains(
                "<body>-------- Forwarded Message --------<br>Subject: Quarterly report<br>Date: "
            ));
            assert!(request.body.contains(
                "From: Alice &lt;alice@example.com&gt;<br>To: me@work.com, \"Doe, Bob\" &lt;bob@example.com&gt;<br><br>Numbers attached.<br>"
            ));
        }

        #[tokio::test]
        async fn intro_precedes_forward_block() {
            let (service, store) = fixtures::service(fixtures::store());
            let outcome = service
                .forward(&forward_params(json!({
                    "messageId": "m2@example.com",
                    "folderPath": INBOX,
                    "to": "dana@example.com",
                    "body": "FYI",
                    "from": "nobody@nowhere",
                })))
                .await
                .unwrap();
            assert_eq!(
                outcome.message,
                "Forward window opened with 0 attachment(s) (unknown identity: nobody@nowhere, using default)"
            );

            let request = &store.composed()[0];
            assert_eq!(request.subject, "Fwd: Café meetup");
            assert!(request.body.contains("<body>FYI<br><br>-------- Forwarded Message"));
            assert!(request.body.ends_with("<br><br>Hi &amp; bye</body></html>"));
        }
    }
}
