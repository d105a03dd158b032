//! Store model types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Protocol backing an account's incoming server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// IMAP (remotely synchronized).
    Imap,
    /// POP3 (downloaded into local storage).
    Pop3,
    /// NNTP newsgroups.
    Nntp,
    /// RSS feeds.
    Rss,
    /// Local folders only.
    #[default]
    #[serde(alias = "none")]
    Local,
}

impl ServerType {
    /// Wire name of the server type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Pop3 => "pop3",
            Self::Nntp => "nntp",
            Self::Rss => "rss",
            Self::Local => "none",
        }
    }

    /// Whether folders of this server mirror a remote mailbox.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Imap)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sender identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique identity key.
    pub key: String,
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
}

impl Identity {
    /// Whether `hint` names this identity, by key or by case-insensitive email.
    #[must_use]
    pub fn matches(&self, hint: &str) -> bool {
        self.key == hint
            || (!self.email.is_empty() && self.email.to_lowercase() == hint.to_lowercase())
    }

    /// Formats the identity as an address header value.
    #[must_use]
    pub fn address(&self) -> String {
        if self.full_name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.full_name, self.email)
        }
    }
}

/// A mail account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Unique account key.
    pub key: String,
    /// Display name of the incoming server.
    pub name: String,
    /// Incoming server protocol.
    pub server_type: ServerType,
    /// Identities in configuration order.
    pub identities: Vec<Identity>,
    /// Key of the default identity.
    pub default_identity: Option<String>,
    /// URI of the account's root folder.
    pub root_uri: String,
}

impl Account {
    /// The account's default identity, if any.
    #[must_use]
    pub fn default_identity(&self) -> Option<&Identity> {
        let key = self.default_identity.as_deref()?;
        self.identities.iter().find(|identity| identity.key == key)
    }
}

/// A mail folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Folder URI (unique).
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Key of the owning account.
    pub account_key: String,
    /// Protocol of the owning account.
    pub server_type: ServerType,
    /// Total number of messages.
    pub total_messages: u32,
    /// Number of unread messages.
    pub unread_messages: u32,
    /// Whether this folder is the account's trash.
    pub is_trash: bool,
}

/// Store-local key of a message within its folder.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageKey(pub u32);

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A header index record.
///
/// Address and subject fields exist in raw form (possibly RFC 2047 encoded)
/// and, when the store could decode them, in decoded form. The accessors
/// prefer the decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Store-local key.
    pub key: MessageKey,
    /// Message-ID without angle brackets.
    pub message_id: String,
    /// Raw subject.
    pub subject: String,
    /// Raw author.
    pub author: String,
    /// Raw recipients.
    pub recipients: String,
    /// Raw CC list.
    pub cc_list: String,
    /// Decoded subject.
    pub decoded_subject: Option<String>,
    /// Decoded author.
    pub decoded_author: Option<String>,
    /// Decoded recipients.
    pub decoded_recipients: Option<String>,
    /// Decoded CC list.
    pub decoded_cc_list: Option<String>,
    /// Timestamp in microseconds since the epoch, 0 when unknown.
    pub date_micros: i64,
    /// Read flag.
    pub is_read: bool,
    /// Flagged state.
    pub is_flagged: bool,
}

fn prefer_decoded<'a>(decoded: Option<&'a String>, raw: &'a str) -> &'a str {
    decoded.map(String::as_str).filter(|s| !s.is_empty()).unwrap_or(raw)
}

impl MessageHeader {
    /// Subject for display and matching.
    #[must_use]
    pub fn subject(&self) -> &str {
        prefer_decoded(self.decoded_subject.as_ref(), &self.subject)
    }

    /// Author for display and matching.
    #[must_use]
    pub fn author(&self) -> &str {
        prefer_decoded(self.decoded_author.as_ref(), &self.author)
    }

    /// Recipients for display and matching.
    #[must_use]
    pub fn recipients(&self) -> &str {
        prefer_decoded(self.decoded_recipients.as_ref(), &self.recipients)
    }

    /// CC list for display and matching.
    #[must_use]
    pub fn cc_list(&self) -> &str {
        prefer_decoded(self.decoded_cc_list.as_ref(), &self.cc_list)
    }

    /// Message date, if known.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        if self.date_micros == 0 {
            return None;
        }
        DateTime::from_timestamp_micros(self.date_micros)
    }

    /// Message date as ISO-8601 with millisecond precision.
    #[must_use]
    pub fn iso_date(&self) -> Option<String> {
        self.date()
            .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// One node of a parsed MIME tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimePart {
    /// Content type, possibly with parameters.
    #[serde(default)]
    pub content_type: String,
    /// Decoded body of a leaf part.
    #[serde(default)]
    pub body: Option<String>,
    /// Child parts of a multipart node.
    #[serde(default)]
    pub parts: Vec<MimePart>,
}

impl MimePart {
    /// Media type without parameters, lowercased.
    #[must_use]
    pub fn media_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    }
}

/// Attachment descriptor inside a MIME message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// File name.
    pub name: String,
    /// Content type.
    pub content_type: String,
    /// Size reported by the store, in bytes.
    pub size: u64,
    /// Locator used to fetch the bytes.
    pub url: String,
}

/// Parsed MIME structure of a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MimeMessage {
    /// Coerced plaintext of the whole message, when the store produced one.
    pub plaintext: Option<String>,
    /// Root of the part tree.
    pub root: MimePart,
    /// User-visible attachments.
    pub attachments: Vec<AttachmentRef>,
}

/// An address book card.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactCard {
    /// Card UID.
    pub uid: String,
    /// Display name.
    pub display_name: String,
    /// Primary email address.
    pub primary_email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Whether the card is a mailing list.
    pub is_mail_list: bool,
}

/// An address book.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBook {
    /// Directory name.
    pub name: String,
    /// Cards in directory order.
    #[serde(default)]
    pub cards: Vec<ContactCard>,
}

/// A calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    /// Calendar ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Provider type (storage, caldav, ics, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Whether items can be added.
    #[serde(default)]
    pub read_only: bool,
}

/// Start or end of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    /// A specific instant.
    Timed(DateTime<FixedOffset>),
    /// A floating calendar date.
    AllDay(NaiveDate),
}

/// A new event to be reviewed in the event editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Event title.
    pub title: String,
    /// Start.
    pub start: EventTime,
    /// End (exclusive for all-day events).
    pub end: EventTime,
    /// Location.
    pub location: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Target calendar ID.
    pub calendar_id: String,
}

/// Kind of compose request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeKind {
    /// A new message.
    New,
    /// A reply with quoted original.
    Reply,
    /// A forward with the original inline.
    Forward,
}

/// Where an attachment's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// A local file.
    File(PathBuf),
    /// A part of an existing message.
    Url(String),
}

/// An attachment on a compose request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeAttachment {
    /// File name shown to the recipient.
    pub name: String,
    /// Content type, when known.
    pub content_type: Option<String>,
    /// Content source.
    pub source: AttachmentSource,
}

/// Fully populated parameters for the compose surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeRequest {
    /// Kind of request.
    pub kind: ComposeKind,
    /// Sender identity.
    pub identity: Identity,
    /// To recipients.
    pub to: String,
    /// CC recipients.
    pub cc: String,
    /// BCC recipients.
    pub bcc: String,
    /// Subject.
    pub subject: String,
    /// HTML document body.
    pub body: String,
    /// `References` value.
    pub references: Option<String>,
    /// Additional headers.
    pub headers: Vec<(String, String)>,
    /// Attachments.
    pub attachments: Vec<ComposeAttachment>,
}

impl ComposeRequest {
    /// Looks up an additional header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Result of a copy or move operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    /// Completed.
    Success,
    /// Failed with a store status code.
    Failure(u32),
}

impl CopyStatus {
    /// Whether the copy succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One-shot completion handle for [`MailStore::copy_messages`].
///
/// Completing consumes the listener, so a copy resolves at most once.
/// A listener dropped without completing is seen as a failed copy.
///
/// [`MailStore::copy_messages`]: super::MailStore::copy_messages
#[derive(Debug)]
pub struct CopyListener {
    sender: oneshot::Sender<CopyStatus>,
}

impl CopyListener {
    /// Creates a listener and the receiver that observes its completion.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<CopyStatus>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Reports completion of the copy.
    pub fn complete(self, status: CopyStatus) {
        // Receiver gone means the caller stopped waiting.
        let _ = self.sender.send(status);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identity_matches_key_or_email() {
        let identity = Identity {
            key: "id1".into(),
            email: "Me@Example.com".into(),
            full_name: "Me".into(),
        };
        assert!(identity.matches("id1"));
        assert!(identity.matches("me@example.com"));
        assert!(!identity.matches("id2"));

        let unicode = Identity {
            key: "id3".into(),
            email: "ÉLODIE@Exemple.fr".into(),
            full_name: String::new(),
        };
        assert!(unicode.matches("élodie@exemple.fr"));
        assert!(!unicode.matches("elodie@exemple.fr"));
        assert_eq!(identity.address(), "Me <Me@Example.com>");
    }

    #[test]
    fn header_prefers_decoded_fields() {
        let header = MessageHeader {
            subject: "=?UTF-8?Q?caf=C3=A9?=".into(),
            decoded_subject: Some("café".into()),
            author: "raw".into(),
            decoded_author: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(header.subject(), "café");
        assert_eq!(header.author(), "raw");
    }

    #[test]
    fn header_iso_date() {
        let header = MessageHeader {
            date_micros: 1_709_294_400_000_000,
            ..Default::default()
        };
        assert_eq!(header.iso_date().unwrap(), "2024-03-01T12:00:00.000Z");
        assert_eq!(MessageHeader::default().iso_date(), None);
    }

    #[test]
    fn media_type_strips_parameters() {
        let part = MimePart {
            content_type: "Text/HTML; charset=utf-8".into(),
            ..Default::default()
        };
        assert_eq!(part.media_type(), "text/html");
    }

    #[tokio::test]
    async fn copy_listener_resolves_once() {
        let (listener, receiver) = CopyListener::channel();
        listener.complete(CopyStatus::Failure(5));
        assert_eq!(receiver.await.unwrap(), CopyStatus::Failure(5));
    }

    #[tokio::test]
    async fn dropped_copy_listener_is_observable() {
        let (listener, receiver) = CopyListener::channel();
        drop(listener);
        assert!(receiver.await.is_err());
    }
}
