//! Message retrieval.
//!
//! Resolves one message to its header metadata, a readable body and an
//! attachment manifest, optionally saving attachments under the scratch
//! directory.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{MAX_ATTACHMENT_SIZE, MailService, ServiceError};
use crate::store::{AttachmentRef, MailStore, MimeMessage, MimePart, StoreError};
use crate::text;

/// Body text used when no part yields any text.
pub const BODY_PLACEHOLDER: &str = "(Could not extract body text)";

/// Arguments of `getMessage`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessageParams {
    /// Message-ID from a search result.
    pub message_id: String,
    /// Folder URI from a search result.
    pub folder_path: String,
    /// Save attachments to disk.
    #[serde(default)]
    pub save_attachments: Option<bool>,
}

/// Attachment metadata, with the saved path or failure when saving was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    /// File name.
    pub name: String,
    /// Content type.
    pub content_type: String,
    /// Reported size, or the number of bytes written once saved.
    pub size: u64,
    /// Where the attachment was saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Why the attachment was not saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttachmentInfo {
    fn new(attachment: &AttachmentRef) -> Self {
        Self {
            name: attachment.name.clone(),
            content_type: attachment.content_type.clone(),
            size: attachment.size,
            file_path: None,
            error: None,
        }
    }
}

/// A fully resolved message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    /// Message-ID.
    pub id: String,
    /// Decoded subject.
    pub subject: String,
    /// Decoded author.
    pub author: String,
    /// Decoded recipients.
    pub recipients: String,
    /// Decoded CC list.
    pub cc_list: String,
    /// ISO-8601 date, if known.
    pub date: Option<String>,
    /// Read flag.
    pub read: bool,
    /// Flagged state.
    pub flagged: bool,
    /// Body text.
    pub body: String,
    /// Whether the body was converted from HTML.
    pub body_is_html: bool,
    /// Attachments in message order.
    pub attachments: Vec<AttachmentInfo>,
}

fn find_part<'a>(part: &'a MimePart, media_type: &str) -> Option<&'a str> {
    if part.media_type() == media_type
        && let Some(body) = part.body.as_deref().filter(|body| !body.is_empty())
    {
        return Some(body);
    }
    part.parts
        .iter()
        .find_map(|child| find_part(child, media_type))
}

/// Extracts readable text from a message.
///
/// Prefers the store's plaintext rendering, then the first `text/plain`
/// part, then the first `text/html` part reduced to text. The tree is
/// searched once per media type, so a `text/plain` part anywhere wins over
/// a `text/html` part that comes earlier in depth-first order. The flag
/// reports whether the text came from HTML.
pub(crate) fn extract_body(mime: &MimeMessage) -> (String, bool) {
    if let Some(plaintext) = mime.plaintext.as_deref().filter(|text| !text.is_empty()) {
        return (plaintext.to_string(), false);
    }
    if let Some(plain) = find_part(&mime.root, "text/plain") {
        return (plain.to_string(), false);
    }
    if let Some(html) = find_part(&mime.root, "text/html") {
        return (text::html_to_text(html), true);
    }
    (String::new(), false)
}

/// Directory name for a message's saved attachments.
fn scratch_name(message_id: &str) -> String {
    let name: String = message_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "_".repeat(name.len().max(1))
    } else {
        name
    }
}

/// Last path component of an attachment name.
fn file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|leaf| leaf.to_str())
        .filter(|leaf| !leaf.is_empty())
        .unwrap_or("attachment")
        .to_string()
}

/// Creates a new file named `name` in `dir`, appending `-1`, `-2`, ... to the
/// stem until the name is unused.
async fn create_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    for attempt in 0u32..10_000 {
        let candidate = match (attempt, extension) {
            (0, _) => name.to_string(),
            (n, Some(ext)) => format!("{stem}-{n}.{ext}"),
            (n, None) => format!("{stem}-{n}"),
        };
        let path = dir.join(candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no unused file name for {name}"),
    ))
}

impl<S: MailStore> MailService<S> {
    /// Reads a message with its body and attachment manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder or message cannot be found or the
    /// message cannot be parsed. Attachment failures are reported per item.
    pub async fn get_message(
        &self,
        params: &GetMessageParams,
    ) -> Result<MessageDetail, ServiceError> {
        let (folder, header) = self.find_message(&params.message_id, &params.folder_path)?;
        let mime = self
            .store
            .fetch_mime(&folder.uri, header.key)
            .await?
            .ok_or(ServiceError::Unparseable)?;

        let (mut body, body_is_html) = extract_body(&mime);
        if body.is_empty() {
            body = BODY_PLACEHOLDER.to_string();
        }

        let attachments = if params.save_attachments.unwrap_or(false) {
            let dir = self
                .settings
                .scratch_dir
                .join(scratch_name(&params.message_id));
            self.save_attachments(&dir, &mime.attachments).await
        } else {
            mime.attachments.iter().map(AttachmentInfo::new).collect()
        };

        debug!(
            message_id = %header.message_id,
            folder = %folder.uri,
            attachments = attachments.len(),
            "Message read"
        );

        Ok(MessageDetail {
            id: header.message_id.clone(),
            subject: header.subject().to_string(),
            author: header.author().to_string(),
            recipients: header.recipients().to_string(),
            cc_list: header.cc_list().to_string(),
            date: header.iso_date(),
            read: header.is_read,
            flagged: header.is_flagged,
            body,
            body_is_html,
            attachments,
        })
    }

    async fn save_attachments(
        &self,
        dir: &Path,
        attachments: &[AttachmentRef],
    ) -> Vec<AttachmentInfo> {
        let mut infos = Vec::with_capacity(attachments.len());
        let mut saved = 0usize;

        for attachment in attachments {
            let mut info = AttachmentInfo::new(attachment);
            if attachment.size > MAX_ATTACHMENT_SIZE {
                info.error = Some("Exceeds 50MB size limit".to_string());
                infos.push(info);
                continue;
            }

            match self.save_attachment(dir, attachment).await {
                Ok((path, size)) => {
                    info.file_path = Some(path.display().to_string());
                    info.size = size;
                    saved += 1;
                }
                Err(e) => {
                    warn!(attachment = %attachment.name, error = %e, "Failed to save attachment");
                    info.error = Some(format!("Save failed: {e}"));
                }
            }
            infos.push(info);
        }

        if saved > 0 {
            info!("Saved {} attachment(s) to {:?}", saved, dir);
        }
        infos
    }

    async fn save_attachment(
        &self,
        dir: &Path,
        attachment: &AttachmentRef,
    ) -> Result<(PathBuf, u64), StoreError> {
        let bytes = self.store.fetch_attachment(&attachment.url).await?;

        fs::create_dir_all(dir).await?;
        let (path, mut file) = create_unique(dir, &file_name(&attachment.name)).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok((path, u64::try_from(bytes.len()).unwrap_or(u64::MAX)))
    }
}
