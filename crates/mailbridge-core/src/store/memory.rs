//! In-memory mail store.
//!
//! [`MemoryStore`] implements [`MailStore`] over a JSON snapshot of
//! accounts, folder trees, messages, address books and calendars. It backs
//! the standalone server and doubles as the fake gateway in tests. For
//! the latter it supports fault injection and, once built
//! [`with_recording`](MemoryStore::with_recording), logs its side effects.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    Account, AddressBook, AttachmentRef, Calendar, CalendarEvent, ComposeRequest, CopyListener,
    CopyStatus, Folder, Identity, MailStore, MessageHeader, MessageKey, MimeMessage, MimePart,
    ServerType, StoreError,
};
use crate::{Error, Result};

/// Generic failure status reported for copies the store cannot perform.
const STATUS_FAILURE: u32 = 0x8000_4005;

/// Root of a store snapshot document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Accounts in order.
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
    /// Key of the global default account.
    #[serde(default)]
    pub default_account: Option<String>,
    /// Address books.
    #[serde(default)]
    pub address_books: Vec<AddressBook>,
    /// Calendars; absent means the calendar subsystem is unavailable.
    #[serde(default)]
    pub calendars: Option<Vec<Calendar>>,
}

/// An account in a snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    /// Account key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Incoming server protocol.
    #[serde(default)]
    pub server_type: ServerType,
    /// Identities.
    #[serde(default)]
    pub identities: Vec<Identity>,
    /// Key of the default identity.
    #[serde(default)]
    pub default_identity: Option<String>,
    /// Root folder.
    pub root: FolderSnapshot,
}

/// A folder in a snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSnapshot {
    /// Display name.
    pub name: String,
    /// Unique URI.
    pub uri: String,
    /// Trash designation.
    #[serde(default)]
    pub trash: bool,
    /// Simulates a folder whose header index cannot be opened.
    #[serde(default)]
    pub unreadable: bool,
    /// Messages.
    #[serde(default)]
    pub messages: Vec<MessageSnapshot>,
    /// Child folders.
    #[serde(default)]
    pub children: Vec<FolderSnapshot>,
}

/// A message in a snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageSnapshot {
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
    /// RFC 3339 date.
    pub date: Option<DateTime<FixedOffset>>,
    /// Read flag.
    pub read: bool,
    /// Flagged state.
    pub flagged: bool,
    /// Body structure.
    pub body: BodySnapshot,
    /// Attachments.
    pub attachments: Vec<AttachmentSnapshot>,
}

/// Body structure of a snapshot message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodySnapshot {
    /// Coerced plaintext rendering.
    pub plaintext: Option<String>,
    /// Part tree.
    pub part: MimePart,
    /// Simulates a message the store cannot parse.
    pub unparseable: bool,
}

/// An attachment of a snapshot message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSnapshot {
    /// File name.
    pub name: String,
    /// Content type.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Reported size; defaults to the content length.
    #[serde(default)]
    pub size: Option<u64>,
    /// Base64 content; absent means fetching fails.
    #[serde(default)]
    pub content: Option<String>,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// A copy operation observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    /// Source folder URI.
    pub source: String,
    /// Destination folder URI.
    pub destination: String,
    /// Copied message keys.
    pub keys: Vec<MessageKey>,
    /// Whether the source messages were removed.
    pub is_move: bool,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    header: MessageHeader,
    mime: Option<MimeMessage>,
}

#[derive(Debug)]
struct FolderState {
    uri: String,
    name: String,
    account_key: String,
    server_type: ServerType,
    is_trash: bool,
    unreadable: bool,
    children: Vec<String>,
    messages: Vec<StoredMessage>,
}

impl FolderState {
    fn to_folder(&self) -> Folder {
        let total = self.messages.len();
        let unread = self.messages.iter().filter(|m| !m.header.is_read).count();
        Folder {
            uri: self.uri.clone(),
            name: self.name.clone(),
            account_key: self.account_key.clone(),
            server_type: self.server_type,
            total_messages: u32::try_from(total).unwrap_or(u32::MAX),
            unread_messages: u32::try_from(unread).unwrap_or(u32::MAX),
            is_trash: self.is_trash,
        }
    }

    fn message_mut(&mut self, key: MessageKey) -> Option<&mut StoredMessage> {
        self.messages.iter_mut().find(|m| m.header.key == key)
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<Account>,
    default_account: Option<String>,
    folders: HashMap<String, FolderState>,
    folder_order: Vec<String>,
    attachments: HashMap<String, Option<Vec<u8>>>,
    address_books: Vec<AddressBook>,
    calendars: Option<Vec<Calendar>>,
    next_key: u32,
    failing_refresh: HashSet<String>,
    copy_failure: Option<u32>,
    abandon_copies: bool,
    record_effects: bool,
    composed: Vec<ComposeRequest>,
    events: Vec<CalendarEvent>,
    copies: Vec<CopyRecord>,
    refreshes: Vec<String>,
}

impl State {
    fn allocate_key(&mut self) -> MessageKey {
        self.next_key += 1;
        MessageKey(self.next_key)
    }

    fn insert_folder(
        &mut self,
        account: &Account,
        snapshot: FolderSnapshot,
    ) -> Result<String> {
        if self.folders.contains_key(&snapshot.uri) {
            return Err(Error::Snapshot(format!(
                "duplicate folder URI: {}",
                snapshot.uri
            )));
        }

        let mut messages = Vec::with_capacity(snapshot.messages.len());
        for message in snapshot.messages {
            messages.push(self.insert_message(message)?);
        }

        let uri = snapshot.uri;
        self.folder_order.push(uri.clone());
        self.folders.insert(
            uri.clone(),
            FolderState {
                uri: uri.clone(),
                name: snapshot.name,
                account_key: account.key.clone(),
                server_type: account.server_type,
                is_trash: snapshot.trash,
                unreadable: snapshot.unreadable,
                children: Vec::new(),
                messages,
            },
        );

        let mut children = Vec::with_capacity(snapshot.children.len());
        for child in snapshot.children {
            children.push(self.insert_folder(account, child)?);
        }
        if let Some(folder) = self.folders.get_mut(&uri) {
            folder.children = children;
        }

        Ok(uri)
    }

    fn insert_message(&mut self, snapshot: MessageSnapshot) -> Result<StoredMessage> {
        let key = self.allocate_key();

        let mut attachments = Vec::with_capacity(snapshot.attachments.len());
        for attachment in snapshot.attachments {
            let content = attachment
                .content
                .as_deref()
                .map(|encoded| STANDARD.decode(encoded))
                .transpose()
                .map_err(|e| {
                    Error::Snapshot(format!("attachment {} is not base64: {e}", attachment.name))
                })?;
            let size = attachment
                .size
                .or_else(|| content.as_ref().map(|bytes| bytes.len() as u64))
                .unwrap_or(0);
            let url = format!("memory:attachment/{}", self.attachments.len());
            self.attachments.insert(url.clone(), content);
            attachments.push(AttachmentRef {
                name: attachment.name,
                content_type: attachment.content_type,
                size,
                url,
            });
        }

        let mime = (!snapshot.body.unparseable).then(|| MimeMessage {
            plaintext: snapshot.body.plaintext,
            root: snapshot.body.part,
            attachments,
        });

        Ok(StoredMessage {
            header: MessageHeader {
                key,
                message_id: snapshot.message_id,
                subject: snapshot.subject,
                author: snapshot.author,
                recipients: snapshot.recipients,
                cc_list: snapshot.cc_list,
                decoded_subject: snapshot.decoded_subject,
                decoded_author: snapshot.decoded_author,
                decoded_recipients: snapshot.decoded_recipients,
                decoded_cc_list: snapshot.decoded_cc_list,
                date_micros: snapshot.date.map_or(0, |date| date.timestamp_micros()),
                is_read: snapshot.read,
                is_flagged: snapshot.flagged,
            },
            mime,
        })
    }

    fn move_messages(
        &mut self,
        source: &str,
        keys: &[MessageKey],
        destination: &str,
        is_move: bool,
    ) -> CopyStatus {
        if !self.folders.contains_key(destination) {
            return CopyStatus::Failure(STATUS_FAILURE);
        }
        let Some(source_folder) = self.folders.get_mut(source) else {
            return CopyStatus::Failure(STATUS_FAILURE);
        };

        let mut moved = Vec::new();
        for key in keys {
            let Some(index) = source_folder
                .messages
                .iter()
                .position(|m| m.header.key == *key)
            else {
                return CopyStatus::Failure(STATUS_FAILURE);
            };
            if is_move {
                moved.push(source_folder.messages.remove(index));
            } else {
                moved.push(source_folder.messages[index].clone());
            }
        }

        for mut message in moved {
            message.header.key = self.allocate_key();
            if let Some(target) = self.folders.get_mut(destination) {
                target.messages.push(message);
            }
        }
        CopyStatus::Success
    }
}

/// Mail store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if folder URIs collide or attachment content is not base64.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let mut state = State {
            default_account: snapshot.default_account,
            address_books: snapshot.address_books,
            calendars: snapshot.calendars,
            ..State::default()
        };

        for account_snapshot in snapshot.accounts {
            let account = Account {
                key: account_snapshot.key,
                name: account_snapshot.name,
                server_type: account_snapshot.server_type,
                identities: account_snapshot.identities,
                default_identity: account_snapshot.default_identity,
                root_uri: account_snapshot.root.uri.clone(),
            };
            state.insert_folder(&account, account_snapshot.root)?;
            state.accounts.push(account);
        }

        debug!(
            accounts = state.accounts.len(),
            folders = state.folders.len(),
            "Loaded store snapshot"
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Parses a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the snapshot is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    /// Loads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let store = Self::from_json(&contents)?;
        info!("Loaded mail store from {:?}", path);
        Ok(store)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps a log of side effects (compose windows, event editors, copies
    /// and refreshes) for later inspection.
    ///
    /// Off by default.
    #[must_use]
    pub fn with_recording(mut self) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .record_effects = true;
        self
    }

    /// Adds `child` to the children of `parent`, without any validation.
    ///
    /// Lets callers build folder graphs a real store should never produce.
    pub fn link_child(&self, parent: &str, child: &str) {
        if let Some(folder) = self.write().folders.get_mut(parent) {
            folder.children.push(child.to_string());
        }
    }

    /// Makes refreshes of `uri` fail.
    pub fn fail_refresh(&self, uri: &str) {
        self.write().failing_refresh.insert(uri.to_string());
    }

    /// Makes every subsequent copy complete with `status` (or succeed when `None`).
    pub fn fail_copies(&self, status: Option<u32>) {
        self.write().copy_failure = status;
    }

    /// Makes every subsequent copy drop its listener without completing it.
    pub fn abandon_copies(&self) {
        self.write().abandon_copies = true;
    }

    /// Looks up a header by message-ID within a folder.
    #[must_use]
    pub fn message(&self, uri: &str, message_id: &str) -> Option<MessageHeader> {
        self.read().folders.get(uri).and_then(|folder| {
            folder
                .messages
                .iter()
                .find(|m| m.header.message_id == message_id)
                .map(|m| m.header.clone())
        })
    }

    /// Compose requests opened so far, when recording.
    #[must_use]
    pub fn composed(&self) -> Vec<ComposeRequest> {
        self.read().composed.clone()
    }

    /// Event editors opened so far, when recording.
    #[must_use]
    pub fn opened_events(&self) -> Vec<CalendarEvent> {
        self.read().events.clone()
    }

    /// Copy operations started so far, when recording.
    #[must_use]
    pub fn copies(&self) -> Vec<CopyRecord> {
        self.read().copies.clone()
    }

    /// Folder refreshes requested so far, when recording.
    #[must_use]
    pub fn refreshes(&self) -> Vec<String> {
        self.read().refreshes.clone()
    }
}

impl MailStore for MemoryStore {
    fn accounts(&self) -> Vec<Account> {
        self.read().accounts.clone()
    }

    fn default_account(&self) -> Option<Account> {
        let state = self.read();
        state
            .default_account
            .as_deref()
            .and_then(|key| state.accounts.iter().find(|a| a.key == key))
            .or_else(|| state.accounts.first())
            .cloned()
    }

    fn folder(&self, uri: &str) -> Option<Folder> {
        self.read().folders.get(uri).map(FolderState::to_folder)
    }

    fn subfolders(&self, uri: &str) -> Vec<Folder> {
        let state = self.read();
        state
            .folders
            .get(uri)
            .map(|folder| {
                folder
                    .children
                    .iter()
                    .filter_map(|child| state.folders.get(child))
                    .map(FolderState::to_folder)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn trash_folder(&self, account_key: &str) -> Option<Folder> {
        let state = self.read();
        state
            .folder_order
            .iter()
            .filter_map(|uri| state.folders.get(uri))
            .find(|folder| folder.account_key == account_key && folder.is_trash)
            .map(FolderState::to_folder)
    }

    fn refresh_folder(&self, uri: &str) -> std::result::Result<(), StoreError> {
        let mut state = self.write();
        if state.record_effects {
            state.refreshes.push(uri.to_string());
        }
        if state.failing_refresh.contains(uri) {
            return Err(StoreError::Unavailable(format!("cannot refresh {uri}")));
        }
        Ok(())
    }

    fn headers(&self, uri: &str) -> std::result::Result<Vec<MessageHeader>, StoreError> {
        let state = self.read();
        let folder = state
            .folders
            .get(uri)
            .ok_or_else(|| StoreError::NotFound(uri.to_string()))?;
        if folder.unreadable {
            return Err(StoreError::IndexUnavailable(uri.to_string()));
        }
        Ok(folder.messages.iter().map(|m| m.header.clone()).collect())
    }

    fn mark_read(
        &self,
        uri: &str,
        key: MessageKey,
        read: bool,
    ) -> std::result::Result<(), StoreError> {
        let mut state = self.write();
        let message = state
            .folders
            .get_mut(uri)
            .and_then(|folder| folder.message_mut(key))
            .ok_or_else(|| StoreError::NotFound(format!("{uri}#{key}")))?;
        message.header.is_read = read;
        Ok(())
    }

    fn mark_flagged(
        &self,
        uri: &str,
        key: MessageKey,
        flagged: bool,
    ) -> std::result::Result<(), StoreError> {
        let mut state = self.write();
        let message = state
            .folders
            .get_mut(uri)
            .and_then(|folder| folder.message_mut(key))
            .ok_or_else(|| StoreError::NotFound(format!("{uri}#{key}")))?;
        message.header.is_flagged = flagged;
        Ok(())
    }

    fn copy_messages(
        &self,
        source: &str,
        keys: &[MessageKey],
        destination: &str,
        is_move: bool,
        listener: CopyListener,
    ) {
        let status = {
            let mut state = self.write();
            if state.record_effects {
                state.copies.push(CopyRecord {
                    source: source.to_string(),
                    destination: destination.to_string(),
                    keys: keys.to_vec(),
                    is_move,
                });
            }
            if state.abandon_copies {
                debug!(source, destination, "Copy abandoned");
                return;
            }
            match state.copy_failure {
                Some(code) => CopyStatus::Failure(code),
                None => state.move_messages(source, keys, destination, is_move),
            }
        };
        debug!(source, destination, ?status, "Copy finished");
        listener.complete(status);
    }

    fn fetch_mime(
        &self,
        uri: &str,
        key: MessageKey,
    ) -> impl Future<Output = std::result::Result<Option<MimeMessage>, StoreError>> + Send {
        let result = self
            .read()
            .folders
            .get(uri)
            .and_then(|folder| folder.messages.iter().find(|m| m.header.key == key))
            .map(|message| message.mime.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{uri}#{key}")));
        async move {
            tokio::task::yield_now().await;
            result
        }
    }

    fn fetch_attachment(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<Vec<u8>, StoreError>> + Send {
        let result = match self.read().attachments.get(url) {
            Some(Some(bytes)) => Ok(bytes.clone()),
            Some(None) => Err(StoreError::Fetch(format!("no content for {url}"))),
            None => Err(StoreError::NotFound(url.to_string())),
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
    }

    fn open_compose(&self, request: ComposeRequest) -> std::result::Result<(), StoreError> {
        info!(kind = ?request.kind, subject = %request.subject, "Opening compose window");
        let mut state = self.write();
        if state.record_effects {
            state.composed.push(request);
        }
        Ok(())
    }

    fn address_books(&self) -> Vec<AddressBook> {
        self.read().address_books.clone()
    }

    fn calendars(&self) -> std::result::Result<Vec<Calendar>, StoreError> {
        self.read()
            .calendars
            .clone()
            .ok_or_else(|| StoreError::Unavailable("calendar".to_string()))
    }

    fn open_event_editor(&self, event: CalendarEvent) -> std::result::Result<(), StoreError> {
        info!(title = %event.title, calendar = %event.calendar_id, "Opening event editor");
        let mut state = self.write();
        if state.record_effects {
            state.events.push(event);
        }
        Ok(())
    }
}
