//! Mail store gateway.
//!
//! The engine never touches account, folder or message storage directly.
//! Every capability it needs is expressed by the [`MailStore`] trait, which
//! is implemented by an adapter over the real store (or by [`MemoryStore`]
//! in tests and standalone deployments).
//!
//! [`MemoryStore`]: memory::MemoryStore

pub mod memory;
mod model;

use std::future::Future;

pub use model::{
    Account, AddressBook, AttachmentRef, AttachmentSource, Calendar, CalendarEvent,
    ComposeAttachment, ComposeKind, ComposeRequest, ContactCard, CopyListener, CopyStatus,
    EventTime, Folder, Identity, MessageHeader, MessageKey, MimeMessage, MimePart, ServerType,
};

/// Errors reported by a mail store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Requested object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Subsystem is not available (no calendar, no window, ...).
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Folder header index cannot be read.
    #[error("Header index unavailable for {0}")]
    IndexUnavailable(String),

    /// Fetching message or attachment content failed.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability surface over accounts, folders, messages and calendars.
///
/// Synchronous methods must not block for long: they are called from the
/// request task. The two content fetches are asynchronous because the
/// underlying store resolves them out of band.
pub trait MailStore: Send + Sync + 'static {
    /// All configured accounts, in store order.
    fn accounts(&self) -> Vec<Account>;

    /// The global default account, if one is configured.
    fn default_account(&self) -> Option<Account>;

    /// Looks up a folder by URI.
    fn folder(&self, uri: &str) -> Option<Folder>;

    /// Direct children of a folder, in store order.
    fn subfolders(&self, uri: &str) -> Vec<Folder>;

    /// The folder carrying the trash designation for an account.
    fn trash_folder(&self, account_key: &str) -> Option<Folder>;

    /// Asks a remotely synchronized folder to refresh its header index.
    ///
    /// Completion is not awaited; the index may still be stale afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh could not be started.
    fn refresh_folder(&self, uri: &str) -> Result<(), StoreError>;

    /// Snapshot of a folder's header index.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder has no readable index.
    fn headers(&self, uri: &str) -> Result<Vec<MessageHeader>, StoreError>;

    /// Sets the read flag of a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be updated.
    fn mark_read(&self, uri: &str, key: MessageKey, read: bool) -> Result<(), StoreError>;

    /// Sets the flagged state of a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be updated.
    fn mark_flagged(&self, uri: &str, key: MessageKey, flagged: bool) -> Result<(), StoreError>;

    /// Starts copying (or moving) messages between folders.
    ///
    /// The store reports completion through `listener`, exactly once.
    fn copy_messages(
        &self,
        source: &str,
        keys: &[MessageKey],
        destination: &str,
        is_move: bool,
        listener: CopyListener,
    );

    /// Fetches the parsed MIME structure of a message.
    ///
    /// Resolves to `None` when the message exists but cannot be parsed.
    fn fetch_mime(
        &self,
        uri: &str,
        key: MessageKey,
    ) -> impl Future<Output = Result<Option<MimeMessage>, StoreError>> + Send;

    /// Fetches the raw bytes of an attachment by its locator.
    fn fetch_attachment(&self, url: &str)
    -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;

    /// Opens the compose surface pre-filled with `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the compose surface cannot be opened.
    fn open_compose(&self, request: ComposeRequest) -> Result<(), StoreError>;

    /// All address books with their cards.
    fn address_books(&self) -> Vec<AddressBook>;

    /// All calendars.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the calendar subsystem is missing.
    fn calendars(&self) -> Result<Vec<Calendar>, StoreError>;

    /// Opens the event editor pre-filled with `event` for user review.
    ///
    /// # Errors
    ///
    /// Returns an error if the editor cannot be opened.
    fn open_event_editor(&self, event: CalendarEvent) -> Result<(), StoreError>;
}
