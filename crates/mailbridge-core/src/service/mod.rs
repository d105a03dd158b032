//! Mail operations.
//!
//! [`MailService`] implements every operation exposed over JSON-RPC on top
//! of a [`MailStore`]. Operations report expected failures (missing folder,
//! missing message, bad date, ...) as [`ServiceError`] values, whose display
//! text is the `error` string returned to the caller.

pub mod calendar;
pub mod compose;
mod dates;
pub mod directory;
pub mod mutate;
pub mod reader;
pub mod search;

use std::path::PathBuf;
use std::sync::Arc;

use crate::store::{Folder, MailStore, MessageHeader, StoreError};

pub use calendar::{CalendarSummary, CreateEventParams, EventOutcome};
pub use compose::{ComposeOutcome, ForwardParams, ReplyParams, SendParams};
pub use directory::{
    AccountSummary, ContactSearchParams, ContactSummary, FolderSummary, IdentitySummary,
    ListFoldersParams,
};
pub use mutate::{UpdateParams, UpdateReport};
pub use reader::{AttachmentInfo, GetMessageParams, MessageDetail};
pub use search::{MessageSummary, SearchParams};

/// Number of search results returned when the caller does not ask for a count.
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// Upper bound on the number of search results returned.
pub const MAX_SEARCH_RESULTS: usize = 200;

/// Upper bound on the number of headers scanned by one search.
pub const SEARCH_COLLECTION_CAP: usize = 1000;

/// Largest attachment that will be saved to disk.
pub const MAX_ATTACHMENT_SIZE: u64 = 50 * 1024 * 1024;

/// Upper bound on contact search results.
pub const CONTACT_SEARCH_LIMIT: usize = 50;

/// Operation-level failures, reported to callers as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Folder URI does not resolve.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Folder has no readable header index.
    #[error("Could not access folder database")]
    FolderIndex,

    /// No header in the folder carries the message-ID.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Store could not parse the message.
    #[error("Could not parse message")]
    Unparseable,

    /// No account provides a sender identity.
    #[error("No sender identity available")]
    NoIdentity,

    /// Account has no folder designated as trash.
    #[error("Trash folder not found for this account")]
    TrashNotFound,

    /// Move destination does not resolve.
    #[error("Destination folder not found: {0}")]
    DestinationNotFound(String),

    /// Calendar subsystem is missing.
    #[error("Calendar not available")]
    CalendarUnavailable,

    /// A date argument could not be parsed.
    #[error("Invalid {field}: {value}")]
    InvalidDate {
        /// Argument name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Requested calendar does not exist.
    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    /// Requested calendar does not accept new items.
    #[error("Calendar is read-only: {0}")]
    CalendarReadOnly(String),

    /// No calendar accepts new items.
    #[error("No writable calendar found")]
    NoWritableCalendar,

    /// Underlying store failure.
    #[error("{0}")]
    Store(#[from] StoreError),
}

/// Runtime settings for the mail operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Root directory for saved attachments.
    pub scratch_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("mailbridge"),
        }
    }
}

/// Mail operations over a store.
#[derive(Debug)]
pub struct MailService<S> {
    store: Arc<S>,
    settings: ServiceSettings,
}

impl<S> Clone for MailService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
        }
    }
}

impl<S: MailStore> MailService<S> {
    /// Creates a service over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, settings: ServiceSettings) -> Self {
        Self { store, settings }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Service settings.
    #[must_use]
    pub const fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Resolves a message by folder URI and message-ID.
    ///
    /// Scans the folder's header index for the first header with a matching ID.
    pub(crate) fn find_message(
        &self,
        message_id: &str,
        folder_path: &str,
    ) -> Result<(Folder, MessageHeader), ServiceError> {
        let folder = self
            .store
            .folder(folder_path)
            .ok_or_else(|| ServiceError::FolderNotFound(folder_path.to_string()))?;
        let headers = self
            .store
            .headers(&folder.uri)
            .map_err(|_| ServiceError::FolderIndex)?;
        let header = headers
            .into_iter()
            .find(|header| header.message_id == message_id)
            .ok_or_else(|| ServiceError::MessageNotFound(message_id.to_string()))?;
        Ok((folder, header))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use super::{MailService, ServiceSettings};
    use crate::store::memory::MemoryStore;

    pub const INBOX: &str = "imap://me@work.com/INBOX";
    pub const SUBFOLDER: &str = "imap://me@work.com/INBOX/Projects";
    pub const ARCHIVE: &str = "imap://me@work.com/Archive";
    pub const TRASH: &str = "imap://me@work.com/Trash";
    pub const BROKEN: &str = "imap://me@work.com/Broken";
    pub const NOTES: &str = "mailbox://nobody@Local%20Folders/Notes";

    pub fn store() -> MemoryStore {
        MemoryStore::from_json(include_str!("../../tests/fixtures/store.json"))
            .unwrap_or_else(|e| panic!("fixture store: {e}"))
            .with_recording()
    }

    pub fn service(store: MemoryStore) -> (MailService<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(store);
        let settings = ServiceSettings {
            scratch_dir: std::env::temp_dir().join("mailbridge-tests"),
        };
        (MailService::new(Arc::clone(&store), settings), store)
    }
}
