//! Message state changes.
//!
//! Read and flagged state are applied first, in that order, then an
//! optional move or trash. Changes are not transactional: when the move
//! fails, earlier read/flag changes stay applied and are listed in the
//! report alongside the error.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{MailService, ServiceError};
use crate::store::{CopyListener, CopyStatus, MailStore};

/// Status reported when the store drops a copy without completing it.
const COPY_ABANDONED: u32 = 0x8000_4004;

/// Arguments of `updateMessage`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    /// Message-ID.
    pub message_id: String,
    /// Folder URI holding the message.
    pub folder_path: String,
    /// New read state.
    #[serde(default)]
    pub read: Option<bool>,
    /// New flagged state.
    #[serde(default)]
    pub flagged: Option<bool>,
    /// Destination folder URI.
    #[serde(default)]
    pub move_to: Option<String>,
    /// Move to the account's trash. Takes precedence over `move_to`.
    #[serde(default)]
    pub trash: Option<bool>,
}

/// Outcome of `updateMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UpdateReport {
    /// Every requested change was applied.
    Applied {
        /// Always `true`.
        success: bool,
        /// Applied changes in order.
        actions: Vec<String>,
    },
    /// The move failed after earlier changes were applied.
    MoveFailed {
        /// Failure description.
        error: String,
        /// Changes applied before the move.
        actions: Vec<String>,
    },
}

impl UpdateReport {
    const fn applied(actions: Vec<String>) -> Self {
        Self::Applied {
            success: true,
            actions,
        }
    }

    /// Applied actions, whatever the outcome.
    #[must_use]
    pub fn actions(&self) -> &[String] {
        match self {
            Self::Applied { actions, .. } | Self::MoveFailed { actions, .. } => actions,
        }
    }
}

impl<S: MailStore> MailService<S> {
    /// Applies read, flag and move/trash changes to a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be found, a state change is
    /// rejected by the store, or the destination (or trash) folder does not
    /// exist.
    pub async fn update_message(
        &self,
        params: &UpdateParams,
    ) -> Result<UpdateReport, ServiceError> {
        let (folder, header) = self.find_message(&params.message_id, &params.folder_path)?;
        let mut actions = Vec::new();

        if let Some(read) = params.read {
            self.store.mark_read(&folder.uri, header.key, read)?;
            actions.push(if read { "marked read" } else { "marked unread" }.to_string());
        }
        if let Some(flagged) = params.flagged {
            self.store.mark_flagged(&folder.uri, header.key, flagged)?;
            actions.push(if flagged { "flagged" } else { "unflagged" }.to_string());
        }

        let to_trash = params.trash.unwrap_or(false);
        let move_to = params.move_to.as_deref().filter(|uri| !uri.is_empty());
        if !to_trash && move_to.is_none() {
            if actions.is_empty() {
                actions.push("no changes requested".to_string());
            }
            return Ok(UpdateReport::applied(actions));
        }

        let destination = match move_to {
            Some(uri) if !to_trash => self
                .store
                .folder(uri)
                .ok_or_else(|| ServiceError::DestinationNotFound(uri.to_string()))?,
            _ => self
                .store
                .trash_folder(&folder.account_key)
                .ok_or(ServiceError::TrashNotFound)?,
        };

        if destination.uri == folder.uri {
            actions.push("already in destination folder".to_string());
            return Ok(UpdateReport::applied(actions));
        }

        let (listener, completion) = CopyListener::channel();
        self.store
            .copy_messages(&folder.uri, &[header.key], &destination.uri, true, listener);
        let status = completion
            .await
            .unwrap_or(CopyStatus::Failure(COPY_ABANDONED));

        match status {
            CopyStatus::Success => {
                info!(
                    message_id = %header.message_id,
                    from = %folder.uri,
                    to = %destination.uri,
                    "Message moved"
                );
                actions.push(if to_trash {
                    "trashed".to_string()
                } else {
                    format!("moved to {}", destination.name)
                });
                Ok(UpdateReport::applied(actions))
            }
            CopyStatus::Failure(code) => {
                warn!(message_id = %header.message_id, code, "Move failed");
                Ok(UpdateReport::MoveFailed {
                    error: format!("Move failed with status: {code}"),
                    actions,
                })
            }
        }
    }
}
