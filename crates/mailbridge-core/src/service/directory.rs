//! Account, folder and contact listings.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{CONTACT_SEARCH_LIMIT, MailService};
use crate::store::MailStore;

/// An identity in an account listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    /// Identity key.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Whether this is the account's default identity.
    pub is_default: bool,
}

/// An account listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    /// Account key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Server type (`imap`, `pop3`, `none`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Identities in configuration order.
    pub identities: Vec<IdentitySummary>,
}

/// Arguments of `listFolders`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListFoldersParams {
    /// Restrict the listing to one account.
    pub account_id: Option<String>,
}

/// A folder listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    /// Display name.
    pub name: String,
    /// Folder URI.
    pub path: String,
    /// Owning account key.
    pub account_id: String,
    /// Total messages.
    pub total_messages: u32,
    /// Unread messages.
    pub unread_messages: u32,
    /// Nesting depth below the account root, starting at 0.
    pub depth: usize,
}

/// Arguments of `searchContacts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactSearchParams {
    /// Text matched against email, names and display name.
    pub query: Option<String>,
}

/// A contact search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    /// Card UID.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Primary email.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Owning address book.
    pub address_book: String,
}

impl<S: MailStore> MailService<S> {
    /// Lists accounts with their identities.
    #[must_use]
    pub fn list_accounts(&self) -> Vec<AccountSummary> {
        self.store
            .accounts()
            .into_iter()
            .map(|account| {
                let default_key = account.default_identity.as_deref();
                let identities = account
                    .identities
                    .iter()
                    .map(|identity| IdentitySummary {
                        id: identity.key.clone(),
                        email: identity.email.clone(),
                        name: identity.full_name.clone(),
                        is_default: default_key == Some(identity.key.as_str()),
                    })
                    .collect();
                AccountSummary {
                    id: account.key,
                    name: account.name,
                    kind: account.server_type.to_string(),
                    identities,
                }
            })
            .collect()
    }

    /// Lists folders below each account root, parents before children.
    #[must_use]
    pub fn list_folders(&self, params: &ListFoldersParams) -> Vec<FolderSummary> {
        let filter = params.account_id.as_deref().filter(|id| !id.is_empty());
        let mut folders = Vec::new();

        for account in self.store.accounts() {
            if filter.is_some_and(|id| id != account.key) {
                continue;
            }
            let mut visited = HashSet::from([account.root_uri.clone()]);
            let mut stack: Vec<_> = self
                .store
                .subfolders(&account.root_uri)
                .into_iter()
                .rev()
                .map(|folder| (folder, 0usize))
                .collect();

            while let Some((folder, depth)) = stack.pop() {
                if !visited.insert(folder.uri.clone()) {
                    continue;
                }
                stack.extend(
                    self.store
                        .subfolders(&folder.uri)
                        .into_iter()
                        .rev()
                        .map(|child| (child, depth + 1)),
                );
                folders.push(FolderSummary {
                    name: folder.name,
                    path: folder.uri,
                    account_id: account.key.clone(),
                    total_messages: folder.total_messages,
                    unread_messages: folder.unread_messages,
                    depth,
                });
            }
        }
        folders
    }

    /// Searches address books, skipping mailing lists.
    #[must_use]
    pub fn search_contacts(&self, params: &ContactSearchParams) -> Vec<ContactSummary> {
        let query = params.query.as_deref().unwrap_or_default().to_lowercase();
        let mut results = Vec::new();

        'books: for book in self.store.address_books() {
            for card in &book.cards {
                if card.is_mail_list {
                    continue;
                }
                let hit = [
                    &card.primary_email,
                    &card.display_name,
                    &card.first_name,
                    &card.last_name,
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&query));
                if hit {
                    results.push(ContactSummary {
                        id: card.uid.clone(),
                        display_name: card.display_name.clone(),
                        email: card.primary_email.clone(),
                        first_name: card.first_name.clone(),
                        last_name: card.last_name.clone(),
                        address_book: book.name.clone(),
                    });
                    if results.len() >= CONTACT_SEARCH_LIMIT {
                        break 'books;
                    }
                }
            }
        }
        results
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::service::fixtures::{self, INBOX, SUBFOLDER};
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    #[test]
    fn accounts_with_identities() {
        let (service, _) = fixtures::service(fixtures::store());
        let accounts = service.list_accounts();
        assert_eq!(accounts.len(), 2);
        assert_eq!(
            serde_json::to_value(&accounts[0]).unwrap(),
            json!({
                "id": "account1",
                "name": "Work",
                "type": "imap",
                "identities": [
                    {"id": "id1", "email": "me@work.com", "name": "Me Myself", "isDefault": true},
                    {"id": "id2", "email": "alias@work.com", "name": "Team Alias", "isDefault": false},
                ]
            })
        );
        assert_eq!(accounts[1].kind, "none");
        assert!(accounts[1].identities.is_empty());
    }

    #[test]
    fn folders_in_tree_order() {
        let (service, _) = fixtures::service(fixtures::store());
        let folders = service.list_folders(&ListFoldersParams::default());
        let listing: Vec<(&str, usize)> = folders
            .iter()
            .map(|f| (f.name.as_str(), f.depth))
            .collect();
        assert_eq!(
            listing,
            vec![
                ("Inbox", 0),
                ("Projects", 1),
                ("Archive", 0),
                ("Trash", 0),
                ("Broken", 0),
                ("Notes", 0),
            ]
        );

        let inbox = &folders[0];
        assert_eq!(inbox.path, INBOX);
        assert_eq!(inbox.account_id, "account1");
        assert_eq!(inbox.total_messages, 4);
        assert_eq!(inbox.unread_messages, 2);
    }

    #[test]
    fn folders_filtered_by_account() {
        let (service, _) = fixtures::service(fixtures::store());
        let folders = service.list_folders(&ListFoldersParams {
            account_id: Some("account2".to_string()),
        });
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Notes");
    }

    #[test]
    fn folder_cycles_are_listed_once() {
        let store = fixtures::store();
        store.link_child(SUBFOLDER, INBOX);
        let (service, _) = fixtures::service(store);
        let folders = service.list_folders(&ListFoldersParams::default());
        assert_eq!(folders.len(), 6);
    }

    #[test]
    fn contacts_skip_lists() {
        let (service, _) = fixtures::service(fixtures::store());
        let hits = service.search_contacts(&ContactSearchParams {
            query: Some("SMITH".to_string()),
        });
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c4"]);
        assert_eq!(hits[1].address_book, "Collected Addresses");

        let hits = service.search_contacts(&ContactSearchParams {
            query: Some("team".to_string()),
        });
        assert!(hits.is_empty());
    }

    #[test]
    fn contact_results_are_capped() {
        let cards: Vec<_> = (0..80)
            .map(|i| json!({"uid": format!("u{i}"), "primaryEmail": format!("p{i}@x.com")}))
            .collect();
        let store = MemoryStore::from_json(
            &json!({"addressBooks": [{"name": "Big", "cards": cards}]}).to_string(),
        )
        .unwrap();
        let (service, _) = fixtures::service(store);
        let hits = service.search_contacts(&ContactSearchParams::default());
        assert_eq!(hits.len(), CONTACT_SEARCH_LIMIT);
    }
}
