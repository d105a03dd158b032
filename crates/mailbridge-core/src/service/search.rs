//! Message search.
//!
//! Walks every account's folder tree depth-first, matching headers against
//! a text query and a date window. The walk is bounded by
//! [`SEARCH_COLLECTION_CAP`] headers scanned in total; the requested result
//! count is applied only after the bounded scan has been sorted.

use std::collections::HashSet;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::dates::ParsedDate;
use super::{
    DEFAULT_MAX_RESULTS, MAX_SEARCH_RESULTS, MailService, SEARCH_COLLECTION_CAP,
};
use crate::store::{Folder, MailStore, MessageHeader};

/// Arguments of `searchMessages`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    /// Text matched against subject, author, recipients and CC. Empty matches all.
    pub query: Option<String>,
    /// Inclusive lower bound on the message date.
    pub start_date: Option<String>,
    /// Upper bound on the message date. A bare date includes that whole day.
    pub end_date: Option<String>,
    /// Requested number of results, as a number or numeric string.
    pub max_results: Option<Value>,
    /// `asc` for oldest first; anything else sorts newest first.
    pub sort_order: Option<String>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
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
    /// Display name of the owning folder.
    pub folder: String,
    /// URI of the owning folder.
    pub folder_path: String,
    /// Read flag.
    pub read: bool,
    /// Flagged state.
    pub flagged: bool,
}

impl MessageSummary {
    fn new(header: &MessageHeader, folder: &Folder) -> Self {
        Self {
            id: header.message_id.clone(),
            subject: header.subject().to_string(),
            author: header.author().to_string(),
            recipients: header.recipients().to_string(),
            cc_list: header.cc_list().to_string(),
            date: header.iso_date(),
            folder: folder.name.clone(),
            folder_path: folder.uri.clone(),
            read: header.is_read,
            flagged: header.is_flagged,
        }
    }
}

/// Date window in microseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DateWindow {
    start: Option<i64>,
    end: Option<i64>,
    end_exclusive: bool,
}

impl DateWindow {
    fn new(start: Option<&str>, end: Option<&str>) -> Self {
        let start = start
            .and_then(ParsedDate::parse)
            .map(|date| date.to_utc().timestamp_micros());

        let mut window = Self {
            start,
            ..Self::default()
        };
        match end.and_then(ParsedDate::parse) {
            Some(date @ ParsedDate::Date(_)) => {
                let next_day = date.to_utc() + Duration::days(1);
                window.end = Some(next_day.timestamp_micros());
                window.end_exclusive = true;
            }
            Some(date) => window.end = Some(date.to_utc().timestamp_micros()),
            None => {}
        }
        window
    }

    fn contains(&self, micros: i64) -> bool {
        if self.start.is_some_and(|start| micros < start) {
            return false;
        }
        match self.end {
            Some(end) if self.end_exclusive => micros < end,
            Some(end) => micros <= end,
            None => true,
        }
    }
}

/// Resolves the requested result count.
///
/// Positive numbers (or numeric strings) are floored and clamped to
/// [`MAX_SEARCH_RESULTS`]; anything else yields [`DEFAULT_MAX_RESULTS`].
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn result_limit(requested: Option<&Value>) -> usize {
    let number = match requested {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number.filter(|n| n.is_finite()).map(f64::floor) {
        Some(n) if n >= 1.0 => n.min(MAX_SEARCH_RESULTS as f64) as usize,
        _ => DEFAULT_MAX_RESULTS,
    }
}

fn matches_query(header: &MessageHeader, query: &str) -> bool {
    query.is_empty()
        || [
            header.subject(),
            header.author(),
            header.recipients(),
            header.cc_list(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(query))
}

impl<S: MailStore> MailService<S> {
    /// Searches all accounts for matching messages.
    #[must_use]
    pub fn search(&self, params: &SearchParams) -> Vec<MessageSummary> {
        let query = params.query.as_deref().unwrap_or_default().to_lowercase();
        let window = DateWindow::new(params.start_date.as_deref(), params.end_date.as_deref());
        let limit = result_limit(params.max_results.as_ref());
        let ascending = params.sort_order.as_deref() == Some("asc");

        let mut hits: Vec<(i64, MessageSummary)> = Vec::new();
        let mut scanned = 0usize;
        let mut visited = HashSet::new();

        'accounts: for account in self.store.accounts() {
            let mut stack = vec![account.root_uri];
            while let Some(uri) = stack.pop() {
                if scanned >= SEARCH_COLLECTION_CAP {
                    break 'accounts;
                }
                if !visited.insert(uri.clone()) {
                    continue;
                }
                let Some(folder) = self.store.folder(&uri) else {
                    continue;
                };

                self.scan_folder(&folder, &query, window, &mut scanned, &mut hits);

                let children = self.store.subfolders(&uri);
                stack.extend(children.into_iter().rev().map(|child| child.uri));
            }
        }

        if ascending {
            hits.sort_by(|a, b| a.0.cmp(&b.0));
        } else {
            hits.sort_by(|a, b| b.0.cmp(&a.0));
        }
        hits.truncate(limit);

        debug!(
            query = %query,
            scanned,
            visited = visited.len(),
            results = hits.len(),
            "Search finished"
        );
        hits.into_iter().map(|(_, summary)| summary).collect()
    }

    fn scan_folder(
        &self,
        folder: &Folder,
        query: &str,
        window: DateWindow,
        scanned: &mut usize,
        hits: &mut Vec<(i64, MessageSummary)>,
    ) {
        if folder.server_type.is_remote()
            && let Err(e) = self.store.refresh_folder(&folder.uri)
        {
            debug!(folder = %folder.uri, error = %e, "Folder refresh failed, using cached index");
        }

        let headers = match self.store.headers(&folder.uri) {
            Ok(headers) => headers,
            Err(e) => {
                debug!(folder = %folder.uri, error = %e, "Skipping folder");
                return;
            }
        };

        for header in &headers {
            if *scanned >= SEARCH_COLLECTION_CAP {
                break;
            }
            *scanned += 1;

            if window.contains(header.date_micros) && matches_query(header, query) {
                hits.push((header.date_micros, MessageSummary::new(header, folder)));
            }
        }
    }
}
