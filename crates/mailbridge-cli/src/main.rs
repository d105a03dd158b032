//! `mailbridge-cli` - command-line client for the `MailBridge` service
//!
//! Runs one tool per invocation and prints the result as terminal text, or
//! serves the Model Context Protocol over stdio with `bridge`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod bridge;
mod client;
mod format;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::Client;

#[derive(Debug, Parser)]
#[command(
    name = "mailbridge-cli",
    version,
    about = "Command-line client for the MailBridge mail service"
)]
struct Cli {
    /// Service endpoint.
    #[arg(long, env = "MAILBRIDGE_URL", default_value = "http://127.0.0.1:8756/")]
    url: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List email accounts and identities
    Accounts,
    /// Search messages by subject, sender, or recipient
    Search {
        /// Text to search for; empty matches everything
        #[arg(default_value = "")]
        query: String,
        /// Only messages on or after this ISO 8601 date
        #[arg(long)]
        start_date: Option<String>,
        /// Only messages on or before this ISO 8601 date
        #[arg(long)]
        end_date: Option<String>,
        /// Maximum number of results
        #[arg(long)]
        max: Option<u32>,
        /// Date sort order
        #[arg(long, value_enum)]
        sort: Option<SortOrder>,
    },
    /// Read a full email message
    Get {
        message_id: String,
        folder_path: String,
        /// Save attachments to the service's scratch directory
        #[arg(long)]
        save_attachments: bool,
    },
    /// List mail folders
    Folders {
        /// Only folders of this account
        #[arg(long)]
        account: Option<String>,
    },
    /// Update read, flagged or folder state of a message
    Update {
        message_id: String,
        folder_path: String,
        /// Mark as read
        #[arg(long, conflicts_with = "unread")]
        read: bool,
        /// Mark as unread
        #[arg(long)]
        unread: bool,
        /// Flag the message
        #[arg(long, conflicts_with = "unflag")]
        flag: bool,
        /// Remove the flag
        #[arg(long)]
        unflag: bool,
        /// Move to this folder URI
        #[arg(long)]
        move_to: Option<String>,
        /// Move to the account's trash
        #[arg(long)]
        trash: bool,
    },
    /// Open a compose window
    Send {
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        #[command(flatten)]
        envelope: Envelope,
    },
    /// Reply to a message
    Reply {
        message_id: String,
        folder_path: String,
        #[arg(long)]
        body: String,
        /// Reply to all recipients
        #[arg(long)]
        reply_all: bool,
        /// Override the recipient
        #[arg(long)]
        to: Option<String>,
        #[command(flatten)]
        envelope: Envelope,
    },
    /// Forward a message
    Forward {
        message_id: String,
        folder_path: String,
        #[arg(long)]
        to: String,
        /// Text to put above the forwarded message
        #[arg(long)]
        body: Option<String>,
        #[command(flatten)]
        envelope: Envelope,
    },
    /// Search contacts
    Contacts {
        #[arg(default_value = "")]
        query: String,
    },
    /// List calendars
    Calendars,
    /// Open a pre-filled event dialog
    Event {
        title: String,
        /// Start date/time, ISO 8601
        #[arg(long)]
        start: String,
        /// End date/time, ISO 8601
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Target calendar ID
        #[arg(long)]
        calendar: Option<String>,
        /// Create an all-day event
        #[arg(long)]
        all_day: bool,
    },
    /// List the service's tools
    Tools,
    /// Serve MCP over stdio, forwarding tool calls to the service
    Bridge,
}

/// Options shared by the compose commands.
#[derive(Debug, clap::Args)]
struct Envelope {
    /// CC recipients (comma-separated)
    #[arg(long)]
    cc: Option<String>,
    /// BCC recipients (comma-separated)
    #[arg(long)]
    bcc: Option<String>,
    /// Sender identity (email address or identity ID)
    #[arg(long)]
    from: Option<String>,
    /// Body is HTML
    #[arg(long)]
    html: bool,
    /// File to attach (repeatable)
    #[arg(long = "attach")]
    attachments: Vec<String>,
}

impl Envelope {
    fn extend(&self, args: &mut Map<String, Value>) {
        args.insert("cc".into(), json!(self.cc));
        args.insert("bcc".into(), json!(self.bcc));
        args.insert("from".into(), json!(self.from));
        args.insert("isHtml".into(), json!(self.html));
        if !self.attachments.is_empty() {
            args.insert("attachments".into(), json!(self.attachments));
        }
    }
}

/// Drops `null` members so absent options stay absent on the wire.
fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Command {
    /// Tool name and arguments, or `None` for `bridge`.
    fn tool_call(&self) -> Option<(&'static str, Value)> {
        let call = match self {
            Self::Accounts => ("listAccounts", json!({})),
            Self::Search {
                query,
                start_date,
                end_date,
                max,
                sort,
            } => (
                "searchMessages",
                json!({
                    "query": query,
                    "startDate": start_date,
                    "endDate": end_date,
                    "maxResults": max,
                    "sortOrder": sort.map(SortOrder::as_str),
                }),
            ),
            Self::Get {
                message_id,
                folder_path,
                save_attachments,
            } => (
                "getMessage",
                json!({
                    "messageId": message_id,
                    "folderPath": folder_path,
                    "saveAttachments": save_attachments,
                }),
            ),
            Self::Folders { account } => ("listFolders", json!({ "accountId": account })),
            Self::Update {
                message_id,
                folder_path,
                read,
                unread,
                flag,
                unflag,
                move_to,
                trash,
            } => {
                let read = (*read || *unread).then_some(*read);
                let flagged = (*flag || *unflag).then_some(*flag);
                (
                    "updateMessage",
                    json!({
                        "messageId": message_id,
                        "folderPath": folder_path,
                        "read": read,
                        "flagged": flagged,
                        "moveTo": move_to,
                        "trash": trash.then_some(true),
                    }),
                )
            }
            Self::Send {
                to,
                subject,
                body,
                envelope,
            } => {
                let mut args = object(json!({ "to": to, "subject": subject, "body": body }));
                envelope.extend(&mut args);
                ("sendMail", Value::Object(args))
            }
            Self::Reply {
                message_id,
                folder_path,
                body,
                reply_all,
                to,
                envelope,
            } => {
                let mut args = object(json!({
                    "messageId": message_id,
                    "folderPath": folder_path,
                    "body": body,
                    "replyAll": reply_all,
                    "to": to,
                }));
                envelope.extend(&mut args);
                ("replyToMessage", Value::Object(args))
            }
            Self::Forward {
                message_id,
                folder_path,
                to,
                body,
                envelope,
            } => {
                let mut args = object(json!({
                    "messageId": message_id,
                    "folderPath": folder_path,
                    "to": to,
                    "body": body,
                }));
                envelope.extend(&mut args);
                ("forwardMessage", Value::Object(args))
            }
            Self::Contacts { query } => ("searchContacts", json!({ "query": query })),
            Self::Calendars => ("listCalendars", json!({})),
            Self::Event {
                title,
                start,
                end,
                location,
                description,
                calendar,
                all_day,
            } => (
                "createEvent",
                json!({
                    "title": title,
                    "startDate": start,
                    "endDate": end,
                    "location": location,
                    "description": description,
                    "calendarId": calendar,
                    "allDay": all_day,
                }),
            ),
            Self::Tools => ("listTools", json!({})),
            Self::Bridge => return None,
        };
        Some((call.0, compact(call.1)))
    }

    fn render(&self, result: &Value) -> anyhow::Result<String> {
        match self {
            Self::Accounts => format::accounts(result),
            Self::Search { .. } => format::messages(result),
            Self::Get { .. } => format::message(result),
            Self::Folders { .. } => format::folders(result),
            Self::Update { .. } => format::update(result),
            Self::Send { .. } => Ok(format::outcome(result, "Compose window opened")),
            Self::Reply { .. } => Ok(format::outcome(result, "Reply window opened")),
            Self::Forward { .. } => Ok(format::outcome(result, "Forward window opened")),
            Self::Contacts { .. } => format::contacts(result),
            Self::Calendars => format::calendars(result),
            Self::Event { .. } => Ok(format::outcome(result, "Event dialog opened")),
            Self::Tools => format::tools(result),
            Self::Bridge => Ok(String::new()),
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = Client::new(cli.url, Duration::from_secs(cli.timeout))?;

    let Some((tool, args)) = cli.command.tool_call() else {
        return bridge::run(&client).await;
    };

    let result = client.call_tool(tool, args).await?;
    if let Some(error) = format::operation_error(&result) {
        anyhow::bail!("{error}");
    }

    print!("{}", cli.command.render(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries results and bridge traffic.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailbridge_cli=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
