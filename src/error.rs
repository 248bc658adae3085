//! Error taxonomy for an ingestion cycle.
//!
//! Only [`MailboxError::Connect`] and [`MailboxError::Timeout`] raised while
//! opening a session abort a whole cycle. Everything else is contained to the
//! message that caused it.

use std::path::PathBuf;
use std::time::Duration;

/// Failures talking to the mail store.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("unable to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("IMAP {operation} failed: {reason}")]
    Protocol {
        operation: &'static str,
        reason: String,
    },

    #[error("IMAP {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Failures resolving where a message's attachments belong.
///
/// None of these mean the identifier is unknown; that is
/// [`crate::routing::Routing::Unregistered`], which is not an error.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered with unexpected status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("{url} returned an empty directory path")]
    EmptyDirectory { url: String },

    #[error("{url} returned an invalid file name list: {source}")]
    InvalidNames {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("file name '{name}' is not a plain file name")]
    InvalidFileName { name: String },

    #[error("name service returned {got} file name(s) for {expected} attachment(s)")]
    NameShortfall { expected: usize, got: usize },
}

/// Per-message failure. Logged, counted, and the message is left unflagged.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("unable to write {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed message: {0}")]
    Malformed(String),
}
