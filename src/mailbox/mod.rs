//! Mailbox session management: the mail store seen through the few
//! operations an ingestion cycle needs.
pub mod imap;

use async_trait::async_trait;

use crate::error::MailboxError;

pub use imap::ImapConnector;

/// Listing entry for one message in the open folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSummary {
    pub uid: u32,
    pub seen: bool,
    pub deleted: bool,
}

/// Opens a fresh session for each cycle.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Connect over TLS, authenticate and open the folder read-write.
    async fn open(&self) -> Result<Box<dyn MailSession>, MailboxError>;
}

/// An open, read-write folder owned by exactly one running cycle.
#[async_trait]
pub trait MailSession: Send {
    /// Messages in folder order, oldest first.
    async fn list_messages(&mut self) -> Result<Vec<MessageSummary>, MailboxError>;

    /// Raw RFC 822 bytes. Must not set `\Seen`. `None` if the message vanished.
    async fn fetch_message(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailboxError>;

    /// Flag `\Seen \Deleted`; the message is expunged on close.
    async fn mark_processed(&mut self, uid: u32) -> Result<(), MailboxError>;

    /// Flag `\Seen` only.
    async fn mark_seen(&mut self, uid: u32) -> Result<(), MailboxError>;

    /// Close the folder, expunging deleted messages, then disconnect.
    async fn close(self: Box<Self>) -> Result<(), MailboxError>;
}
