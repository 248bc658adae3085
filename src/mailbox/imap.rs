use async_imap::types::{Fetch, Flag};
use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use futures::TryStreamExt;
use log::{debug, info};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use super::{MailConnector, MailSession, MessageSummary};
use crate::config::MailConfig;
use crate::error::MailboxError;

type ImapStream = TlsStream<Compat<TcpStream>>;

pub struct ImapConnector {
    config: MailConfig,
}

impl ImapConnector {
    pub fn new(config: MailConfig) -> Self {
        ImapConnector { config }
    }

    async fn connect_and_select(&self) -> Result<ImapSession, MailboxError> {
        let config = &self.config;
        info!("Connecting to IMAP server {}:{}", config.host, config.port);

        let connect_error = |reason: String| MailboxError::Connect {
            host: config.host.clone(),
            port: config.port,
            reason,
        };

        let tcp_stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        // async-native-tls works on futures-io streams
        let tls_stream = TlsConnector::new()
            .connect(&config.host, tcp_stream.compat())
            .await
            .map_err(|e| connect_error(format!("TLS handshake failed: {}", e)))?;

        let client = async_imap::Client::new(tls_stream);

        let mut session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|(e, _client)| connect_error(format!("authentication failed: {}", e)))?;

        let mailbox = session
            .select(&config.folder)
            .await
            .map_err(|e| connect_error(format!("unable to open {}: {}", config.folder, e)))?;

        info!(
            "IMAP session open on {} ({} message(s))",
            config.folder, mailbox.exists
        );

        Ok(ImapSession {
            session,
            exists: mailbox.exists,
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn open(&self) -> Result<Box<dyn MailSession>, MailboxError> {
        let timeout = self.config.timeout();
        let session = bounded("connect", timeout, self.connect_and_select()).await??;
        Ok(Box::new(session))
    }
}

pub struct ImapSession {
    session: Session<ImapStream>,
    exists: u32,
    timeout: Duration,
}

impl ImapSession {
    async fn store_flags(&mut self, uid: u32, flags: &str) -> Result<(), MailboxError> {
        let query = format!("+FLAGS ({})", flags);
        let updates: Vec<Fetch> = bounded("store", self.timeout, async {
            self.session
                .uid_store(uid.to_string(), &query)
                .await?
                .try_collect()
                .await
        })
        .await?
        .map_err(protocol_error("store"))?;

        debug!("UID {} flagged {} ({} update(s))", uid, flags, updates.len());
        Ok(())
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn list_messages(&mut self) -> Result<Vec<MessageSummary>, MailboxError> {
        // Some servers reject FETCH 1:* on an empty folder
        if self.exists == 0 {
            return Ok(Vec::new());
        }

        let fetches: Vec<Fetch> = bounded("list", self.timeout, async {
            self.session
                .fetch("1:*", "(UID FLAGS)")
                .await?
                .try_collect()
                .await
        })
        .await?
        .map_err(protocol_error("list"))?;

        let mut listed: Vec<(u32, MessageSummary)> = fetches
            .iter()
            .filter_map(|fetch| {
                let uid = fetch.uid?;
                let mut summary = MessageSummary {
                    uid,
                    seen: false,
                    deleted: false,
                };
                for flag in fetch.flags() {
                    match flag {
                        Flag::Seen => summary.seen = true,
                        Flag::Deleted => summary.deleted = true,
                        _ => {}
                    }
                }
                Some((fetch.message, summary))
            })
            .collect();

        listed.sort_by_key(|(sequence, _)| *sequence);
        Ok(listed.into_iter().map(|(_, summary)| summary).collect())
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailboxError> {
        // BODY.PEEK leaves \Seen untouched until the message is fully handled
        let fetches: Vec<Fetch> = bounded("fetch", self.timeout, async {
            self.session
                .uid_fetch(uid.to_string(), "BODY.PEEK[]")
                .await?
                .try_collect()
                .await
        })
        .await?
        .map_err(protocol_error("fetch"))?;

        let body = fetches.iter().find_map(|fetch| fetch.body().map(|b| b.to_vec()));
        if let Some(body) = &body {
            debug!("UID {} fetched, {} bytes", uid, body.len());
        }
        Ok(body)
    }

    async fn mark_processed(&mut self, uid: u32) -> Result<(), MailboxError> {
        self.store_flags(uid, "\\Seen \\Deleted").await
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<(), MailboxError> {
        self.store_flags(uid, "\\Seen").await
    }

    async fn close(self: Box<Self>) -> Result<(), MailboxError> {
        let ImapSession { mut session, timeout, .. } = *self;

        // CLOSE expunges every \Deleted message of the selected folder
        let closed = bounded("close", timeout, session.close())
            .await
            .and_then(|r| r.map_err(protocol_error("close")));

        // Log out even if CLOSE failed so the connection is not leaked
        let logged_out = bounded("logout", timeout, session.logout())
            .await
            .and_then(|r| r.map_err(protocol_error("logout")));

        closed?;
        logged_out?;
        info!("IMAP session closed");
        Ok(())
    }
}

async fn bounded<F: Future>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<F::Output, MailboxError> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| MailboxError::Timeout { operation, after })
}

fn protocol_error(operation: &'static str) -> impl Fn(async_imap::error::Error) -> MailboxError {
    move |e| MailboxError::Protocol {
        operation,
        reason: e.to_string(),
    }
}
