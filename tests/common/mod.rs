#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use fastq_mail_ingest::config::UnregisteredPolicy;
use fastq_mail_ingest::error::{MailboxError, RoutingError};
use fastq_mail_ingest::ingest::Ingestor;
use fastq_mail_ingest::mailbox::{MailConnector, MailSession, MessageSummary};
use fastq_mail_ingest::routing::{HttpFetch, HttpReply};

pub const BASE_URL: &str = "http://miracum.test/api";

// ---------------------------------------------------------------- mailbox

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
    pub seen: bool,
    pub deleted: bool,
}

#[derive(Debug, Default)]
pub struct MailboxState {
    pub messages: Vec<StoredMessage>,
    pub opens: usize,
    pub closes: usize,
    pub fetched: Vec<u32>,
    pub fail_open: bool,
    pub fail_fetch_uid: Option<u32>,
    pub fail_store_uid: Option<u32>,
    next_uid: u32,
}

/// In-memory mail store. `close` expunges deleted messages like IMAP CLOSE.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    pub state: Arc<Mutex<MailboxState>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// `open` blocks until a permit is added to the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mailbox = FakeMailbox {
            state: Arc::default(),
            gate: Some(Arc::clone(&gate)),
        };
        (mailbox, gate)
    }

    pub fn deliver(&self, raw: Vec<u8>) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let uid = state.next_uid;
        state.messages.push(StoredMessage {
            uid,
            raw,
            seen: false,
            deleted: false,
        });
        uid
    }

    pub fn message(&self, uid: u32) -> Option<StoredMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .cloned()
    }

    pub fn set_seen(&self, uid: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state.messages.iter_mut().find(|m| m.uid == uid) {
            m.seen = true;
        }
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn fetched(&self) -> Vec<u32> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl MailConnector for FakeMailbox {
    async fn open(&self) -> Result<Box<dyn MailSession>, MailboxError> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            state.fail_open
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if fail {
            return Err(MailboxError::Connect {
                host: "imap.test".to_string(),
                port: 993,
                reason: "connection refused".to_string(),
            });
        }

        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<MailboxState>>,
}

impl FakeSession {
    fn flag(&self, uid: u32, seen: bool, deleted: bool) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_store_uid == Some(uid) {
            return Err(MailboxError::Protocol {
                operation: "store",
                reason: "connection reset".to_string(),
            });
        }
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.uid == uid)
            .ok_or(MailboxError::Protocol {
                operation: "store",
                reason: format!("no UID {}", uid),
            })?;
        message.seen |= seen;
        message.deleted |= deleted;
        Ok(())
    }
}

#[async_trait]
impl MailSession for FakeSession {
    async fn list_messages(&mut self) -> Result<Vec<MessageSummary>, MailboxError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .map(|m| MessageSummary {
                uid: m.uid,
                seen: m.seen,
                deleted: m.deleted,
            })
            .collect())
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(uid);
        if state.fail_fetch_uid == Some(uid) {
            return Err(MailboxError::Protocol {
                operation: "fetch",
                reason: "connection reset".to_string(),
            });
        }
        Ok(state.messages.iter().find(|m| m.uid == uid).map(|m| m.raw.clone()))
    }

    async fn mark_processed(&mut self, uid: u32) -> Result<(), MailboxError> {
        self.flag(uid, true, true)
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<(), MailboxError> {
        self.flag(uid, true, false)
    }

    async fn close(self: Box<Self>) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.messages.retain(|m| !m.deleted);
        Ok(())
    }
}

// ---------------------------------------------------------------- http

#[derive(Debug, Clone)]
enum Scripted {
    Reply(u16, String),
    Unreachable,
}

/// HTTP fake keyed by full URL. Run triggers answer 200 unless scripted;
/// any other unscripted URL is unreachable.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    run_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{}{}", BASE_URL, path), Scripted::Reply(status, body.to_string()));
    }

    pub fn unreachable(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{}{}", BASE_URL, path), Scripted::Unreachable);
    }

    /// Directory and name lookups for Jane Doe with `pairs` read pairs.
    pub fn register_jane_doe(&self, directory: &str, pairs: usize, names: &[&str]) {
        self.reply("/fastq/directory/Jane/Doe", 200, directory);
        let names = serde_json::to_string(names).unwrap();
        self.reply(&format!("/fastq/names/{}/Jane/Doe", pairs), 200, &names);
    }

    /// Run triggers hang until a permit is added to the returned semaphore.
    pub fn hold_runs(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.run_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, fragment: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|url| url.contains(fragment))
            .collect()
    }
}

#[async_trait]
impl HttpFetch for ScriptedHttp {
    async fn get(&self, url: &str) -> Result<HttpReply, RoutingError> {
        self.calls.lock().unwrap().push(url.to_string());

        let gate = if url.contains("/run/") {
            self.run_gate.lock().unwrap().clone()
        } else {
            None
        };
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let scripted = self.routes.lock().unwrap().get(url).cloned();
        match scripted {
            Some(Scripted::Reply(status, body)) => Ok(HttpReply {
                status,
                body: body.into_bytes(),
            }),
            None if url.contains("/run/") => Ok(HttpReply {
                status: 200,
                body: Vec::new(),
            }),
            Some(Scripted::Unreachable) | None => Err(RoutingError::Transport {
                url: url.to_string(),
                reason: "network unreachable".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------- wiring

pub fn ingestor(mailbox: &FakeMailbox, http: &Arc<ScriptedHttp>, policy: UnregisteredPolicy) -> Ingestor {
    let connector: Arc<dyn MailConnector> = Arc::new(mailbox.clone());
    let http: Arc<dyn HttpFetch> = Arc::clone(http) as Arc<dyn HttpFetch>;
    Ingestor::new(connector, http, BASE_URL, policy)
}

// ---------------------------------------------------------------- messages

pub enum Part<'a> {
    Text(&'a str),
    Attachment(&'a str, &'a [u8]),
}

const BOUNDARY: &str = "----=_Part_0_fastq";

/// multipart/mixed message with the given parts in order.
pub fn multipart_mail(subject: &str, parts: &[Part<'_>]) -> Vec<u8> {
    let mut mail = format!(
        "From: sequencer@lab.example\r\n\
         To: fastq@lab.example\r\n\
         Subject: {}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"{}\"\r\n\
         \r\n\
         This is a multi-part message in MIME format.\r\n",
        subject, BOUNDARY
    );

    for part in parts {
        mail.push_str(&format!("--{}\r\n", BOUNDARY));
        match part {
            Part::Text(text) => {
                mail.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
                mail.push_str(text);
                mail.push_str("\r\n");
            }
            Part::Attachment(name, content) => {
                mail.push_str(&format!(
                    "Content-Type: application/octet-stream; name=\"{0}\"\r\n\
                     Content-Disposition: attachment; filename=\"{0}\"\r\n\
                     Content-Transfer-Encoding: base64\r\n\r\n",
                    name
                ));
                mail.push_str(&general_purpose::STANDARD.encode(content));
                mail.push_str("\r\n");
            }
        }
    }

    mail.push_str(&format!("--{}--\r\n", BOUNDARY));
    mail.into_bytes()
}

pub fn plain_mail(subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: sequencer@lab.example\r\n\
         To: fastq@lab.example\r\n\
         Subject: {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {}\r\n",
        subject, body
    )
    .into_bytes()
}

/// The "Jane Doe" message: attachment, inline text, attachment.
pub fn jane_doe_mail() -> Vec<u8> {
    multipart_mail(
        "Jane Doe",
        &[
            Part::Attachment("sample_L001_R1.fastq", b"@SEQ1\nACGT\n+\nFFFF\n"),
            Part::Text("Please find the run attached."),
            Part::Attachment("sample_L001_R2.fastq", b"@SEQ2\nTGCA\n+\nFFFF\n"),
        ],
    )
}
