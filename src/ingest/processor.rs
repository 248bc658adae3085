use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::common::{CycleReport, MessageOutcome};
use crate::config::UnregisteredPolicy;
use crate::error::{IngestError, MailboxError};
use crate::mailbox::{MailConnector, MailSession, MessageSummary};
use crate::message::{AttachmentPart, InboundMessage};
use crate::notifier::RunNotifier;
use crate::routing::{HttpFetch, Routing, RoutingResolver};

/// Runs ingestion cycles against one mailbox.
///
/// Every entry point goes through the same single-flight guard, so a
/// scheduled tick and a manual trigger never open the folder twice.
pub struct Ingestor {
    connector: Arc<dyn MailConnector>,
    resolver: RoutingResolver,
    notifier: RunNotifier,
    unregistered_policy: UnregisteredPolicy,
    running: Mutex<()>,
}

impl Ingestor {
    pub fn new(
        connector: Arc<dyn MailConnector>,
        http: Arc<dyn HttpFetch>,
        base_url: &str,
        unregistered_policy: UnregisteredPolicy,
    ) -> Self {
        info!("Initializing fastQ ingestor (services at {})", base_url);

        Ingestor {
            connector,
            resolver: RoutingResolver::new(Arc::clone(&http), base_url),
            notifier: RunNotifier::new(http, base_url),
            unregistered_policy,
            running: Mutex::new(()),
        }
    }

    /// Runs one cycle unless another one is in progress.
    ///
    /// Returns `None` when the attempt was dropped. An `Err` means the
    /// session could not be opened (or listed) and nothing was touched.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleReport, MailboxError>> {
        let (result, notifications) = {
            let Ok(_guard) = self.running.try_lock() else {
                warn!("An ingestion cycle is already running, trigger dropped");
                return None;
            };
            self.run_cycle().await
        };

        // Guard already released, a slow run endpoint never blocks the next cycle
        for notification in notifications {
            if let Err(e) = notification.await {
                warn!("Run notification task did not complete: {}", e);
            }
        }

        Some(result)
    }

    /// Legacy one-shot download of the most recent message.
    ///
    /// Deprecated in favour of [`Ingestor::try_run_cycle`]: it ignores flags,
    /// flags nothing and triggers no run. Returns the number of files written.
    pub async fn try_download_latest(&self) -> Option<Result<usize, IngestError>> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("An ingestion cycle is already running, legacy download dropped");
            return None;
        };

        Some(self.download_latest().await)
    }

    /// Returns the cycle result and the run notifications it spawned.
    async fn run_cycle(&self) -> (Result<CycleReport, MailboxError>, Vec<JoinHandle<()>>) {
        info!("Checking inbox for new fastQ mail");

        let mut session = match self.connector.open().await {
            Ok(session) => session,
            Err(e) => {
                error!("Unable to open mailbox session, cycle aborted: {}", e);
                return (Err(e), Vec::new());
            }
        };

        let mut report = CycleReport::new();
        let mut notifications = Vec::new();

        let outcome = self
            .process_inbox(session.as_mut(), &mut report, &mut notifications)
            .await;

        // Always release the session, whatever happened above
        if let Err(e) = session.close().await {
            error!("Error closing mailbox session: {}", e);
        }

        if let Err(e) = outcome {
            error!("Unable to list mailbox, cycle aborted: {}", e);
            return (Err(e), notifications);
        }

        report.log_summary();
        (Ok(report), notifications)
    }

    async fn process_inbox(
        &self,
        session: &mut dyn MailSession,
        report: &mut CycleReport,
        notifications: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), MailboxError> {
        let messages = session.list_messages().await?;
        report.listed = messages.len();

        let (pending, seen): (Vec<MessageSummary>, Vec<MessageSummary>) = messages
            .into_iter()
            .partition(|summary| !summary.seen && !summary.deleted);
        report.skipped_seen = seen.len();

        if pending.is_empty() {
            info!("No new mail");
            return Ok(());
        }

        info!("{} new message(s) to process", pending.len());

        for summary in pending {
            match self.process_message(session, summary.uid, notifications).await {
                Ok(outcome) => {
                    debug!("UID {}: {:?}", summary.uid, outcome);
                    if matches!(outcome, MessageOutcome::Saved { .. }) {
                        report.notified += 1;
                    }
                    report.record(&outcome);
                }
                Err(IngestError::Malformed(reason)) => {
                    warn!("Skipping message UID {}: {}", summary.uid, reason);
                    report.malformed += 1;
                }
                Err(e) => {
                    error!(
                        "Error processing message UID {}, left for the next cycle: {}",
                        summary.uid, e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(())
    }

    async fn process_message(
        &self,
        session: &mut dyn MailSession,
        uid: u32,
        notifications: &mut Vec<JoinHandle<()>>,
    ) -> Result<MessageOutcome, IngestError> {
        let Some(raw) = session.fetch_message(uid).await? else {
            warn!("Message UID {} disappeared before it could be fetched", uid);
            return Ok(MessageOutcome::Vanished);
        };

        let message = InboundMessage::parse(&raw)?;
        if !message.is_multipart() {
            info!(
                "Message UID {} is {}, not multipart, left untouched",
                uid, message.content_type
            );
            return Ok(MessageOutcome::NotMultipart);
        }

        let identifier = message.identifier()?;
        info!(
            "Message UID {} for '{}' carries {} attachment(s)",
            uid,
            identifier,
            message.attachments.len()
        );

        match self
            .resolver
            .resolve(&identifier, message.attachments.len())
            .await?
        {
            Routing::Unregistered => {
                warn!("'{}' is not registered, no fastQ files saved", identifier);
                if self.unregistered_policy == UnregisteredPolicy::Park {
                    session.mark_seen(uid).await?;
                    info!("Message UID {} parked as seen for manual inspection", uid);
                }
                Ok(MessageOutcome::Unregistered)
            }
            Routing::Resolved {
                directory,
                file_names,
            } => {
                let files_written =
                    save_attachments(&message.attachments, &directory, &file_names).await?;

                session.mark_processed(uid).await?;
                info!("Message UID {} flagged for deletion", uid);

                notifications.push(self.notifier.notify(&identifier));
                Ok(MessageOutcome::Saved { files_written })
            }
        }
    }

    async fn download_latest(&self) -> Result<usize, IngestError> {
        info!("Legacy download of the most recent message");

        let mut session = self.connector.open().await?;
        let outcome = self.download_latest_in(session.as_mut()).await;

        if let Err(e) = session.close().await {
            error!("Error closing mailbox session: {}", e);
        }

        match &outcome {
            Ok(count) => info!("Legacy download finished, {} file(s) saved", count),
            Err(e) => error!("Legacy download failed: {}", e),
        }
        outcome
    }

    async fn download_latest_in(&self, session: &mut dyn MailSession) -> Result<usize, IngestError> {
        let Some(latest) = session.list_messages().await?.pop() else {
            info!("No new mail");
            return Ok(0);
        };

        let Some(raw) = session.fetch_message(latest.uid).await? else {
            return Ok(0);
        };

        let message = InboundMessage::parse(&raw)?;
        if !message.is_multipart() {
            info!("Most recent message is not multipart, nothing to download");
            return Ok(0);
        }

        let identifier = message.identifier()?;
        match self
            .resolver
            .resolve(&identifier, message.attachments.len())
            .await?
        {
            Routing::Unregistered => {
                warn!("'{}' is not registered, no fastQ files saved", identifier);
                Ok(0)
            }
            Routing::Resolved {
                directory,
                file_names,
            } => save_attachments(&message.attachments, &directory, &file_names).await,
        }
    }
}

/// Writes attachment `i` to `directory/file_names[i]`, in attachment order.
///
/// Files are created or truncated, so a retried message overwrites what a
/// failed attempt left behind. The directory must already exist.
async fn save_attachments(
    attachments: &[AttachmentPart],
    directory: &Path,
    file_names: &[String],
) -> Result<usize, IngestError> {
    for (attachment, file_name) in attachments.iter().zip(file_names) {
        let path: PathBuf = directory.join(file_name);

        tokio::fs::write(&path, &attachment.content)
            .await
            .map_err(|source| IngestError::LocalIo {
                path: path.clone(),
                source,
            })?;

        info!(
            "Saved attachment {} ({}) as {} in {}",
            attachment.position,
            attachment.file_name.as_deref().unwrap_or("unnamed"),
            file_name,
            directory.display()
        );
    }

    Ok(attachments.len())
}
