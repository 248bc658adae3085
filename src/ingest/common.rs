/// Common structures for ingestion cycles
use chrono::{DateTime, Utc};
use log::info;

/// Terminal or skip outcome of a single message within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Attachments written, message flagged for deletion, run triggered
    Saved { files_written: usize },
    /// Identifier unknown to the directory/name services
    Unregistered,
    /// Content type is not multipart; out of scope, left untouched
    NotMultipart,
    /// Gone between listing and fetching
    Vanished,
}

/// Counters for one ingestion cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub listed: usize,
    pub skipped_seen: usize,
    pub saved: usize,
    pub unregistered: usize,
    pub not_multipart: usize,
    pub malformed: usize,
    pub failed: usize,
    pub files_written: usize,
    pub notified: usize,
}

impl CycleReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            listed: 0,
            skipped_seen: 0,
            saved: 0,
            unregistered: 0,
            not_multipart: 0,
            malformed: 0,
            failed: 0,
            files_written: 0,
            notified: 0,
        }
    }

    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Saved { files_written } => {
                self.saved += 1;
                self.files_written += files_written;
            }
            MessageOutcome::Unregistered => self.unregistered += 1,
            MessageOutcome::NotMultipart => self.not_multipart += 1,
            MessageOutcome::Vanished => {}
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Cycle started {} finished: {} listed, {} already seen, {} saved ({} file(s)), \
             {} unregistered, {} not multipart, {} malformed, {} failed, {} run(s) triggered",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.listed,
            self.skipped_seen,
            self.saved,
            self.files_written,
            self.unregistered,
            self.not_multipart,
            self.malformed,
            self.failed,
            self.notified
        );
    }
}

impl Default for CycleReport {
    fn default() -> Self {
        Self::new()
    }
}
