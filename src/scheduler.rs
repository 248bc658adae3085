use log::{debug, error, info};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::ingest::Ingestor;

/// Poll scheduler driving ingestion cycles on a fixed interval.
///
/// The first cycle runs immediately. Cycles run inline in the loop, so they
/// never overlap; ticks missed while a cycle runs are dropped, not queued.
pub struct PollScheduler {
    ingestor: Arc<Ingestor>,
    poll_interval: Duration,
}

impl PollScheduler {
    /// A zero interval is raised to one second.
    pub fn new(ingestor: Arc<Ingestor>, poll_interval: Duration) -> Self {
        let poll_interval = poll_interval.max(Duration::from_secs(1));
        info!("Poll scheduler configured (interval: {} seconds)", poll_interval.as_secs());

        PollScheduler {
            ingestor,
            poll_interval,
        }
    }

    /// Start the background polling task. It runs until aborted.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_poll_loop().await;
        })
    }

    async fn run_poll_loop(&self) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Poll loop started");

        loop {
            ticker.tick().await;

            match self.ingestor.try_run_cycle().await {
                Some(Ok(report)) => {
                    debug!("Scheduled cycle done: {} message(s) saved", report.saved);
                }
                Some(Err(e)) => {
                    error!("Scheduled cycle failed: {}", e);
                    info!("Will retry at next interval");
                }
                None => {
                    info!("Scheduled tick skipped, a manual cycle is running");
                }
            }
        }
    }
}

/// Helper to create and start a poll scheduler
pub fn start_polling(ingestor: Arc<Ingestor>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
    PollScheduler::new(ingestor, poll_interval).start()
}
