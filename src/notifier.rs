use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::message::Identifier;
use crate::routing::HttpFetch;

/// Fire-and-forget trigger of the downstream run for an identifier.
pub struct RunNotifier {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl RunNotifier {
    pub fn new(http: Arc<dyn HttpFetch>, base_url: &str) -> Self {
        RunNotifier {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Spawns `GET {base}/run/{first}/{last}` and returns immediately.
    ///
    /// The task never fails: any status is accepted and errors are only logged.
    pub fn notify(&self, identifier: &Identifier) -> JoinHandle<()> {
        let http = Arc::clone(&self.http);
        let url = format!("{}/run/{}", self.base_url, identifier.url_path());
        let identifier = identifier.to_string();

        tokio::spawn(async move {
            match http.get(&url).await {
                Ok(reply) => {
                    info!("Run triggered for '{}' (status {})", identifier, reply.status);
                }
                Err(e) => {
                    warn!("Unable to trigger run for '{}': {}", identifier, e);
                }
            }
        })
    }
}
