//! Webhook delivery with a durable retry queue.
//!
//! A first attempt that fails is written to the [`RetryQueue`]; a retry that
//! fails is only reported, since its unit is already on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use watch_core::{Message, DISABLED_DESTINATION};
use watch_logging::{watch_debug, watch_error, watch_info, watch_warn};

use crate::queue::RetryQueue;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    #[error("cannot encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("webhook answered http status {0}")]
    HttpStatus(u16),
}

/// What a queue drain achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    /// Units left in place because redelivery failed again.
    pub retained: usize,
    /// Units that could not be read or parsed.
    pub unreadable: usize,
    /// Units delivered but not deleted; they will be sent again next drain.
    pub undeleted: usize,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    queue: RetryQueue,
    clock: Clock,
}

impl WebhookNotifier {
    pub fn new(queue: RetryQueue) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            queue,
            clock: Arc::new(Utc::now),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// First delivery attempt; queues the message on failure.
    pub async fn notify(&self, message: &Message, destination: &str) -> bool {
        self.deliver(message, destination, Attempt::First).await
    }

    pub async fn deliver(&self, message: &Message, destination: &str, attempt: Attempt) -> bool {
        if destination == DISABLED_DESTINATION {
            return true;
        }
        match self.post(message, destination).await {
            Ok(()) => true,
            Err(err) => {
                watch_warn!("Notification delivery failed ({:?} attempt): {}", attempt, err);
                if attempt == Attempt::First {
                    self.enqueue(message, destination);
                }
                false
            }
        }
    }

    async fn post(&self, message: &Message, destination: &str) -> Result<(), NotifyError> {
        let url = url::Url::parse(destination)
            .map_err(|err| NotifyError::InvalidDestination(err.to_string()))?;
        let body = serde_json::to_vec(message)?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    /// Best effort: a failure to persist is logged and swallowed.
    pub fn enqueue(&self, message: &Message, destination: &str) -> Option<PathBuf> {
        match self.queue.push(message, destination, (self.clock)()) {
            Ok(path) => {
                watch_info!("Queued notification for retry at {:?}", path);
                Some(path)
            }
            Err(err) => {
                watch_error!("Failed to queue notification: {}", err);
                None
            }
        }
    }

    /// Retries every queued unit once, deleting the ones that get through.
    pub async fn drain_queue(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let units = match self.queue.units() {
            Ok(units) => units,
            Err(err) => {
                watch_error!("Failed to list notification queue: {}", err);
                return report;
            }
        };
        watch_debug!("{} queued notification(s) in {:?}", units.len(), self.queue.dir());

        for path in units {
            let unit = match self.queue.load(&path) {
                Ok(unit) => unit,
                Err(err) => {
                    watch_warn!("Skipping queued notification: {}", err);
                    report.unreadable += 1;
                    continue;
                }
            };

            if !self.deliver(&unit.message, &unit.webhook_url, Attempt::Retry).await {
                report.retained += 1;
                continue;
            }
            report.delivered += 1;
            if let Err(err) = self.queue.remove(&path) {
                watch_error!("Delivered but could not delete: {}", err);
                report.undeleted += 1;
            }
        }

        watch_info!(
            "Queue drain finished: {} delivered, {} retained, {} unreadable",
            report.delivered,
            report.retained,
            report.unreadable
        );
        report
    }
}
