//! # Local Reporter
//!
//! Records the relay's own position at a fixed interval, independent of
//! any received heartbeat.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::position::FixCache;
use crate::queue::DurableQueue;
use crate::telemetry::TelemetryRecord;

/// Task queuing a local record every `interval`
pub struct LocalReporter {
    client_name: String,
    cache: FixCache,
    queue: DurableQueue,
    interval: Duration,
}

impl LocalReporter {
    pub fn new(client_name: impl Into<String>, cache: FixCache, queue: DurableQueue, interval: Duration) -> Self {
        Self {
            client_name: client_name.into(),
            cache,
            queue,
            interval,
        }
    }

    /// Queue one local record if the current fix is usable
    ///
    /// # Returns
    ///
    /// * `Some(id)` - queue id of the new record
    /// * `None` - no usable fix, or the queue refused the record
    pub async fn report(&self) -> Option<i64> {
        let fix = self.cache.read();
        if !fix.is_usable() {
            warn!("type=local no usable fix");
            return None;
        }

        let record = TelemetryRecord::local(&self.client_name, &fix);
        match self.queue.enqueue(&record).await {
            Ok(id) => {
                debug!("type=local queued record {}", id);
                Some(id)
            }
            Err(e) => {
                error!("type=local could not queue record: {}", e);
                None
            }
        }
    }

    /// Report forever; the first report is immediate
    pub async fn run(self) -> Result<()> {
        info!("Reporting local position every {}s", self.interval.as_secs());

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.report().await;
        }
    }
}
