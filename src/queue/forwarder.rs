//! # Forwarder
//!
//! Periodically drains the durable queue into the remote sink.
//!
//! Each cycle takes the oldest batch and forwards it row by row, in order.
//! The first failed insert ends the cycle: that row and everything after it
//! stay queued for the next cycle, so the sink never sees records out of
//! order and an outage simply makes the queue grow. Rows the sink
//! confirmed are removed together in one transaction at the end of the
//! cycle.

use std::time::Duration;

use tracing::{debug, error, info};

use super::DurableQueue;
use crate::error::Result;
use crate::sink::TelemetrySink;

/// Task moving records from the queue to the sink
pub struct Forwarder<S> {
    queue: DurableQueue,
    sink: S,
    batch_size: usize,
    interval: Duration,
}

impl<S: TelemetrySink> Forwarder<S> {
    /// Create a forwarder
    ///
    /// # Arguments
    ///
    /// * `queue` - Queue to drain
    /// * `sink` - Where records go
    /// * `batch_size` - Most rows handled per cycle
    /// * `interval` - Pause between cycles
    pub fn new(queue: DurableQueue, sink: S, batch_size: usize, interval: Duration) -> Self {
        Self {
            queue,
            sink,
            batch_size,
            interval,
        }
    }

    /// Run one forwarding cycle
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of records forwarded and removed
    ///
    /// # Errors
    ///
    /// Returns error if the queue cannot be read or the removal transaction
    /// fails. In the latter case the forwarded rows stay queued and will be
    /// sent again.
    pub async fn drain_and_forward(&mut self) -> Result<usize> {
        let batch = self.queue.oldest(self.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let mut confirmed = Vec::with_capacity(batch.len());
        for row in &batch {
            if let Err(e) = self.sink.insert(&row.record).await {
                error!("could not forward record {}: {}", row.id, e);
                break;
            }
            confirmed.push(row.id);
        }

        let removed = self.queue.remove(&confirmed).await?;
        if removed > 0 {
            info!("processed {} records to sink", removed);
        }
        debug!("{} of {} records in batch left queued", batch.len() - confirmed.len(), batch.len());

        Ok(removed)
    }

    /// Forward forever, pausing `interval` after every cycle
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Forwarding from {} every {}s (batch {})",
            self.queue.location(),
            self.interval.as_secs(),
            self.batch_size
        );

        loop {
            if let Err(e) = self.drain_and_forward().await {
                error!("forwarding cycle failed: {}", e);
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
