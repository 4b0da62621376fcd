//! # Position Poller
//!
//! Keeps the fix cache in step with the position source.

use std::time::Duration;

use tracing::{debug, error};

use super::source::PositionSource;
use super::FixCache;
use crate::error::Result;

/// Task publishing every fix from a source into the cache
pub struct PositionPoller<S> {
    source: S,
    cache: FixCache,
    timeout: Duration,
}

impl<S: PositionSource> PositionPoller<S> {
    /// Create a poller
    ///
    /// # Arguments
    ///
    /// * `source` - Where fixes come from
    /// * `cache` - Cache to publish into
    /// * `timeout` - Longest single wait on the source
    pub fn new(source: S, cache: FixCache, timeout: Duration) -> Self {
        Self { source, cache, timeout }
    }

    /// Wait once for the source and publish what it produced
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - a fix was published
    /// * `Ok(false)` - the wait timed out or the report had no fix
    pub async fn poll_once(&mut self) -> Result<bool> {
        match self.source.poll(self.timeout).await? {
            Some(fix) => {
                debug!(
                    "fix mode={:?} tsp={} lat={} lon={}",
                    fix.mode, fix.timestamp, fix.latitude, fix.longitude
                );
                self.cache.write(fix);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll forever
    ///
    /// Only returns when the source fails, which is fatal for the relay.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if let Err(e) = self.poll_once().await {
                error!("could not read position source: {}", e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::position::source::mocks::MockPositionSource;
    use crate::position::{FixMode, PositionFix};

    fn fix(lat: f64) -> PositionFix {
        PositionFix {
            timestamp: 1000.0,
            latitude: lat,
            longitude: 2.35,
            mode: FixMode::ThreeD,
            has_lat_lon: true,
        }
    }

    #[tokio::test]
    async fn test_poll_once_publishes_fix() {
        let mut source = MockPositionSource::new();
        source.push_fix(fix(48.85));

        let cache = FixCache::new();
        let mut poller = PositionPoller::new(source, cache.clone(), Duration::from_secs(1));

        assert!(poller.poll_once().await.unwrap());
        assert_eq!(cache.read(), fix(48.85));
    }

    #[tokio::test]
    async fn test_timeout_keeps_previous_fix() {
        let mut source = MockPositionSource::new();
        source.push_fix(fix(10.0));
        source.push_timeout();

        let cache = FixCache::new();
        let mut poller = PositionPoller::new(source, cache.clone(), Duration::from_secs(1));

        assert!(poller.poll_once().await.unwrap());
        assert!(!poller.poll_once().await.unwrap());
        assert_eq!(cache.read().latitude, 10.0);
    }

    #[tokio::test]
    async fn test_later_fix_replaces_earlier() {
        let mut source = MockPositionSource::new();
        source.push_fix(fix(10.0));
        source.push_fix(PositionFix::default());

        let cache = FixCache::new();
        let mut poller = PositionPoller::new(source, cache.clone(), Duration::from_secs(1));

        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();
        assert!(!cache.read().is_usable(), "a lost fix is published too");
    }

    #[tokio::test]
    async fn test_run_stops_on_source_error() {
        let mut source = MockPositionSource::new();
        source.push_fix(fix(1.0));
        source.push_timeout();
        source.push_error("gpsd went away");

        let cache = FixCache::new();
        let poller = PositionPoller::new(source, cache.clone(), Duration::from_secs(1));

        let result = poller.run().await;
        assert!(matches!(result, Err(RelayError::Position(_))));
        assert_eq!(cache.read().latitude, 1.0);
    }
}
