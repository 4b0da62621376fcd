//! Trait abstraction for position sources to enable testing

use std::time::Duration;

use async_trait::async_trait;

use super::PositionFix;
use crate::error::Result;

/// Something that produces position fixes
#[async_trait]
pub trait PositionSource: Send {
    /// Wait up to `timeout` for the next fix
    ///
    /// Returns `Ok(None)` if nothing new arrived in time. An error means the
    /// source is gone.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PositionFix>>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::RelayError;
    use std::collections::VecDeque;

    /// Scripted position source for testing
    ///
    /// Replays the queued results in order, then keeps returning
    /// `Ok(None)`.
    pub struct MockPositionSource {
        pub script: VecDeque<Result<Option<PositionFix>>>,
        pub polls: usize,
    }

    impl MockPositionSource {
        pub fn new() -> Self {
            Self {
                script: VecDeque::new(),
                polls: 0,
            }
        }

        pub fn push_fix(&mut self, fix: PositionFix) {
            self.script.push_back(Ok(Some(fix)));
        }

        pub fn push_timeout(&mut self) {
            self.script.push_back(Ok(None));
        }

        pub fn push_error(&mut self, msg: &str) {
            self.script.push_back(Err(RelayError::Position(msg.to_string())));
        }
    }

    #[async_trait]
    impl PositionSource for MockPositionSource {
        async fn poll(&mut self, _timeout: Duration) -> Result<Option<PositionFix>> {
            self.polls += 1;
            match self.script.pop_front() {
                Some(result) => result,
                None => {
                    tokio::task::yield_now().await;
                    Ok(None)
                }
            }
        }
    }
}
