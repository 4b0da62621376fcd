//! # Sink Module
//!
//! The remote relational sink records are forwarded to.
//!
//! The forwarder only needs one operation, `insert`, and treats every
//! failure as transient: the record stays queued and is retried on the next
//! cycle.

pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::telemetry::TelemetryRecord;

pub use self::postgres::PostgresSink;

/// Destination for forwarded telemetry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send {
    /// Store one record; `Ok` means the sink confirmed it
    async fn insert(&mut self, record: &TelemetryRecord) -> Result<()>;
}
