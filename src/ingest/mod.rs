//! # Ingest Module
//!
//! Everything that produces telemetry records:
//! - one UDP listener per network channel (direct, group, broadcast)
//! - the local reporter, which records the relay's own position
//!
//! Listeners share one [`IngestContext`] holding the fix cache and the
//! durable queue.

pub mod listener;
pub mod local;
pub mod socket;

pub use listener::{IngestContext, Ingested, Listener};
pub use local::LocalReporter;
pub use socket::bind_channel;
