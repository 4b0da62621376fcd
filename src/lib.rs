//! # Heartbeat Relay Library
//!
//! Receive field-device heartbeats over UDP, tag them with the current GPS
//! fix and store-and-forward them to PostgreSQL.
//!
//! Data flows one way:
//!
//! ```text
//! UDP (direct/group/broadcast) ─┐
//!                               ├─> durable queue (SQLite) ─> forwarder ─> PostgreSQL
//! local position tick ──────────┘
//!         ^
//!   fix cache <── gpsd poller
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod position;
pub mod queue;
pub mod sink;
pub mod supervisor;
pub mod telemetry;
