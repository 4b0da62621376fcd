//! # Error Types
//!
//! Custom error types for Heartbeat Relay using `thiserror`.

use thiserror::Error;

use crate::telemetry::ChannelType;

/// Reasons a datagram is rejected by the frame codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Datagram shorter than a full frame
    #[error("invalid frame length: {len} bytes (need {expected})")]
    TooShort { len: usize, expected: usize },

    /// Header magic does not match
    #[error("invalid header: 0x{0:04x}")]
    BadMagic(u16),

    /// Checksum field does not match the computed checksum
    #[error("invalid checksum: frame has 0x{received:04x}, computed 0x{computed:04x}")]
    ChecksumMismatch { received: u16, computed: u16 },
}

/// Main error type for Heartbeat Relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Frame rejected by the codec
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Socket setup failed for a channel
    #[error("Could not create {channel} socket on {address}: {source}")]
    Socket {
        channel: ChannelType,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket wait failed while listening
    #[error("{channel} listener failed: {source}")]
    Listener {
        channel: ChannelType,
        #[source]
        source: std::io::Error,
    },

    /// Durable queue storage errors
    #[error("Queue error: {0}")]
    Queue(#[from] rusqlite::Error),

    /// Corrupt row read back from the queue
    #[error("Corrupt queue row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    /// Remote sink rejected or could not receive a record
    #[error("Sink error: {0}")]
    Sink(String),

    /// Position source errors
    #[error("Position source error: {0}")]
    Position(String),

    /// JSON decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A supervised task ended unexpectedly
    #[error("Task failed: {0}")]
    Task(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_postgres::Error> for RelayError {
    fn from(e: tokio_postgres::Error) -> Self {
        RelayError::Sink(e.to_string())
    }
}

/// Result type alias for Heartbeat Relay
pub type Result<T> = std::result::Result<T, RelayError>;
