//! # Position Module
//!
//! Tracks the device's current position fix.
//!
//! This module handles:
//! - The position fix type and its usability rules
//! - The shared fix cache (one writer, many readers)
//! - Talking to gpsd as the position source
//! - The poller task that keeps the cache current

pub mod source;
pub mod gpsd;
pub mod poller;

use std::sync::Arc;

use tokio::sync::watch;

pub use gpsd::GpsdSource;
pub use poller::PositionPoller;
pub use source::PositionSource;

/// Fix quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixMode {
    /// No position solution
    #[default]
    NoFix,
    /// Latitude/longitude only
    TwoD,
    /// Latitude/longitude/altitude
    ThreeD,
}

impl FixMode {
    /// Map a gpsd `mode` value (0 = unknown, 1 = no fix, 2 = 2D, 3 = 3D)
    pub fn from_gpsd(mode: u8) -> Self {
        match mode {
            2 => FixMode::TwoD,
            3 => FixMode::ThreeD,
            _ => FixMode::NoFix,
        }
    }
}

/// Snapshot of the device's best position estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    /// Fix time, seconds since epoch (NaN if unknown)
    pub timestamp: f64,

    /// Latitude in degrees (NaN if unknown)
    pub latitude: f64,

    /// Longitude in degrees (NaN if unknown)
    pub longitude: f64,

    /// Fix quality
    pub mode: FixMode,

    /// Whether latitude and longitude were reported
    pub has_lat_lon: bool,
}

impl Default for PositionFix {
    fn default() -> Self {
        Self {
            timestamp: f64::NAN,
            latitude: f64::NAN,
            longitude: f64::NAN,
            mode: FixMode::NoFix,
            has_lat_lon: false,
        }
    }
}

impl PositionFix {
    /// Whether a position was reported at all
    pub fn has_position(&self) -> bool {
        self.has_lat_lon && self.mode != FixMode::NoFix
    }

    /// Whether this fix may be attached to a telemetry record
    ///
    /// Requires a reported position and finite timestamp, latitude and
    /// longitude.
    pub fn is_usable(&self) -> bool {
        self.has_position()
            && self.timestamp.is_finite()
            && self.latitude.is_finite()
            && self.longitude.is_finite()
    }
}

/// Latest position fix, shared between the poller and the listeners
///
/// Writes publish a whole new snapshot; readers always get a complete
/// fix. Staleness is not tracked.
#[derive(Debug, Clone)]
pub struct FixCache {
    tx: Arc<watch::Sender<PositionFix>>,
}

impl Default for FixCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FixCache {
    /// Create a cache holding the "nothing known" fix
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PositionFix::default());
        Self { tx: Arc::new(tx) }
    }

    /// Publish a new fix
    pub fn write(&self, fix: PositionFix) {
        self.tx.send_replace(fix);
    }

    /// Current fix
    pub fn read(&self) -> PositionFix {
        *self.tx.borrow()
    }
}
