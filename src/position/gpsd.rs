//! # gpsd Position Source
//!
//! Reads fixes from a gpsd daemon using its JSON watch protocol.
//!
//! After connecting, the client sends a `?WATCH` command and gpsd streams
//! one JSON report per line. Only `TPV` (time-position-velocity) reports
//! carry a fix; every other class is skipped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::source::PositionSource;
use super::{FixMode, PositionFix};
use crate::error::{RelayError, Result};

/// Command enabling JSON report streaming
pub const GPSD_WATCH_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true};\n";

/// Longest report line kept; longer lines are discarded up to their newline
pub const MAX_REPORT_LINE: usize = 64 * 1024;

/// One gpsd report line
#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TpvReport {
    #[serde(default)]
    mode: u8,
    // RFC 3339 string on current gpsd, float seconds on very old releases
    time: Option<serde_json::Value>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl TpvReport {
    fn timestamp(&self) -> f64 {
        match &self.time {
            Some(serde_json::Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => t.timestamp() as f64 + t.timestamp_subsec_nanos() as f64 / 1e9,
                Err(e) => {
                    debug!("unparsable gpsd time {:?}: {}", s, e);
                    f64::NAN
                }
            },
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    fn into_fix(self) -> PositionFix {
        let timestamp = self.timestamp();
        let has_lat_lon = self.lat.is_some() && self.lon.is_some();

        PositionFix {
            timestamp,
            latitude: self.lat.unwrap_or(f64::NAN),
            longitude: self.lon.unwrap_or(f64::NAN),
            mode: FixMode::from_gpsd(self.mode),
            has_lat_lon,
        }
    }
}

/// Parse one gpsd report line
///
/// # Returns
///
/// * `Ok(Some(fix))` - for a `TPV` report
/// * `Ok(None)` - for any other report class
///
/// # Errors
///
/// Returns error if the line is not valid JSON or lacks a `class`
pub fn parse_report(line: &str) -> Result<Option<PositionFix>> {
    match serde_json::from_str::<Report>(line.trim())? {
        Report::Tpv(tpv) => Ok(Some(tpv.into_fix())),
        Report::Other => Ok(None),
    }
}

/// Position source backed by a gpsd TCP connection
pub struct GpsdSource {
    reader: BufReader<OwnedReadHalf>,
    // kept so gpsd does not see the session half-closed
    _writer: OwnedWriteHalf,
    pending: Vec<u8>,
    // inside an overlong line, skipping to its newline
    discarding: bool,
    address: String,
}

impl std::fmt::Debug for GpsdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsdSource")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl GpsdSource {
    /// Connect to gpsd and enable streaming
    ///
    /// # Errors
    ///
    /// Returns error if the connection or the watch command fails
    pub async fn connect(address: &str, port: u16) -> Result<Self> {
        let address = format!("{}:{}", address, port);

        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| RelayError::Position(format!("could not connect to gpsd at {}: {}", address, e)))?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(GPSD_WATCH_COMMAND.as_bytes())
            .await
            .map_err(|e| RelayError::Position(format!("could not enable gpsd streaming: {}", e)))?;

        info!("Connected to gpsd at {}", address);

        Ok(Self {
            reader: BufReader::new(read_half),
            _writer: write_half,
            pending: Vec::new(),
            discarding: false,
            address,
        })
    }

    /// Address of the gpsd daemon
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PositionFix>> {
        // pending stays below MAX_REPORT_LINE, so the limit is never zero
        let limit = (MAX_REPORT_LINE - self.pending.len()) as u64;
        let mut bounded = (&mut self.reader).take(limit);

        // read_until keeps partial input in `pending` when the timeout fires
        let read = match tokio::time::timeout(timeout, bounded.read_until(b'\n', &mut self.pending)).await {
            Err(_elapsed) => return Ok(None),
            Ok(read) => read.map_err(|e| RelayError::Position(format!("could not read gpsd: {}", e)))?,
        };

        if read == 0 {
            return Err(RelayError::Position(format!("gpsd at {} closed the connection", self.address)));
        }

        if !self.pending.ends_with(b"\n") {
            if self.pending.len() >= MAX_REPORT_LINE {
                if !self.discarding {
                    warn!("gpsd report longer than {} bytes, discarding", MAX_REPORT_LINE);
                }
                self.pending.clear();
                self.discarding = true;
            }
            return Ok(None);
        }

        let line = std::mem::take(&mut self.pending);
        if self.discarding {
            self.discarding = false;
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&line);

        match parse_report(&line) {
            Ok(fix) => Ok(fix),
            Err(e) => {
                warn!("invalid gpsd report: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TPV_3D: &str = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"1970-01-01T00:16:40.000Z","ept":0.005,"lat":48.85,"lon":2.35,"alt":35.0}"#;

    #[test]
    fn test_parse_tpv_report() {
        let fix = parse_report(TPV_3D).unwrap().unwrap();

        assert_eq!(fix.mode, FixMode::ThreeD);
        assert!(fix.has_lat_lon);
        assert_eq!(fix.timestamp, 1000.0);
        assert_eq!(fix.latitude, 48.85);
        assert_eq!(fix.longitude, 2.35);
        assert!(fix.is_usable());
    }

    #[test]
    fn test_parse_tpv_fractional_time() {
        let line = r#"{"class":"TPV","mode":2,"time":"2024-03-01T12:00:00.250Z","lat":1.0,"lon":2.0}"#;
        let fix = parse_report(line).unwrap().unwrap();
        assert_eq!(fix.timestamp, 1_709_294_400.25);
        assert_eq!(fix.mode, FixMode::TwoD);
    }

    #[test]
    fn test_parse_tpv_numeric_time() {
        let line = r#"{"class":"TPV","mode":3,"time":1000.5,"lat":1.0,"lon":2.0}"#;
        let fix = parse_report(line).unwrap().unwrap();
        assert_eq!(fix.timestamp, 1000.5);
    }

    #[test]
    fn test_parse_tpv_without_position() {
        let line = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":1}"#;
        let fix = parse_report(line).unwrap().unwrap();

        assert_eq!(fix.mode, FixMode::NoFix);
        assert!(!fix.has_lat_lon);
        assert!(fix.timestamp.is_nan());
        assert!(!fix.is_usable());
    }

    #[test]
    fn test_parse_tpv_with_only_latitude() {
        let line = r#"{"class":"TPV","mode":2,"time":"2024-03-01T12:00:00Z","lat":1.0}"#;
        let fix = parse_report(line).unwrap().unwrap();
        assert!(!fix.has_lat_lon);
        assert!(!fix.is_usable());
    }

    #[test]
    fn test_parse_other_classes_are_skipped() {
        let version = r#"{"class":"VERSION","release":"3.25","proto_major":3,"proto_minor":15}"#;
        let sky = r#"{"class":"SKY","satellites":[]}"#;
        assert!(parse_report(version).unwrap().is_none());
        assert!(parse_report(sky).unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed_line() {
        assert!(parse_report("not json").is_err());
        assert!(parse_report(r#"{"mode":3}"#).is_err());
    }

    async fn fake_gpsd(lines: &'static [&'static str]) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut command = vec![0u8; GPSD_WATCH_COMMAND.len()];
            stream.read_exact(&mut command).await.unwrap();
            for line in lines {
                stream.write_all(line.as_bytes()).await.unwrap();
                stream.write_all(b"\n").await.unwrap();
            }
            String::from_utf8(command).unwrap()
        });

        (port, handle)
    }

    #[tokio::test]
    async fn test_source_reads_fixes_from_gpsd() {
        let (port, server) = fake_gpsd(&[r#"{"class":"VERSION","release":"3.25"}"#, TPV_3D]).await;

        let mut source = GpsdSource::connect("127.0.0.1", port).await.unwrap();
        assert_eq!(source.address(), format!("127.0.0.1:{}", port));

        let first = source.poll(Duration::from_secs(2)).await.unwrap();
        assert!(first.is_none(), "VERSION report carries no fix");

        let fix = source.poll(Duration::from_secs(2)).await.unwrap().unwrap();
        assert_eq!(fix.latitude, 48.85);

        assert_eq!(server.await.unwrap(), GPSD_WATCH_COMMAND);
    }

    #[tokio::test]
    async fn test_source_reports_closed_connection() {
        let (port, server) = fake_gpsd(&[]).await;

        let mut source = GpsdSource::connect("127.0.0.1", port).await.unwrap();
        server.await.unwrap();

        let result = source.poll(Duration::from_secs(2)).await;
        assert!(matches!(result, Err(RelayError::Position(_))));
    }

    #[tokio::test]
    async fn test_source_times_out_quietly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(stream);
        });

        let mut source = GpsdSource::connect("127.0.0.1", port).await.unwrap();
        let result = source.poll(Duration::from_millis(50)).await.unwrap();
        assert!(result.is_none());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_overlong_report_is_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut command = vec![0u8; GPSD_WATCH_COMMAND.len()];
            stream.read_exact(&mut command).await.unwrap();

            let mut flood = vec![b'x'; MAX_REPORT_LINE * 3];
            flood.push(b'\n');
            stream.write_all(&flood).await.unwrap();
            stream.write_all(TPV_3D.as_bytes()).await.unwrap();
            stream.write_all(b"\n").await.unwrap();
            stream
        });

        let mut source = GpsdSource::connect("127.0.0.1", port).await.unwrap();

        let mut fix = None;
        for _ in 0..32 {
            let polled = source.poll(Duration::from_secs(2)).await.unwrap();
            assert!(source.pending.len() <= MAX_REPORT_LINE);
            if polled.is_some() {
                fix = polled;
                break;
            }
        }

        let fix = fix.expect("report after the overlong line should be read");
        assert_eq!(fix.latitude, 48.85);
        assert!(!source.discarding);
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = GpsdSource::connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(RelayError::Position(_))));
    }
}
