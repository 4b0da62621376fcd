//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The configuration is read once at startup; components receive the
//! pieces they need and never change them afterwards.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RelayError, Result};
use crate::telemetry::{ChannelType, MAX_CLIENT_NAME_LEN};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub direct: DirectConfig,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub gpsd: GpsdConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay identity
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_client_name")]
    pub name: String,
}

/// Unicast channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DirectConfig {
    #[serde(default = "default_listen_address")]
    pub address: String,

    #[serde(default = "default_direct_port")]
    pub port: u16,
}

/// Multicast channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    #[serde(default = "default_listen_address")]
    pub address: String,

    #[serde(default = "default_group_port")]
    pub port: u16,

    #[serde(default = "default_group_address")]
    pub group_address: String,
}

/// Broadcast channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_listen_address")]
    pub address: String,

    #[serde(default = "default_broadcast_port")]
    pub port: u16,
}

/// Wire protocol options
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    #[serde(default = "default_validation")]
    pub validation: bool,
}

/// gpsd connection
#[derive(Debug, Deserialize, Clone)]
pub struct GpsdConfig {
    #[serde(default = "default_gpsd_address")]
    pub address: String,

    #[serde(default = "default_gpsd_port")]
    pub port: u16,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

/// Remote PostgreSQL sink
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_sink_host")]
    pub host: String,

    #[serde(default = "default_sink_port")]
    pub port: u16,

    #[serde(default = "default_sink_dbname")]
    pub dbname: String,

    #[serde(default = "default_sink_user")]
    pub user: String,

    #[serde(default = "default_sink_password")]
    pub password: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound on one insert, connection setup included
    #[serde(default = "default_insert_timeout_secs")]
    pub insert_timeout_secs: u64,

    #[serde(default = "default_sink_table")]
    pub table: String,
}

/// Durable queue and forwarding
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: String,

    /// Seconds between drain cycles; non-positive values fall back to the default
    #[serde(default = "default_forward_interval_secs")]
    pub forward_interval_secs: i64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Periodic records straight from the position source
#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    #[serde(default = "default_local_enabled")]
    pub enabled: bool,

    #[serde(default = "default_local_interval_secs")]
    pub interval_secs: u64,
}

/// Diagnostic log output
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; empty logs to stderr
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_client_name() -> String { "client-name".to_string() }
fn default_listen_address() -> String { "0.0.0.0".to_string() }
fn default_direct_port() -> u16 { 6000 }
fn default_group_port() -> u16 { 6001 }
fn default_group_address() -> String { "224.0.0.1".to_string() }
fn default_broadcast_port() -> u16 { 6002 }
fn default_validation() -> bool { true }

fn default_gpsd_address() -> String { "127.0.0.1".to_string() }
fn default_gpsd_port() -> u16 { 2947 }
fn default_poll_timeout_ms() -> u64 { 1000 }

fn default_sink_host() -> String { "127.0.0.1".to_string() }
fn default_sink_port() -> u16 { 5432 }
fn default_sink_dbname() -> String { "db-name".to_string() }
fn default_sink_user() -> String { "db-user".to_string() }
fn default_sink_password() -> String { "db-passwd".to_string() }
fn default_connect_timeout_secs() -> u64 { 3 }
fn default_insert_timeout_secs() -> u64 { 10 }
fn default_sink_table() -> String { "gpsclient".to_string() }

fn default_queue_path() -> String { "/tmp/gpsclient.db".to_string() }
fn default_forward_interval_secs() -> i64 { 10 }
fn default_batch_size() -> usize { 100 }

fn default_local_enabled() -> bool { true }
fn default_local_interval_secs() -> u64 { 5 }

fn default_log_level() -> String { "info".to_string() }

impl Default for DirectConfig {
    fn default() -> Self {
        Self { address: default_listen_address(), port: default_direct_port() }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { address: default_listen_address(), port: default_broadcast_port() }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { name: default_client_name() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            direct: DirectConfig::default(),
            group: GroupConfig::default(),
            broadcast: BroadcastConfig::default(),
            protocol: ProtocolConfig::default(),
            gpsd: GpsdConfig::default(),
            sink: SinkConfig::default(),
            queue: QueueConfig::default(),
            local: LocalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            port: default_group_port(),
            group_address: default_group_address(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self { validation: default_validation() }
    }
}

impl Default for GpsdConfig {
    fn default() -> Self {
        Self {
            address: default_gpsd_address(),
            port: default_gpsd_port(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            host: default_sink_host(),
            port: default_sink_port(),
            dbname: default_sink_dbname(),
            user: default_sink_user(),
            password: default_sink_password(),
            connect_timeout_secs: default_connect_timeout_secs(),
            insert_timeout_secs: default_insert_timeout_secs(),
            table: default_sink_table(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            forward_interval_secs: default_forward_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: default_local_enabled(),
            interval_secs: default_local_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> RelayError {
    RelayError::Config(toml::de::Error::custom(msg))
}

fn parse_ipv4(name: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| invalid(format!("{} is not a valid IPv4 address: {:?}", name, value)))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use heartbeat_relay::config::Config;
    ///
    /// let config = Config::load("config/relay.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Time between forwarding cycles
    ///
    /// A non-positive configured value falls back to the default of
    /// 10 seconds, so the result is always at least one second.
    pub fn forward_interval(&self) -> Duration {
        let secs = if self.queue.forward_interval_secs <= 0 {
            default_forward_interval_secs()
        } else {
            self.queue.forward_interval_secs
        };
        Duration::from_secs(secs as u64)
    }

    /// Longest single wait on gpsd
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.gpsd.poll_timeout_ms)
    }

    /// Time between local records
    pub fn local_interval(&self) -> Duration {
        Duration::from_secs(self.local.interval_secs)
    }

    /// Configured listen address and port of a network channel
    ///
    /// Returns `None` for [`ChannelType::Local`].
    pub fn listen_address(&self, channel: ChannelType) -> Option<(&str, u16)> {
        match channel {
            ChannelType::Direct => Some((&self.direct.address, self.direct.port)),
            ChannelType::Group => Some((&self.group.address, self.group.port)),
            ChannelType::Broadcast => Some((&self.broadcast.address, self.broadcast.port)),
            ChannelType::Local => None,
        }
    }

    /// Multicast group joined by the group channel
    pub fn group_address(&self) -> Result<Ipv4Addr> {
        parse_ipv4("group.group_address", &self.group.group_address)
    }

    /// Log the effective configuration at info level
    ///
    /// The sink password is never logged.
    pub fn log_summary(&self) {
        info!("client name: {}", self.client.name);
        info!("direct: {}:{}", self.direct.address, self.direct.port);
        info!(
            "group: {}:{} (group {})",
            self.group.address, self.group.port, self.group.group_address
        );
        info!("broadcast: {}:{}", self.broadcast.address, self.broadcast.port);
        info!("frame validation: {}", if self.protocol.validation { "on" } else { "off" });
        info!("gpsd: {}:{}", self.gpsd.address, self.gpsd.port);
        info!(
            "sink: {}@{}:{}/{} table {}",
            self.sink.user, self.sink.host, self.sink.port, self.sink.dbname, self.sink.table
        );
        info!(
            "queue: {} (every {}s, batch {})",
            self.queue.path,
            self.forward_interval().as_secs(),
            self.queue.batch_size
        );
        if self.local.enabled {
            info!("local position every {}s", self.local.interval_secs);
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.client.name.is_empty() || self.client.name.len() > MAX_CLIENT_NAME_LEN {
            return Err(invalid(format!(
                "client name must be 1 to {} bytes long",
                MAX_CLIENT_NAME_LEN
            )));
        }

        for channel in ChannelType::NETWORK {
            if let Some((address, port)) = self.listen_address(channel) {
                parse_ipv4(&format!("{} address", channel), address)?;
                if port == 0 {
                    return Err(invalid(format!("{} port cannot be 0", channel)));
                }
            }
        }

        if !self.group_address()?.is_multicast() {
            return Err(invalid(format!(
                "group.group_address must be a multicast address: {}",
                self.group.group_address
            )));
        }

        if !is_host(&self.gpsd.address) {
            return Err(invalid(format!(
                "gpsd.address must be a host name or IPv4 address: {:?}",
                self.gpsd.address
            )));
        }
        if self.gpsd.port == 0 {
            return Err(invalid("gpsd port cannot be 0"));
        }

        if self.gpsd.poll_timeout_ms == 0 || self.gpsd.poll_timeout_ms > 60000 {
            return Err(invalid("poll_timeout_ms must be between 1 and 60000"));
        }

        if self.sink.host.is_empty() {
            return Err(invalid("sink host cannot be empty"));
        }

        if self.sink.port == 0 {
            return Err(invalid("sink port cannot be 0"));
        }

        if self.sink.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs must be greater than 0"));
        }

        if self.sink.insert_timeout_secs == 0 {
            return Err(invalid("insert_timeout_secs must be greater than 0"));
        }

        if !is_sql_identifier(&self.sink.table) {
            return Err(invalid(format!(
                "sink table must be a plain identifier (letters, digits, '_'): {:?}",
                self.sink.table
            )));
        }

        if self.queue.path.is_empty() {
            return Err(invalid("queue path cannot be empty"));
        }

        if self.queue.batch_size == 0 || self.queue.batch_size > 10000 {
            return Err(invalid("batch_size must be between 1 and 10000"));
        }

        if self.local.enabled && self.local.interval_secs == 0 {
            return Err(invalid("local interval_secs must be greater than 0"));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!(
                "logging level must be one of trace, debug, info, warn, error: {:?}",
                self.logging.level
            )));
        }

        Ok(())
    }
}

/// Host name or dotted IPv4 address, without a port
fn is_host(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
