//! # Telemetry Module
//!
//! The telemetry record produced for every accepted heartbeat (or local
//! poll tick) and stored in the durable queue until it is forwarded.

use std::fmt;
use std::net::IpAddr;

use tracing::warn;

use crate::position::PositionFix;

/// Longest client name kept in a record (bytes)
pub const MAX_CLIENT_NAME_LEN: usize = 15;

/// Longest textual address kept in a record (IPv6 textual maximum)
pub const MAX_ADDRESS_LEN: usize = 45;

/// Delivery channel a record originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Direct poll of the position source, no datagram involved
    Local,
    /// Unicast datagrams, acknowledged by echo
    Direct,
    /// Multicast datagrams
    Group,
    /// Broadcast datagrams
    Broadcast,
}

impl ChannelType {
    /// The three network channels, in startup order
    pub const NETWORK: [ChannelType; 3] = [ChannelType::Direct, ChannelType::Broadcast, ChannelType::Group];

    /// Numeric code stored in the queue and sent to the sink
    pub fn code(self) -> i32 {
        match self {
            ChannelType::Local => 0,
            ChannelType::Direct => 1,
            ChannelType::Group => 2,
            ChannelType::Broadcast => 3,
        }
    }

    /// Inverse of [`ChannelType::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ChannelType::Local),
            1 => Some(ChannelType::Direct),
            2 => Some(ChannelType::Group),
            3 => Some(ChannelType::Broadcast),
            _ => None,
        }
    }

    /// Short label used in log lines
    pub fn label(self) -> &'static str {
        match self {
            ChannelType::Local => "local",
            ChannelType::Direct => "ucast",
            ChannelType::Group => "mcast",
            ChannelType::Broadcast => "bcast",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One telemetry record
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Configured name of this relay
    pub client_name: String,

    /// Configured listen address of the receiving channel (`None` for local)
    pub client_channel_address: Option<String>,

    /// Source address of the datagram (`None` for local)
    pub sender_address: Option<String>,

    /// Fix time, seconds since epoch
    pub fix_timestamp: f64,

    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Channel the record came from
    pub channel_type: ChannelType,
}

impl TelemetryRecord {
    /// Build a record for a datagram received on a network channel
    ///
    /// # Arguments
    ///
    /// * `client_name` - Configured relay name
    /// * `channel` - Receiving channel
    /// * `channel_address` - Configured listen address of that channel
    /// * `sender` - Source address of the datagram
    /// * `fix` - Position fix to attach
    pub fn from_datagram(
        client_name: &str,
        channel: ChannelType,
        channel_address: &str,
        sender: IpAddr,
        fix: &PositionFix,
    ) -> Self {
        Self {
            client_name: bounded("client_name", client_name, MAX_CLIENT_NAME_LEN),
            client_channel_address: Some(bounded("client_channel_address", channel_address, MAX_ADDRESS_LEN)),
            sender_address: Some(bounded("sender_address", &sender.to_string(), MAX_ADDRESS_LEN)),
            fix_timestamp: fix.timestamp,
            latitude: fix.latitude,
            longitude: fix.longitude,
            channel_type: channel,
        }
    }

    /// Build a record for a local poll tick (no addresses)
    pub fn local(client_name: &str, fix: &PositionFix) -> Self {
        Self {
            client_name: bounded("client_name", client_name, MAX_CLIENT_NAME_LEN),
            client_channel_address: None,
            sender_address: None,
            fix_timestamp: fix.timestamp,
            latitude: fix.latitude,
            longitude: fix.longitude,
            channel_type: ChannelType::Local,
        }
    }
}

/// Fit a string field into `max_len` bytes
///
/// Truncates at a character boundary and logs a warning naming the field
/// when anything was cut.
pub fn bounded(field: &str, value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }

    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }

    warn!("{} truncated to {} bytes: {:?}", field, max_len, value);
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FixMode;
    use std::net::Ipv4Addr;

    fn fix() -> PositionFix {
        PositionFix {
            timestamp: 1000.0,
            latitude: 48.85,
            longitude: 2.35,
            mode: FixMode::ThreeD,
            has_lat_lon: true,
        }
    }

    #[test]
    fn test_channel_codes_round_trip() {
        for channel in [ChannelType::Local, ChannelType::Direct, ChannelType::Group, ChannelType::Broadcast] {
            assert_eq!(ChannelType::from_code(channel.code()), Some(channel));
        }
        assert_eq!(ChannelType::from_code(4), None);
        assert_eq!(ChannelType::from_code(-1), None);
    }

    #[test]
    fn test_channel_codes_are_stable() {
        assert_eq!(ChannelType::Local.code(), 0);
        assert_eq!(ChannelType::Direct.code(), 1);
        assert_eq!(ChannelType::Group.code(), 2);
        assert_eq!(ChannelType::Broadcast.code(), 3);
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(ChannelType::Direct.to_string(), "ucast");
        assert_eq!(ChannelType::Group.to_string(), "mcast");
        assert_eq!(ChannelType::Broadcast.to_string(), "bcast");
        assert_eq!(ChannelType::Local.to_string(), "local");
    }

    #[test]
    fn test_bounded_keeps_short_values() {
        assert_eq!(bounded("f", "abc", 15), "abc");
        assert_eq!(bounded("f", "", 0), "");
        assert_eq!(bounded("f", "exactly-fifteen", 15), "exactly-fifteen");
    }

    #[test]
    fn test_bounded_truncates_long_values() {
        assert_eq!(bounded("f", "a-very-long-client-name", 15), "a-very-long-cli");
    }

    #[test]
    fn test_bounded_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 4 would split it
        assert_eq!(bounded("f", "abcé", 4), "abc");
    }

    #[test]
    fn test_record_from_datagram() {
        let sender = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
        let record = TelemetryRecord::from_datagram("relay-1", ChannelType::Group, "0.0.0.0", sender, &fix());

        assert_eq!(record.client_name, "relay-1");
        assert_eq!(record.client_channel_address.as_deref(), Some("0.0.0.0"));
        assert_eq!(record.sender_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(record.fix_timestamp, 1000.0);
        assert_eq!(record.latitude, 48.85);
        assert_eq!(record.longitude, 2.35);
        assert_eq!(record.channel_type, ChannelType::Group);
    }

    #[test]
    fn test_local_record_has_no_addresses() {
        let record = TelemetryRecord::local("relay-1", &fix());

        assert_eq!(record.channel_type, ChannelType::Local);
        assert!(record.client_channel_address.is_none());
        assert!(record.sender_address.is_none());
    }

    #[test]
    fn test_record_truncates_client_name() {
        let record = TelemetryRecord::local("name-longer-than-fifteen", &fix());
        assert_eq!(record.client_name.len(), MAX_CLIENT_NAME_LEN);
    }
}
