//! # Channel Sockets
//!
//! Creates the UDP socket of each network channel. Every socket sets
//! `SO_REUSEADDR` before binding.
//!
//! - direct: plain bind
//! - group: bind, then join the configured multicast group
//! - broadcast: bind with `SO_BROADCAST`; if the configured address does
//!   not exist on this host, retry once on the wildcard address
//!
//! The group channel deliberately has no bind fallback.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::telemetry::ChannelType;

fn socket_error(channel: ChannelType, address: impl ToString, source: io::Error) -> RelayError {
    RelayError::Socket {
        channel,
        address: address.to_string(),
        source,
    }
}

fn bind(channel: ChannelType, address: &str, port: u16) -> Result<UdpSocket> {
    let ip = address.parse::<Ipv4Addr>().map_err(|e| {
        socket_error(
            channel,
            format!("{}:{}", address, port),
            io::Error::new(io::ErrorKind::InvalidInput, e),
        )
    })?;
    let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| socket_error(channel, addr, e))?;
    socket
        .set_reuse_address(true)
        .and_then(|_| socket.set_nonblocking(true))
        .and_then(|_| socket.bind(&SockAddr::from(addr)))
        .map_err(|e| socket_error(channel, addr, e))?;

    UdpSocket::from_std(socket.into()).map_err(|e| socket_error(channel, addr, e))
}

fn bind_broadcast(address: &str, port: u16) -> Result<UdpSocket> {
    let channel = ChannelType::Broadcast;

    let socket = match bind(channel, address, port) {
        Ok(socket) => socket,
        Err(RelayError::Socket { source, .. }) if source.kind() == io::ErrorKind::AddrNotAvailable => {
            error!(
                "could not create broadcast socket at {}, fallback to {}",
                address,
                Ipv4Addr::UNSPECIFIED
            );
            bind(channel, &Ipv4Addr::UNSPECIFIED.to_string(), port)?
        }
        Err(e) => return Err(e),
    };

    socket
        .set_broadcast(true)
        .map_err(|e| socket_error(channel, format!("{}:{}", address, port), e))?;
    Ok(socket)
}

/// Bind the socket of a network channel
///
/// # Arguments
///
/// * `channel` - Channel to bind (not [`ChannelType::Local`])
/// * `config` - Listen addresses and multicast group
///
/// # Errors
///
/// Returns `RelayError::Socket` if the socket cannot be created, bound or
/// configured. The caller treats this as fatal.
pub async fn bind_channel(channel: ChannelType, config: &Config) -> Result<UdpSocket> {
    let (address, port) = config.listen_address(channel).ok_or_else(|| {
        socket_error(
            channel,
            "-",
            io::Error::new(io::ErrorKind::InvalidInput, "channel has no socket"),
        )
    })?;

    let socket = match channel {
        ChannelType::Broadcast => bind_broadcast(address, port)?,
        ChannelType::Group => {
            let socket = bind(channel, address, port)?;
            let group = config.group_address()?;
            socket
                .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
                .map_err(|e| socket_error(channel, group, e))?;
            info!("Joined multicast group {}", group);
            socket
        }
        _ => bind(channel, address, port)?,
    };

    info!(
        "{} socket bound to {}",
        channel,
        socket.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string())
    );
    Ok(socket)
}
