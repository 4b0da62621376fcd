//! # Channel Listener
//!
//! Receives heartbeat datagrams on one channel and turns each valid one
//! into a queued telemetry record.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::bind_channel;
use crate::config::Config;
use crate::error::{FrameError, RelayError, Result};
use crate::frame::{check_frame, FRAME_SIZE};
use crate::position::FixCache;
use crate::queue::DurableQueue;
use crate::telemetry::{ChannelType, TelemetryRecord};

/// State shared by every listener
#[derive(Debug, Clone)]
pub struct IngestContext {
    /// Relay name written into every record
    pub client_name: String,
    /// Whether header and checksum are checked
    pub validation: bool,
    /// Latest position fix
    pub cache: FixCache,
    /// Where records are stored
    pub queue: DurableQueue,
}

impl IngestContext {
    pub fn new(config: &Config, cache: FixCache, queue: DurableQueue) -> Self {
        Self {
            client_name: config.client.name.clone(),
            validation: config.protocol.validation,
            cache,
            queue,
        }
    }
}

/// What became of one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Frame failed the length, header or checksum check
    Rejected(FrameError),
    /// No usable position fix; nothing was stored
    NoFix,
    /// Stored under this queue id
    Queued(i64),
    /// The queue refused the record
    QueueFailed,
}

/// Listener for one network channel
pub struct Listener {
    channel: ChannelType,
    socket: UdpSocket,
    channel_address: String,
    ctx: IngestContext,
}

impl Listener {
    /// Wrap an already bound socket
    pub fn new(channel: ChannelType, socket: UdpSocket, channel_address: impl Into<String>, ctx: IngestContext) -> Self {
        Self {
            channel,
            socket,
            channel_address: channel_address.into(),
            ctx,
        }
    }

    /// Bind the channel's socket as configured and wrap it
    pub async fn bind(channel: ChannelType, config: &Config, ctx: IngestContext) -> Result<Self> {
        let socket = bind_channel(channel, config).await?;
        let address = config
            .listen_address(channel)
            .map(|(address, _)| address.to_string())
            .unwrap_or_default();
        Ok(Self::new(channel, socket, address, ctx))
    }

    pub fn channel(&self) -> ChannelType {
        self.channel
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive forever
    ///
    /// A failed receive is logged and skipped. Only a failure to wait on
    /// the socket ends the loop.
    pub async fn run(self) -> Result<()> {
        info!("Listening for {} heartbeats on {}", self.channel, self.channel_address);

        let mut buf = [0u8; FRAME_SIZE];
        loop {
            self.socket.readable().await.map_err(|source| RelayError::Listener {
                channel: self.channel,
                source,
            })?;

            let (len, src) = match self.socket.try_recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!("type={} recvfrom failed: {}", self.channel.label(), e);
                    continue;
                }
            };

            self.handle_datagram(&buf[..len], src).await;
        }
    }

    /// Process one received datagram
    ///
    /// Direct-channel frames that pass the checks are echoed to the sender
    /// before the record is built. Echo failures are only logged.
    pub async fn handle_datagram(&self, datagram: &[u8], src: SocketAddr) -> Ingested {
        let label = self.channel.label();

        if let Err(e) = check_frame(datagram, self.ctx.validation) {
            warn!("type={} addr={} {}", label, src.ip(), e);
            return Ingested::Rejected(e);
        }

        if self.channel == ChannelType::Direct {
            if let Err(e) = self.socket.send_to(&datagram[..FRAME_SIZE], src).await {
                warn!("type={} addr={} ack failed: {}", label, src, e);
            }
        }

        debug!("type={} addr={} heartbeat received", label, src.ip());

        let fix = self.ctx.cache.read();
        if !fix.has_position() {
            warn!("type={} addr={} no data from gpsd", label, src.ip());
            return Ingested::NoFix;
        }
        if !fix.is_usable() {
            warn!("type={} addr={} invalid gps value (NaN)", label, src.ip());
            return Ingested::NoFix;
        }

        let record = TelemetryRecord::from_datagram(
            &self.ctx.client_name,
            self.channel,
            &self.channel_address,
            src.ip(),
            &fix,
        );

        match self.ctx.queue.enqueue(&record).await {
            Ok(id) => Ingested::Queued(id),
            Err(e) => {
                error!("type={} addr={} could not queue record: {}", label, src.ip(), e);
                Ingested::QueueFailed
            }
        }
    }
}
