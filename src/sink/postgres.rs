//! # PostgreSQL Sink
//!
//! Forwards telemetry into a PostgreSQL table.
//!
//! The connection is opened lazily and dropped after any error, so a sink
//! outage costs one failed insert per forwarding cycle and the next cycle
//! starts from a fresh connection. Each insert, connection setup
//! included, is bounded by `insert_timeout_secs`; a timed out insert
//! drops its connection like any other failure.

use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use super::TelemetrySink;
use crate::config::SinkConfig;
use crate::error::{RelayError, Result};
use crate::telemetry::TelemetryRecord;

/// PostgreSQL-backed telemetry sink
pub struct PostgresSink {
    config: tokio_postgres::Config,
    insert_sql: String,
    insert_timeout: Duration,
    client: Option<Client>,
}

impl std::fmt::Debug for PostgresSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSink")
            .field("insert_sql", &self.insert_sql)
            .field("connected", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

/// Build the insert statement for `table`
///
/// Parameters are cast explicitly so the statement works whether the
/// coordinate columns are `real` or `double precision`.
pub fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {} (client_name, client_ip, sender_ip, gps_tsp, gps_latitude, gps_longitude, packet_type) \
         VALUES ($1::text, $2::text, $3::text, $4::float8, $5::float8, $6::float8, $7::int4)",
        table
    )
}

impl PostgresSink {
    /// Create a sink; no connection is made until the first insert
    ///
    /// `config.table` must already be validated as a plain identifier.
    pub fn new(config: &SinkConfig) -> Self {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.dbname)
            .user(&config.user)
            .password(&config.password)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

        Self {
            config: pg,
            insert_sql: insert_statement(&config.table),
            insert_timeout: Duration::from_secs(config.insert_timeout_secs),
            client: None,
        }
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn connect(&self) -> Result<Client> {
        let (client, connection) = self.config.connect(NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("sink connection closed: {}", e);
            }
        });

        info!("Connected to sink database");
        Ok(client)
    }

    async fn insert_once(&mut self, record: &TelemetryRecord) -> Result<()> {
        let client = match self.client.take() {
            Some(client) if !client.is_closed() => client,
            _ => self.connect().await?,
        };

        let client_ip = record.client_channel_address.as_deref().unwrap_or("");
        let sender_ip = record.sender_address.as_deref().unwrap_or("");
        let packet_type = record.channel_type.code();

        client
            .execute(
                self.insert_sql.as_str(),
                &[
                    &record.client_name,
                    &client_ip,
                    &sender_ip,
                    &record.fix_timestamp,
                    &record.latitude,
                    &record.longitude,
                    &packet_type,
                ],
            )
            .await?;

        debug!("inserted {} record from {}", record.channel_type, sender_ip);

        // Keep the connection only after a clean round trip
        self.client = Some(client);
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for PostgresSink {
    async fn insert(&mut self, record: &TelemetryRecord) -> Result<()> {
        let limit = self.insert_timeout;
        match tokio::time::timeout(limit, self.insert_once(record)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Sink(format!(
                "insert timed out after {}s",
                limit.as_secs()
            ))),
        }
    }
}
