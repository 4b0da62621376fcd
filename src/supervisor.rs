//! # Supervisor
//!
//! Wires the relay together and watches its tasks.
//!
//! Startup acquires every resource up front (queue, gpsd connection,
//! channel sockets), so a misconfigured relay fails before any task runs.
//! After that the relay is a set of independent tokio tasks:
//!
//! | Task        | Count | Ends only on           |
//! |-------------|-------|------------------------|
//! | listener    | 3     | socket wait failure    |
//! | poller      | 1     | gpsd stream failure    |
//! | local       | 0..1  | never                  |
//! | forwarder   | 1     | never                  |
//!
//! The first task to end, for whatever reason, ends the relay.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::ingest::{IngestContext, Listener, LocalReporter};
use crate::position::{FixCache, GpsdSource, PositionPoller};
use crate::queue::{DurableQueue, Forwarder};
use crate::sink::PostgresSink;
use crate::telemetry::ChannelType;

type TaskOutcome = (&'static str, Result<()>);

/// Running relay
pub struct Relay {
    tasks: JoinSet<TaskOutcome>,
}

impl Relay {
    fn new() -> Self {
        Self { tasks: JoinSet::new() }
    }

    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Acquire all resources and start every task
    ///
    /// # Errors
    ///
    /// Returns error if the queue cannot be opened, gpsd cannot be reached
    /// or a channel socket cannot be bound.
    pub async fn start(config: &Config) -> Result<Self> {
        let queue = DurableQueue::open(&config.queue.path)?;
        let cache = FixCache::new();

        let gpsd = GpsdSource::connect(&config.gpsd.address, config.gpsd.port).await?;

        let ctx = IngestContext::new(config, cache.clone(), queue.clone());
        let mut listeners = Vec::with_capacity(ChannelType::NETWORK.len());
        for channel in ChannelType::NETWORK {
            listeners.push(Listener::bind(channel, config, ctx.clone()).await?);
        }

        let mut relay = Self::new();

        for listener in listeners {
            relay.spawn(listener.channel().label(), listener.run());
        }

        relay.spawn(
            "poller",
            PositionPoller::new(gpsd, cache.clone(), config.poll_timeout()).run(),
        );

        if config.local.enabled {
            relay.spawn(
                "local",
                LocalReporter::new(&config.client.name, cache, queue.clone(), config.local_interval()).run(),
            );
        }

        relay.spawn(
            "forwarder",
            Forwarder::new(
                queue,
                PostgresSink::new(&config.sink),
                config.queue.batch_size,
                config.forward_interval(),
            )
            .run(),
        );

        info!("Relay started with {} tasks", relay.tasks.len());
        Ok(relay)
    }

    /// Wait for the first task to end
    ///
    /// Every task is meant to run forever, so any return is an error:
    /// the task's own error if it failed, `RelayError::Task` otherwise.
    pub async fn run(mut self) -> Result<()> {
        let outcome = match self.tasks.join_next().await {
            Some(outcome) => outcome,
            None => return Err(RelayError::Task("no tasks running".to_string())),
        };

        let err = match outcome {
            Ok((name, Ok(()))) => RelayError::Task(format!("{} task stopped", name)),
            Ok((name, Err(e))) => {
                error!("{} task failed: {}", name, e);
                e
            }
            Err(e) => RelayError::Task(e.to_string()),
        };

        self.tasks.shutdown().await;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failing_task_ends_relay_with_its_error() {
        let mut relay = Relay::new();
        relay.spawn("forever", std::future::pending());
        relay.spawn("poller", async {
            Err::<(), _>(RelayError::Position("gpsd closed the connection".to_string()))
        });

        let result = tokio::time::timeout(Duration::from_secs(2), relay.run()).await.unwrap();
        assert!(matches!(result, Err(RelayError::Position(_))));
    }

    #[tokio::test]
    async fn test_stopped_task_is_an_error() {
        let mut relay = Relay::new();
        relay.spawn("forever", std::future::pending());
        relay.spawn("ucast", async { Ok::<(), RelayError>(()) });

        let result = relay.run().await;
        match result {
            Err(RelayError::Task(msg)) => assert!(msg.contains("ucast")),
            other => panic!("Expected Task error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_task_is_an_error() {
        let mut relay = Relay::new();
        relay.spawn("forwarder", async {
            if true {
                panic!("boom");
            }
            Ok::<(), RelayError>(())
        });

        assert!(matches!(relay.run().await, Err(RelayError::Task(_))));
    }

    #[tokio::test]
    async fn test_empty_relay_is_an_error() {
        assert!(Relay::new().run().await.is_err());
    }

    #[tokio::test]
    async fn test_start_fails_without_gpsd() {
        let dir = tempfile::TempDir::new().unwrap();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut config = Config::default();
        config.queue.path = dir.path().join("queue.db").to_string_lossy().into_owned();
        config.gpsd.port = port;

        let result = Relay::start(&config).await;
        assert!(matches!(result, Err(RelayError::Position(_))));
    }

    #[tokio::test]
    async fn test_start_fails_on_unopenable_queue() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.queue.path = dir.path().join("missing").join("queue.db").to_string_lossy().into_owned();

        let result = Relay::start(&config).await;
        assert!(matches!(result, Err(RelayError::Queue(_))));
    }
}
