//! Broker connection management

use std::time::Duration;

use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use crate::broker::{BrokerError, BrokerResult, JOBS_QUEUE};

/// Handle to the Redis broker.
///
/// Cloning is cheap and clones share the underlying multiplexed
/// connection; concurrent submissions share one pool this way. Pub/sub
/// subscriptions get their own dedicated connection per call.
#[derive(Clone)]
pub struct RedisBroker {
    /// Client, kept for spawning pub/sub connections
    client: Client,

    /// Multiplexed connection shared by all command traffic
    manager: ConnectionManager,
}

impl RedisBroker {
    /// Connect to the broker and validate the connection with a PING
    pub async fn connect(url: &str) -> BrokerResult<Self> {
        let client =
            Client::open(url).map_err(|e| BrokerError::ConnectionError(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::ConnectionError(e.to_string()))?;

        let broker = Self { client, manager };
        broker.ping().await?;

        info!("Connected to broker: url={}", url);

        Ok(broker)
    }

    /// Connect, retrying with a 1-second delay until the broker answers or
    /// `cancel` fires. Each failed attempt is logged.
    pub async fn connect_with_retry(
        url: &str,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Option<Self> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match Self::connect(url).await {
                Ok(broker) => return Some(broker),
                Err(e) => {
                    warn!(
                        "Could not connect to broker on `{}` (attempt {}): {}, trying again in 1 second",
                        url, attempt, e
                    );
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    }

    /// Validate connectivity
    pub async fn ping(&self) -> BrokerResult<()> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::ConnectionError(e.to_string()))?;
        if pong != "PONG" {
            return Err(BrokerError::ConnectionError(
                "broker PING failed".to_string(),
            ));
        }
        Ok(())
    }

    /// Pop one envelope from the head of the queue, waiting up to
    /// `timeout`. Returns `None` when the wait elapsed with nothing queued.
    pub async fn pop_job(&self, timeout: Duration) -> BrokerResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let popped: Option<(String, Vec<u8>)> = conn
            .blpop(JOBS_QUEUE, timeout.as_secs_f64())
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))?;
        Ok(popped.map(|(_, payload)| payload))
    }

    /// Open a dedicated pub/sub connection subscribed to `channel`
    pub async fn subscribe(&self, channel: &str) -> BrokerResult<PubSub> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::ConnectionError(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))?;
        debug!("Subscribed to channel: {}", channel);
        Ok(pubsub)
    }

    pub(crate) fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }
}
