//! Topic client with a lazily opened, shared connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::connection::{
    AcknowledgeError, Connection, ConnectionFactory, Delivery, LockToken, TopicSettings,
    TransportError,
};
use crate::envelope::Envelope;

/// Client for one topic.
///
/// The connection is not opened at construction. The first operation opens
/// it through the factory, and every later operation reuses it. Concurrent
/// first callers share a single connect attempt; a failed attempt leaves the
/// cell empty so the next caller tries again.
///
/// ## Example
///
/// ```ignore
/// let client = TopicClient::new(TopicSettings::new(conn_str, "groups"), factory);
/// client.publish(envelope).await?;
/// client.close().await?;
/// ```
pub struct TopicClient {
    settings: TopicSettings,
    factory: Arc<dyn ConnectionFactory>,
    connection: OnceCell<Arc<dyn Connection>>,
    closed: AtomicBool,
}

impl TopicClient {
    pub fn new(settings: TopicSettings, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            settings,
            factory,
            connection: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &TopicSettings {
        &self.settings
    }

    /// Whether a connection has been opened yet.
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn connection(&self) -> Result<&Arc<dyn Connection>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let connection = self
            .connection
            .get_or_try_init(|| async {
                info!(
                    endpoint = %self.settings.endpoint(),
                    topic = %self.settings.topic,
                    "Opening topic connection"
                );
                self.factory.connect(&self.settings).await
            })
            .await?;
        // `close` may have run while the connect was in flight and found the
        // cell empty; the connection it missed is closed here.
        if self.is_closed() {
            debug!(topic = %self.settings.topic, "Client closed during connect, releasing connection");
            connection.close().await?;
            return Err(TransportError::Closed);
        }
        Ok(connection)
    }

    /// Send an envelope. No retry happens at this layer.
    #[instrument(skip(self, envelope), fields(topic = %self.settings.topic, message_id = %envelope.id))]
    pub async fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.connection().await?.send(envelope).await?;
        debug!("Published message");
        Ok(())
    }

    /// Receive the next delivery, waiting up to `max_wait`.
    pub async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, TransportError> {
        self.connection().await?.receive(max_wait).await
    }

    /// Complete a delivery using its lock token.
    pub async fn complete(&self, lock_token: &LockToken) -> Result<(), AcknowledgeError> {
        self.connection().await?.complete(lock_token).await
    }

    /// Abandon a delivery using its lock token.
    pub async fn abandon(&self, lock_token: &LockToken) -> Result<(), AcknowledgeError> {
        self.connection().await?.abandon(lock_token).await
    }

    /// Release the connection. Later operations fail with [`TransportError::Closed`].
    ///
    /// A connect still in flight is released by the operation that started it.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.connection.get() {
            Some(connection) => {
                info!(topic = %self.settings.topic, "Closing topic connection");
                connection.close().await
            }
            None => Ok(()),
        }
    }
}
