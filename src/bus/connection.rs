//! Broker seam: connection factory, connection, deliveries, and errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::Envelope;

/// Connection details for one topic/queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSettings {
    /// Broker connection string, e.g. `Endpoint=sb://host/;SharedAccessKey=...`
    pub connection_string: String,
    /// Topic or queue the client binds to
    pub topic: String,
}

impl TopicSettings {
    pub fn new(connection_string: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            topic: topic.into(),
        }
    }

    /// The endpoint named by the connection string.
    ///
    /// Uses the `Endpoint=` segment when present, otherwise the whole string.
    pub fn endpoint(&self) -> &str {
        self.connection_string
            .split(';')
            .find_map(|segment| {
                let (key, value) = segment.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("endpoint")
                    .then(|| value.trim())
            })
            .unwrap_or(&self.connection_string)
    }
}

/// Broker-issued handle for one delivered-but-unsettled message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed to a consumer under a peek-lock.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    /// Required to complete or abandon this specific delivery
    pub lock_token: LockToken,
    /// Broker-assigned position of the message on the topic
    pub sequence_number: u64,
    /// How many times this message has been delivered, including this one
    pub delivery_count: u32,
}

/// Publish or connection failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("broker rejected the message: {0}")]
    Rejected(String),
    #[error("topic client is closed")]
    Closed,
}

/// Failure to settle a delivery with the broker.
#[derive(Debug, Error)]
pub enum AcknowledgeError {
    /// The lock expired or the token is unknown; the message may be redelivered.
    #[error("lock {0} was lost before the delivery could be settled")]
    LockLost(LockToken),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Opens connections to a broker.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection bound to the given topic.
    async fn connect(&self, settings: &TopicSettings) -> Result<Arc<dyn Connection>, TransportError>;
}

/// A live connection to one topic with peek-lock receive semantics.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send an envelope to the topic.
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Receive the next message under a lock, waiting up to `max_wait`.
    async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, TransportError>;

    /// Complete a delivery so it is not delivered again.
    async fn complete(&self, lock_token: &LockToken) -> Result<(), AcknowledgeError>;

    /// Release a delivery so it becomes eligible for redelivery.
    async fn abandon(&self, lock_token: &LockToken) -> Result<(), AcknowledgeError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
