use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::SendError;
use crate::bus::TopicClient;
use crate::envelope::{self, MESSAGE_TYPE};
use crate::events::{DomainEvent, GroupCreated};

/// Publishes group events. The HTTP layer depends on this seam.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn send(&self, event: &GroupCreated) -> Result<(), SendError>;
}

/// Publishes domain events through a [`TopicClient`], one send per call.
pub struct TopicEventService {
    client: Arc<TopicClient>,
}

impl TopicEventService {
    pub fn new(client: Arc<TopicClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<TopicClient> {
        &self.client
    }

    /// Encode `event`, tag it with its `MessageType`, and publish it.
    ///
    /// Returns the id of the published envelope.
    pub async fn publish_event<E: DomainEvent>(&self, event: &E) -> Result<String, SendError> {
        let envelope = envelope::encode(event)?.with_property(MESSAGE_TYPE, E::MESSAGE_TYPE);
        let message_id = envelope.id.clone();
        self.client.publish(envelope).await?;
        info!(
            message_id = %message_id,
            message_type = E::MESSAGE_TYPE,
            topic = %self.client.settings().topic,
            "Published domain event"
        );
        Ok(message_id)
    }
}

#[async_trait]
impl MessageService for TopicEventService {
    async fn send(&self, event: &GroupCreated) -> Result<(), SendError> {
        self.publish_event(event).await.map(|_| ())
    }
}
