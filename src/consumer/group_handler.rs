use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::handler::{DeliveryContext, MessageHandler, ProcessingError};
use crate::bus::{Delivery, TopicClient};
use crate::envelope;
use crate::events::GroupCreated;
use crate::store::{Group, RecordStore, StoreError};

/// Persists `GroupCreated` events and completes each delivery after commit.
///
/// Delivery flow: decode → validate → add + commit → complete. Any failure
/// before the commit returns without completing, so the broker can redeliver.
///
/// The envelope id is committed together with the record. A commit rejected
/// because that id is already recorded means an earlier delivery of the same
/// message was committed but never acknowledged; the delivery is completed
/// without writing again. Any other commit failure, a duplicate group name
/// included, is returned and the delivery is left unacknowledged.
///
/// When the pump auto-completes, the handler leaves completion to it.
pub struct GroupIngestHandler<S> {
    store: S,
}

impl<S: RecordStore> GroupIngestHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn validate(event: GroupCreated) -> Result<Group, ProcessingError> {
        if event.name.trim().is_empty() {
            return Err(ProcessingError::Rejected("group name must not be empty".into()));
        }
        Ok(Group::from(event))
    }

    async fn persist(&self, group: Group, message_id: &str) -> Result<(), ProcessingError> {
        let name = group.name.clone();
        let mut session = self.store.session();
        session.add(group).await?;
        session.record_message(message_id).await?;
        match session.commit().await {
            Ok(()) => {
                info!(group = %name, "Added group to the record store");
                Ok(())
            }
            Err(StoreError::AlreadyProcessed { message_id }) => {
                warn!(%message_id, group = %name, "Message already persisted, skipping the write");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<S: RecordStore> MessageHandler for GroupIngestHandler<S> {
    async fn handle(
        &self,
        delivery: &Delivery,
        client: &TopicClient,
        context: &DeliveryContext,
    ) -> Result<(), ProcessingError> {
        info!(
            sequence_number = delivery.sequence_number,
            delivery_count = delivery.delivery_count,
            message_id = %delivery.envelope.id,
            body = %delivery.envelope.payload_base64(),
            "Received message"
        );

        let event: GroupCreated = envelope::decode_event(&delivery.envelope)?;
        let group = Self::validate(event)?;

        // Once persistence starts it runs to completion.
        if context.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }
        self.persist(group, &delivery.envelope.id).await?;

        if context.settles_manually() {
            client.complete(&delivery.lock_token).await?;
            debug!(sequence_number = delivery.sequence_number, "Completed delivery");
        }
        Ok(())
    }
}
