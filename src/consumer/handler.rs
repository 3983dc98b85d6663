use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::fault::ExceptionAction;
use crate::bus::{AcknowledgeError, Delivery, TopicClient};
use crate::envelope::DecodeError;
use crate::store::StoreError;

/// Why a delivery was not processed to completion.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
    /// Committed, but the broker did not accept the acknowledgement.
    /// The message may be delivered again.
    #[error("acknowledgement failed after commit: {0}")]
    Acknowledge(#[from] AcknowledgeError),
    /// Shutdown began before processing started; nothing was persisted.
    #[error("processing cancelled by shutdown")]
    Cancelled,
}

impl ProcessingError {
    /// The pump action to report alongside this error.
    pub fn action(&self) -> ExceptionAction {
        match self {
            ProcessingError::Acknowledge(_) => ExceptionAction::Complete,
            _ => ExceptionAction::UserCallback,
        }
    }

    /// Whether the delivery should be handed back to the broker.
    ///
    /// After a failed acknowledgement the lock is already gone.
    pub fn should_abandon(&self) -> bool {
        !matches!(self, ProcessingError::Acknowledge(_))
    }
}

/// Per-delivery state the pump passes to the handler.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    cancel: CancellationToken,
    auto_complete: bool,
}

impl DeliveryContext {
    pub fn new(cancel: CancellationToken, auto_complete: bool) -> Self {
        Self {
            cancel,
            auto_complete,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the handler has to complete the delivery itself. False when
    /// the pump completes it after the handler returns `Ok`.
    pub fn settles_manually(&self) -> bool {
        !self.auto_complete
    }
}

/// Handles one delivery at a time.
///
/// With manual acknowledgement the handler completes the delivery itself
/// through `client` once its work is durable.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        delivery: &Delivery,
        client: &TopicClient,
        context: &DeliveryContext,
    ) -> Result<(), ProcessingError>;
}
