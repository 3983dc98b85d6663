use thiserror::Error;

use crate::bus::TransportError;
use crate::envelope::EncodeError;

/// Failure to publish a domain event. The caller decides whether to retry.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to publish event: {0}")]
    Transport(#[from] TransportError),
}
