//! Two-layer envelope codec: JSON text wrapped in bitcode framing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::message::Envelope;
use crate::events::DomainEvent;

/// Content kind marker stamped on every encoded envelope.
pub const CONTENT_KIND: &str = "string";

/// Error raised while turning a domain value into an envelope.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize payload as JSON: {0}")]
    Text(#[source] serde_json::Error),
    #[error("failed to frame payload: {0}")]
    Framing(#[source] bitcode::Error),
}

/// Error raised while turning an envelope back into a domain value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload framing: {0}")]
    Framing(#[source] bitcode::Error),
    #[error("payload text does not match the expected shape: {0}")]
    Text(#[source] serde_json::Error),
    #[error("message type mismatch: expected {expected}, found {found}")]
    MessageType {
        expected: &'static str,
        found: String,
    },
}

/// Encode a domain value into a fresh envelope.
///
/// The envelope gets a new unique id and the [`CONTENT_KIND`] marker. The
/// `MessageType` property is left for the caller to set.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Envelope, EncodeError> {
    let text = serde_json::to_string(value).map_err(EncodeError::Text)?;
    let payload = bitcode::serialize(&text).map_err(EncodeError::Framing)?;
    Ok(Envelope::new(
        Uuid::new_v4().to_string(),
        CONTENT_KIND,
        payload,
    ))
}

/// Decode an envelope payload back into a domain value.
pub fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    let text: String = bitcode::deserialize(&envelope.payload).map_err(DecodeError::Framing)?;
    serde_json::from_str(&text).map_err(DecodeError::Text)
}

/// Decode an envelope into a domain event, checking its `MessageType`.
///
/// Envelopes without a `MessageType` property are decoded on shape alone.
pub fn decode_event<E: DomainEvent>(envelope: &Envelope) -> Result<E, DecodeError> {
    if let Some(found) = envelope.message_type() {
        if found != E::MESSAGE_TYPE {
            return Err(DecodeError::MessageType {
                expected: E::MESSAGE_TYPE,
                found: found.to_string(),
            });
        }
    }
    decode(envelope)
}
