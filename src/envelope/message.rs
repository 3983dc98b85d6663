//! The envelope carried by the topic.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Property key holding the type discriminator of the payload.
pub const MESSAGE_TYPE: &str = "MessageType";

/// A message as it travels through the broker.
///
/// Envelopes are created at publish time and are not modified in transit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Unique identifier for this message
    pub id: String,
    /// Content kind marker (see [`super::CONTENT_KIND`])
    pub content_kind: String,
    /// Binary-safe encoding of exactly one serialized domain object
    pub payload: Vec<u8>,
    /// Application properties (e.g. `MessageType`)
    pub properties: HashMap<String, String>,
}

impl Envelope {
    /// Create an envelope with no properties.
    pub fn new(
        id: impl Into<String>,
        content_kind: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            content_kind: content_kind.into(),
            payload,
            properties: HashMap::new(),
        }
    }

    /// Set a property, replacing any previous value for the key.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The `MessageType` discriminator, if the producer set one.
    pub fn message_type(&self) -> Option<&str> {
        self.property(MESSAGE_TYPE)
    }

    /// Payload rendered as base64, for log lines.
    pub fn payload_base64(&self) -> String {
        STANDARD.encode(&self.payload)
    }
}
