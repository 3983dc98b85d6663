//! Domain events carried on the topic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A value that can travel inside an envelope, tagged with a type discriminator.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync {
    /// Value written to the envelope's `MessageType` property.
    const MESSAGE_TYPE: &'static str;
}

/// A group was created and should be persisted by the ingest worker.
///
/// Field names are PascalCase on the wire so payloads stay compatible with
/// producers on other platforms; camelCase is accepted on decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupCreated {
    #[serde(alias = "name")]
    pub name: String,
    #[serde(alias = "isActive")]
    pub is_active: bool,
}

impl GroupCreated {
    pub fn new(name: impl Into<String>, is_active: bool) -> Self {
        Self {
            name: name.into(),
            is_active,
        }
    }
}

impl DomainEvent for GroupCreated {
    const MESSAGE_TYPE: &'static str = "GroupCreated";
}
