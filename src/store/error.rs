use thiserror::Error;

/// Persistence failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A group with the same name is already stored (unique name index).
    #[error("a group named {name} already exists")]
    Duplicate { name: String },
    /// An earlier commit already recorded this message.
    #[error("message {message_id} was already processed")]
    AlreadyProcessed { message_id: String },
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("commit failed: {0}")]
    Commit(String),
}
