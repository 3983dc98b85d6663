//! Record store seam.
//!
//! The relational persistence layer is an external collaborator. The worker
//! only needs unit-of-work semantics: open a session, `add` records, then
//! `commit` to make them durable. Either step may fail with [`StoreError`].
//!
//! Each delivery opens its own session, so concurrent deliveries never share
//! staged records. Write concurrency is the store's own business.

mod error;
mod in_memory;
mod record;

use async_trait::async_trait;

pub use error::StoreError;
pub use in_memory::InMemoryRecordStore;
pub use record::Group;

/// A unit of work against the record store.
#[async_trait]
pub trait StoreSession: Send {
    /// Stage a record for the next commit.
    async fn add(&mut self, group: Group) -> Result<(), StoreError>;

    /// Record that `message_id` is handled by this unit of work.
    ///
    /// The commit fails with [`StoreError::AlreadyProcessed`] if an earlier
    /// commit recorded the same id.
    async fn record_message(&mut self, message_id: &str) -> Result<(), StoreError>;

    /// Make every staged record durable.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Opens sessions against the record store.
pub trait RecordStore: Send + Sync {
    fn session(&self) -> Box<dyn StoreSession>;
}
