//! Group ingestion worker.
//!
//! Producers publish `GroupCreated` events to a topic inside a portable
//! envelope; a consumer pump receives them under peek-lock, persists each
//! group, and acknowledges only after the commit. An optional HTTP host
//! accepts new groups and serves the front-end shell.

pub mod bus;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod events;
pub mod producer;
pub mod store;
pub mod telemetry;
#[cfg(feature = "http")]
pub mod web;

pub use bus::{InMemoryBroker, TopicClient, TopicSettings, TransportError};
pub use consumer::{subscribe, ConsumerOptions, GroupIngestHandler, Subscription};
pub use envelope::{DecodeError, Envelope};
pub use events::{DomainEvent, GroupCreated};
pub use producer::{MessageService, TopicEventService};
pub use store::{InMemoryRecordStore, RecordStore};
