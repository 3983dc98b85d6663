//! Producer side: publish domain events to the topic.
//!
//! ## Example
//!
//! ```ignore
//! use group_ingest::producer::{MessageService, TopicEventService};
//!
//! let service = TopicEventService::new(topic_client);
//! service.send(&GroupCreated::new("Surface", true)).await?;
//! ```

mod error;
mod service;

pub use error::SendError;
pub use service::{MessageService, TopicEventService};
