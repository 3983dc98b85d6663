//! Topic bus: broker seam, topic client, and an in-memory broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TopicClient (per topic)                     │
//! │  - opens its connection lazily, exactly once                │
//! │  - publish() / receive() / complete() / abandon() / close() │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            ConnectionFactory + Connection traits            │
//! │  peek-lock receive, lock tokens, settle by token            │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                    │
//!          ▼                                    ▼
//! ┌──────────────────┐              ┌──────────────────────────┐
//! │ InMemoryBroker   │              │  Service Bus / AMQP / …  │
//! │   (included)     │              │       (external)         │
//! └──────────────────┘              └──────────────────────────┘
//! ```

mod connection;
mod in_memory;
mod topic_client;

pub use connection::{
    AcknowledgeError, Connection, ConnectionFactory, Delivery, LockToken, TopicSettings,
    TransportError,
};
pub use in_memory::InMemoryBroker;
pub use topic_client::TopicClient;
