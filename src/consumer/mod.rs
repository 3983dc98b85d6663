//! Consumer side: the message pump and the group ingest handler.
//!
//! Per delivery:
//!
//! ```text
//! Delivered → Decoding → Persisting → Acknowledged
//!                │            │
//!                ▼            ▼
//!         Failed(decode) Failed(persist)   → fault handler, abandon
//! ```
//!
//! A delivery is completed only after its record is committed. If the
//! completion itself fails (say the lock expired) the record stays committed
//! and the broker may deliver the message again: delivery is at-least-once.
//! The group handler absorbs that redelivery by committing the message id
//! with the record: a message whose id is already recorded is completed
//! without a second write.
//!
//! ## Example
//!
//! ```ignore
//! use group_ingest::consumer::{subscribe, ConsumerOptions, GroupIngestHandler, LoggingFaultHandler};
//!
//! let subscription = subscribe(
//!     topic_client,
//!     Arc::new(GroupIngestHandler::new(store)),
//!     Arc::new(LoggingFaultHandler),
//!     ConsumerOptions::default().with_max_concurrent(4),
//! );
//!
//! // ... on shutdown signal ...
//! let stats = subscription.shutdown().await;
//! ```

mod fault;
mod group_handler;
mod handler;
mod options;
mod pump;

use std::sync::Arc;

use crate::bus::TopicClient;

pub use fault::{ExceptionAction, ExceptionContext, FaultHandler, LoggingFaultHandler};
pub use group_handler::GroupIngestHandler;
pub use handler::{DeliveryContext, MessageHandler, ProcessingError};
pub use options::ConsumerOptions;
pub use pump::{MessagePump, PumpStats, Subscription};

/// Register `handler` on the topic and start pumping messages to it.
pub fn subscribe(
    client: Arc<TopicClient>,
    handler: Arc<dyn MessageHandler>,
    fault_handler: Arc<dyn FaultHandler>,
    options: ConsumerOptions,
) -> Subscription {
    Subscription::spawn(MessagePump::new(client, handler, fault_handler, options))
}
