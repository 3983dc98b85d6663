//! Wire envelope and codec.
//!
//! Every message on the topic travels as an [`Envelope`]: an id, a content
//! kind marker, a binary payload, and a bag of string properties. The payload
//! is produced in two layers so both ends of the topic agree on the format
//! regardless of runtime:
//!
//! ```text
//! domain value ──serde_json──▶ JSON text ──bitcode──▶ payload bytes
//! payload bytes ──bitcode──▶ JSON text ──serde_json──▶ domain value
//! ```
//!
//! The text layer keeps the payload readable across platforms; the binary
//! framing keeps it intact over transports that require opaque bodies.
//!
//! ## Example
//!
//! ```
//! use group_ingest::envelope::{self, Envelope};
//! use group_ingest::events::GroupCreated;
//!
//! let event = GroupCreated::new("Surface", true);
//! let message: Envelope = envelope::encode(&event).unwrap();
//! assert_eq!(message.content_kind, envelope::CONTENT_KIND);
//!
//! let decoded: GroupCreated = envelope::decode(&message).unwrap();
//! assert_eq!(decoded, event);
//! ```

mod codec;
mod message;

pub use codec::{decode, decode_event, encode, DecodeError, EncodeError, CONTENT_KIND};
pub use message::{Envelope, MESSAGE_TYPE};
