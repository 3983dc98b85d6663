//! Pipeline integration tests.
//!
//! Producer → in-memory broker → message pump → group handler → record store:
//! - End-to-end ingest with acknowledgement after commit
//! - Failure paths reported once to the fault handler, never acknowledged
//! - Concurrency bound on handler invocations
//! - Drain and release on shutdown

mod support;
mod failures;
