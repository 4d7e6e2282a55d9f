//! # Messaging Module
//!
//! Wire envelopes and typed messages for the single bidirectional channel
//! between a caller and the background worker.

pub mod envelope;
pub mod message;

pub use envelope::{EnvelopeMeta, InboundEnvelope};
pub use message::*;
