//! Agent communication protocol.
//!
//! This module defines the message unit exchanged between agents:
//! - Immutable envelopes with callback and correlation IDs
//! - Typed message kinds (request, response, event) and priorities
//!
//! Delivery is handled by [`crate::transport`].

pub mod envelope;
pub mod types;

pub use envelope::{Envelope, EnvelopeBuilder};
pub use types::{MessageType, Payload, Priority};
