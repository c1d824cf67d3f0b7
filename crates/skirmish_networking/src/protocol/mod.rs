//! # Network Protocol
//!
//! Binary message definitions and the codec.
//!
//! ## Message Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (12 bytes)                                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Sender (4) │ Sequence (4) │ Kind (1) │ Version (1) │ Len (2) │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (variable, max 1180 bytes)                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! - `(sender, sequence)` identifies a message for deduplication
//! - Critical messages are retransmitted until acknowledged
//! - Arbiter broadcasts carry a revision for gap detection

mod codec;
mod packets;
mod serialization;

pub use codec::Codec;
pub use packets::{
    Ack, CommandBody, Envelope, JoinRequest, Message, MessageHeader, MessageKind, StateUpdate, Telemetry, Welcome,
    PROTOCOL_VERSION,
};
pub use serialization::{PayloadReader, PayloadWriter, MAX_PAYLOAD_SIZE};
