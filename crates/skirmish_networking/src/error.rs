//! # Networking Error Types
//!
//! Only [`TransportError::Bind`] at startup is fatal. Everything else is
//! logged and answered with a drop, a retransmission or a resync.

use skirmish_core::CoreError;
use skirmish_shared::{TopicError, UnitId};
use std::io;
use thiserror::Error;

/// A message that could not be decoded. Dropped and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the layout requires.
    #[error("truncated message: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the reader wanted.
        needed: usize,
        /// Bytes left.
        available: usize,
    },

    /// Header version is not ours.
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),

    /// Unknown message kind code.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// Unknown code inside a payload field.
    #[error("invalid {field} code {code}")]
    BadCode {
        /// Field being decoded.
        field: &'static str,
        /// Offending code.
        code: u8,
    },

    /// Encoded message would not fit in a datagram.
    #[error("payload of {0} bytes exceeds the datagram limit")]
    PayloadTooLarge(usize),

    /// Payload length disagrees with the header.
    #[error("header announces {announced} payload bytes, got {actual}")]
    LengthMismatch {
        /// Length in the header.
        announced: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Text field is not UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Sender id does not match the topic it arrived on.
    #[error("sender {sender} may not publish on {topic}")]
    IdentityMismatch {
        /// Claimed sender.
        sender: UnitId,
        /// Topic name.
        topic: String,
    },

    /// Message kind does not belong on this topic.
    #[error("{kind} message not allowed on {topic}")]
    UnexpectedKind {
        /// Kind name.
        kind: &'static str,
        /// Topic name.
        topic: String,
    },

    /// Topic name could not be parsed.
    #[error(transparent)]
    Topic(#[from] TopicError),
}

/// Failures of the underlying bus.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket I/O failed.
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),

    /// Operation needs a live link.
    #[error("transport is not connected")]
    NotConnected,

    /// The bus or broker was shut down.
    #[error("transport closed")]
    Closed,

    /// Could not open the socket at all.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        source: io::Error,
    },
}

/// Umbrella error of this crate.
#[derive(Error, Debug)]
pub enum NetError {
    /// Malformed message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Bus failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A broadcast was missed; a resync is needed.
    #[error("sequence gap from {sender}: expected {expected}, received {received}")]
    SequenceGap {
        /// Publisher of the broadcast stream.
        sender: UnitId,
        /// Next revision we expected.
        expected: u64,
        /// Revision that arrived.
        received: u64,
    },

    /// Rules handed to a node are unusable.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The peer went silent or the link dropped.
    #[error("session lost after {silent_ms} ms without traffic")]
    SessionLost {
        /// Silence before giving up.
        silent_ms: u64,
    },
}

/// Result type for networking operations.
pub type NetResult<T> = Result<T, NetError>;
