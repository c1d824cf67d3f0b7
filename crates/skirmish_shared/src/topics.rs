//! # Bus Topics
//!
//! Logical topic names used on the message bus:
//!
//! ```text
//! unit/<id>/event          unit    -> arbiter   game events, join, sync requests
//! unit/<id>/telemetry      unit    -> console   battery and status
//! arbiter/state            arbiter -> everyone  flag, score, phase, snapshots
//! arbiter/ack/<id>         arbiter -> unit      acks, welcome, commands, replay
//! session/heartbeat/<id>   any     -> arbiter   liveness
//! console/sync             console -> arbiter   snapshot broadcast request
//! ```
//!
//! Filters support `+` (exactly one level) and a trailing `#` (any suffix).

use crate::identity::UnitId;
use std::fmt;
use thiserror::Error;

/// Filter matching every unit's event topic.
pub const ALL_UNIT_EVENTS: &str = "unit/+/event";

/// Filter matching every unit's telemetry topic.
pub const ALL_UNIT_TELEMETRY: &str = "unit/+/telemetry";

/// Filter matching every heartbeat topic.
pub const ALL_HEARTBEATS: &str = "session/heartbeat/+";

/// Authoritative state broadcast topic.
pub const ARBITER_STATE: &str = "arbiter/state";

/// Consoles ask for a snapshot broadcast here.
pub const CONSOLE_SYNC: &str = "console/sync";

/// Topic parse failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// Topic does not follow any known layout.
    #[error("unknown topic layout: {0}")]
    Unknown(String),

    /// Unit id segment is not a number.
    #[error("invalid unit id segment in topic: {0}")]
    BadUnitId(String),
}

/// A concrete (non-wildcard) topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `unit/<id>/event`
    UnitEvent(UnitId),
    /// `unit/<id>/telemetry`
    UnitTelemetry(UnitId),
    /// `arbiter/state`
    ArbiterState,
    /// `arbiter/ack/<id>`
    ArbiterAck(UnitId),
    /// `session/heartbeat/<id>`
    Heartbeat(UnitId),
    /// `console/sync`
    ConsoleSync,
}

impl Topic {
    /// Parses a concrete topic name.
    pub fn parse(name: &str) -> Result<Self, TopicError> {
        let parts: Vec<&str> = name.split('/').collect();
        match parts.as_slice() {
            ["unit", id, "event"] => Ok(Self::UnitEvent(parse_id(id, name)?)),
            ["unit", id, "telemetry"] => Ok(Self::UnitTelemetry(parse_id(id, name)?)),
            ["arbiter", "state"] => Ok(Self::ArbiterState),
            ["arbiter", "ack", id] => Ok(Self::ArbiterAck(parse_id(id, name)?)),
            ["session", "heartbeat", id] => Ok(Self::Heartbeat(parse_id(id, name)?)),
            ["console", "sync"] => Ok(Self::ConsoleSync),
            _ => Err(TopicError::Unknown(name.to_string())),
        }
    }

    /// The participant that is allowed to publish on this topic.
    #[must_use]
    pub const fn publisher(&self) -> UnitId {
        match self {
            Self::UnitEvent(id) | Self::UnitTelemetry(id) | Self::Heartbeat(id) => *id,
            // Consoles hold no unit id and publish under the reserved one.
            Self::ArbiterState | Self::ArbiterAck(_) | Self::ConsoleSync => UnitId::ARBITER,
        }
    }

    /// Returns the topic name.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitEvent(id) => write!(f, "unit/{id}/event"),
            Self::UnitTelemetry(id) => write!(f, "unit/{id}/telemetry"),
            Self::ArbiterState => f.write_str(ARBITER_STATE),
            Self::ArbiterAck(id) => write!(f, "arbiter/ack/{id}"),
            Self::Heartbeat(id) => write!(f, "session/heartbeat/{id}"),
            Self::ConsoleSync => f.write_str(CONSOLE_SYNC),
        }
    }
}

fn parse_id(segment: &str, topic: &str) -> Result<UnitId, TopicError> {
    segment
        .parse::<u32>()
        .map(UnitId)
        .map_err(|_| TopicError::BadUnitId(topic.to_string()))
}

/// Returns true if `topic` matches the subscription `filter`.
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
