//! # Message Definitions
//!
//! Every message is a fixed 12-byte [`MessageHeader`] followed by a
//! kind-specific payload.

use bytemuck::{Pod, Zeroable};
use skirmish_core::{CaptureStatus, MatchSnapshot, StateDelta, UnitCommand, Verdict};
use skirmish_shared::{EventTag, FlagState, GameEvent, Team, UnitId};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message header - present in every message.
///
/// Total size: 12 bytes, little-endian on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MessageHeader {
    /// Sender id (0 = arbiter).
    pub sender: u32,
    /// Per-sender monotonic sequence number.
    pub sequence: u32,
    /// [`MessageKind`] code.
    pub kind: u8,
    /// Protocol version.
    pub version: u8,
    /// Payload length in bytes.
    pub payload_len: u16,
}

impl MessageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 12;

    /// Creates a header for the current protocol version.
    #[inline]
    #[must_use]
    pub const fn new(sender: UnitId, sequence: u32, kind: MessageKind, payload_len: u16) -> Self {
        Self {
            sender: sender.0,
            sequence,
            kind: kind as u8,
            version: PROTOCOL_VERSION,
            payload_len,
        }
    }

    /// Swaps multi-byte fields between host and wire order (a no-op on
    /// little-endian hosts). Applying it twice is the identity.
    #[inline]
    #[must_use]
    pub const fn to_wire_order(self) -> Self {
        Self {
            sender: self.sender.to_le(),
            sequence: self.sequence.to_le(),
            kind: self.kind,
            version: self.version,
            payload_len: self.payload_len.to_le(),
        }
    }
}

/// Types of messages in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Unit -> Arbiter: game event.
    Event = 1,
    /// Arbiter -> Unit: verdict on a critical event.
    Ack = 2,
    /// Arbiter -> All: state deltas under a revision.
    State = 3,
    /// Arbiter -> Unit: corrective command.
    Command = 4,
    /// Any -> Any: liveness.
    Heartbeat = 5,
    /// Unit -> Arbiter: registration request.
    Join = 6,
    /// Arbiter -> Unit: registration answer.
    Welcome = 7,
    /// Unit -> Arbiter: please send a snapshot and replay.
    SyncRequest = 8,
    /// Unit -> Console: status report.
    Telemetry = 9,
    /// Arbiter -> All/Unit: full authoritative state.
    Snapshot = 10,
}

impl MessageKind {
    /// Decodes a kind code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Event),
            2 => Some(Self::Ack),
            3 => Some(Self::State),
            4 => Some(Self::Command),
            5 => Some(Self::Heartbeat),
            6 => Some(Self::Join),
            7 => Some(Self::Welcome),
            8 => Some(Self::SyncRequest),
            9 => Some(Self::Telemetry),
            10 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Upper-case name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Event => "EVENT",
            Self::Ack => "ACK",
            Self::State => "STATE",
            Self::Command => "COMMAND",
            Self::Heartbeat => "HEARTBEAT",
            Self::Join => "JOIN",
            Self::Welcome => "WELCOME",
            Self::SyncRequest => "SYNC_REQUEST",
            Self::Telemetry => "TELEMETRY",
            Self::Snapshot => "SNAPSHOT",
        }
    }

    /// Whether receivers should drop repeats of this kind.
    ///
    /// The other kinds are idempotent and always processed.
    #[must_use]
    pub const fn is_deduplicated(self) -> bool {
        matches!(self, Self::Event | Self::Ack | Self::State | Self::Command)
    }
}

/// Verdict on a critical event, addressed to its sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack {
    /// Sequence of the acknowledged message.
    pub sequence: u32,
    /// Kind of event acknowledged.
    pub tag: EventTag,
    /// Verdict.
    pub verdict: Verdict,
    /// Flag state at decision time.
    pub flag: FlagState,
}

/// Deltas broadcast under one revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateUpdate {
    /// Monotonic broadcast revision.
    pub revision: u64,
    /// Changes in order.
    pub deltas: Vec<StateDelta>,
}

/// Corrective command plus the flag state it was issued under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandBody {
    /// What to do.
    pub command: UnitCommand,
    /// Flag at issue time.
    pub flag: FlagState,
}

/// Answer to a join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Welcome {
    /// Sequence of the join being answered.
    pub join_sequence: u32,
    /// Verdict.
    pub verdict: Verdict,
    /// Registered team.
    pub team: Team,
    /// QR payload of the team's base.
    pub base_code: String,
}

/// Periodic unit status for consoles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Telemetry {
    /// Battery charge, 0..=100.
    pub battery_percent: u8,
    /// Battery voltage in millivolts.
    pub battery_millivolts: u16,
    /// Capture sub-state.
    pub capture: CaptureStatus,
    /// Arbiter-confirmed possession.
    pub carrying: bool,
    /// Locked out by a hit.
    pub stunned: bool,
}

/// Registration request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    /// Requested team.
    pub team: Team,
    /// Chosen once per process start. A join carrying a new epoch means
    /// the sender's sequence numbers started over.
    pub epoch: u32,
}

/// A decoded message body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Game event.
    Event(GameEvent),
    /// Event verdict.
    Ack(Ack),
    /// Broadcast deltas.
    State(StateUpdate),
    /// Corrective command.
    Command(CommandBody),
    /// Liveness.
    Heartbeat,
    /// Registration request.
    Join(JoinRequest),
    /// Registration answer.
    Welcome(Welcome),
    /// Snapshot and replay request.
    SyncRequest,
    /// Unit status.
    Telemetry(Telemetry),
    /// Full state.
    Snapshot(MatchSnapshot),
}

impl Message {
    /// Kind of this body.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Event(_) => MessageKind::Event,
            Self::Ack(_) => MessageKind::Ack,
            Self::State(_) => MessageKind::State,
            Self::Command(_) => MessageKind::Command,
            Self::Heartbeat => MessageKind::Heartbeat,
            Self::Join(_) => MessageKind::Join,
            Self::Welcome(_) => MessageKind::Welcome,
            Self::SyncRequest => MessageKind::SyncRequest,
            Self::Telemetry(_) => MessageKind::Telemetry,
            Self::Snapshot(_) => MessageKind::Snapshot,
        }
    }

    /// Whether the sender must retransmit until answered.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        match self {
            Self::Event(event) => event.is_critical(),
            Self::Join(_) => true,
            _ => false,
        }
    }
}

/// A decoded message with its header fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Validated sender.
    pub sender: UnitId,
    /// Sender sequence.
    pub sequence: u32,
    /// Body.
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<MessageHeader>(), MessageHeader::SIZE);
    }

    #[test]
    fn test_kind_codes() {
        for code in 1..=10 {
            let kind = MessageKind::from_code(code).unwrap();
            assert_eq!(kind as u8, code);
        }
        assert_eq!(MessageKind::from_code(0), None);
        assert_eq!(MessageKind::from_code(11), None);
    }

    #[test]
    fn test_critical_kinds() {
        use skirmish_shared::{EventKind, Timestamp};
        let hit = GameEvent::new(UnitId(1), Timestamp::ZERO, EventKind::Hit { shooter: None });
        let enter = GameEvent::new(UnitId(1), Timestamp::ZERO, EventKind::ZoneEnter);
        assert!(Message::Event(hit).is_critical());
        assert!(!Message::Event(enter).is_critical());
        assert!(Message::Join(JoinRequest { team: Team::Red, epoch: 1 }).is_critical());
        assert!(!Message::Heartbeat.is_critical());
    }
}
