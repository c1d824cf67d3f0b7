//! # Protocol Codec
//!
//! Typed messages to and from bus payloads.
//!
//! Decoding validates, in order: header size, version, kind, payload
//! length, that the kind belongs on the topic, that the sender is the
//! participant allowed to publish on the topic, and finally the body.

use super::packets::{
    Ack, CommandBody, Envelope, JoinRequest, Message, MessageHeader, MessageKind, StateUpdate, Telemetry, Welcome,
    PROTOCOL_VERSION,
};
use super::serialization::{PayloadReader, PayloadWriter, MAX_PAYLOAD_SIZE};
use crate::error::ProtocolError;
use skirmish_core::{CaptureStatus, MatchSnapshot, RejectReason, StateDelta, UnitCommand, UnitSummary, Verdict};
use skirmish_shared::{
    EventKind, EventTag, FlagLocation, FlagState, GameEvent, GamePhase, Team, TeamScore, Timestamp, Topic, UnitId,
    UnitIdentity,
};

const NONE_U8: u8 = 0xFF;

/// Encodes messages into a reusable buffer.
pub struct Codec {
    writer: PayloadWriter,
}

impl Codec {
    /// Creates a codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: PayloadWriter::new(),
        }
    }

    /// Encodes one message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if it does not fit a datagram.
    pub fn encode(&mut self, sender: UnitId, sequence: u32, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let w = &mut self.writer;
        w.reset();
        w.write_pod(&MessageHeader::default())?;
        write_body(w, message)?;

        let payload_len = w.len() - MessageHeader::SIZE;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(payload_len));
        }
        let len = u16::try_from(payload_len).map_err(|_| ProtocolError::PayloadTooLarge(payload_len))?;
        let header = MessageHeader::new(sender, sequence, message.kind(), len).to_wire_order();
        w.as_mut_slice()[..MessageHeader::SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        Ok(w.take())
    }

    /// Decodes and validates a payload received on `topic`.
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`]; the caller drops the message.
    pub fn decode(topic: &str, bytes: &[u8]) -> Result<Envelope, ProtocolError> {
        let parsed = Topic::parse(topic)?;
        let mut r = PayloadReader::new(bytes);
        let header = r.read_pod::<MessageHeader>()?.to_wire_order();

        if header.version != PROTOCOL_VERSION {
            return Err(ProtocolError::BadVersion(header.version));
        }
        let kind = MessageKind::from_code(header.kind).ok_or(ProtocolError::UnknownKind(header.kind))?;
        let announced = usize::from(header.payload_len);
        if announced != r.remaining() {
            return Err(ProtocolError::LengthMismatch {
                announced,
                actual: r.remaining(),
            });
        }
        if !kind_allowed(parsed, kind) {
            return Err(ProtocolError::UnexpectedKind {
                kind: kind.name(),
                topic: topic.to_string(),
            });
        }
        let sender = UnitId(header.sender);
        if sender != parsed.publisher() {
            return Err(ProtocolError::IdentityMismatch {
                sender,
                topic: topic.to_string(),
            });
        }

        let message = read_body(&mut r, kind)?;
        Ok(Envelope {
            sender,
            sequence: header.sequence,
            message,
        })
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_allowed(topic: Topic, kind: MessageKind) -> bool {
    use MessageKind as K;
    match topic {
        Topic::UnitEvent(_) => matches!(kind, K::Event | K::Join | K::SyncRequest),
        Topic::UnitTelemetry(_) => kind == K::Telemetry,
        Topic::ArbiterState => matches!(kind, K::State | K::Snapshot),
        Topic::ArbiterAck(_) => matches!(kind, K::Ack | K::Command | K::Welcome | K::Snapshot),
        Topic::Heartbeat(_) => kind == K::Heartbeat,
        Topic::ConsoleSync => kind == K::SyncRequest,
    }
}

// =============================================================================
// BODIES
// =============================================================================

fn write_body(w: &mut PayloadWriter, message: &Message) -> Result<(), ProtocolError> {
    match message {
        Message::Event(event) => write_event(w, event),
        Message::Ack(ack) => {
            w.write_u32(ack.sequence)?;
            w.write_u8(ack.tag as u8)?;
            write_verdict(w, ack.verdict)?;
            write_flag(w, ack.flag)
        }
        Message::State(update) => {
            w.write_u64(update.revision)?;
            let count = u16::try_from(update.deltas.len()).map_err(|_| ProtocolError::PayloadTooLarge(update.deltas.len()))?;
            w.write_u16(count)?;
            update.deltas.iter().try_for_each(|d| write_delta(w, d))
        }
        Message::Command(body) => {
            w.write_u8(body.command.code())?;
            write_flag(w, body.flag)
        }
        Message::Heartbeat | Message::SyncRequest => Ok(()),
        Message::Join(join) => {
            w.write_u8(join.team.code())?;
            w.write_u32(join.epoch)
        }
        Message::Welcome(welcome) => {
            w.write_u32(welcome.join_sequence)?;
            write_verdict(w, welcome.verdict)?;
            w.write_u8(welcome.team.code())?;
            w.write_str(&welcome.base_code)
        }
        Message::Telemetry(t) => {
            w.write_u8(t.battery_percent)?;
            w.write_u16(t.battery_millivolts)?;
            w.write_u8(t.capture as u8)?;
            w.write_bool(t.carrying)?;
            w.write_bool(t.stunned)
        }
        Message::Snapshot(snapshot) => write_snapshot(w, snapshot),
    }
}

fn read_body(r: &mut PayloadReader<'_>, kind: MessageKind) -> Result<Message, ProtocolError> {
    let message = match kind {
        MessageKind::Event => Message::Event(read_event(r)?),
        MessageKind::Ack => Message::Ack(Ack {
            sequence: r.read_u32()?,
            tag: read_tag(r)?,
            verdict: read_verdict(r)?,
            flag: read_flag(r)?,
        }),
        MessageKind::State => {
            let revision = r.read_u64()?;
            let count = r.read_u16()?;
            let deltas = (0..count).map(|_| read_delta(r)).collect::<Result<Vec<_>, _>>()?;
            Message::State(StateUpdate { revision, deltas })
        }
        MessageKind::Command => {
            let code = r.read_u8()?;
            let command = UnitCommand::from_code(code).ok_or(ProtocolError::BadCode { field: "command", code })?;
            Message::Command(CommandBody {
                command,
                flag: read_flag(r)?,
            })
        }
        MessageKind::Heartbeat => Message::Heartbeat,
        MessageKind::Join => Message::Join(JoinRequest {
            team: read_team(r)?,
            epoch: r.read_u32()?,
        }),
        MessageKind::Welcome => Message::Welcome(Welcome {
            join_sequence: r.read_u32()?,
            verdict: read_verdict(r)?,
            team: read_team(r)?,
            base_code: r.read_str("base_code")?,
        }),
        MessageKind::SyncRequest => Message::SyncRequest,
        MessageKind::Telemetry => {
            let battery_percent = r.read_u8()?;
            let battery_millivolts = r.read_u16()?;
            let code = r.read_u8()?;
            let capture = CaptureStatus::from_code(code).ok_or(ProtocolError::BadCode { field: "capture", code })?;
            Message::Telemetry(Telemetry {
                battery_percent,
                battery_millivolts,
                capture,
                carrying: r.read_bool()?,
                stunned: r.read_bool()?,
            })
        }
        MessageKind::Snapshot => Message::Snapshot(read_snapshot(r)?),
    };
    Ok(message)
}

fn write_event(w: &mut PayloadWriter, event: &GameEvent) -> Result<(), ProtocolError> {
    w.write_u32(event.unit.0)?;
    w.write_u64(event.at.as_millis())?;
    w.write_u8(event.tag() as u8)?;
    match &event.kind {
        EventKind::Hit { shooter } => {
            w.write_bool(shooter.is_some())?;
            w.write_u32(shooter.map_or(0, |s| s.0))
        }
        EventKind::Deposit { team, base_code } => {
            w.write_u8(team.code())?;
            w.write_str(base_code)
        }
        EventKind::ZoneEnter
        | EventKind::ZoneExit
        | EventKind::CaptureComplete
        | EventKind::Disconnect
        | EventKind::FlagDrop => Ok(()),
    }
}

fn read_event(r: &mut PayloadReader<'_>) -> Result<GameEvent, ProtocolError> {
    let unit = UnitId(r.read_u32()?);
    let at = Timestamp::from_millis(r.read_u64()?);
    let kind = match read_tag(r)? {
        EventTag::Hit => {
            let known = r.read_bool()?;
            let id = r.read_u32()?;
            EventKind::Hit {
                shooter: known.then_some(UnitId(id)),
            }
        }
        EventTag::ZoneEnter => EventKind::ZoneEnter,
        EventTag::ZoneExit => EventKind::ZoneExit,
        EventTag::CaptureComplete => EventKind::CaptureComplete,
        EventTag::Deposit => EventKind::Deposit {
            team: read_team(r)?,
            base_code: r.read_str("base_code")?,
        },
        EventTag::Disconnect => EventKind::Disconnect,
        EventTag::FlagDrop => EventKind::FlagDrop,
    };
    Ok(GameEvent::new(unit, at, kind))
}

fn read_tag(r: &mut PayloadReader<'_>) -> Result<EventTag, ProtocolError> {
    let code = r.read_u8()?;
    EventTag::from_code(code).ok_or(ProtocolError::BadCode { field: "event tag", code })
}

fn read_team(r: &mut PayloadReader<'_>) -> Result<Team, ProtocolError> {
    let code = r.read_u8()?;
    Team::from_code(code).ok_or(ProtocolError::BadCode { field: "team", code })
}

fn read_opt_team(r: &mut PayloadReader<'_>) -> Result<Option<Team>, ProtocolError> {
    match r.read_u8()? {
        NONE_U8 => Ok(None),
        code => Team::from_code(code)
            .map(Some)
            .ok_or(ProtocolError::BadCode { field: "team", code }),
    }
}

fn read_phase(r: &mut PayloadReader<'_>) -> Result<GamePhase, ProtocolError> {
    let code = r.read_u8()?;
    GamePhase::from_code(code).ok_or(ProtocolError::BadCode { field: "phase", code })
}

fn write_verdict(w: &mut PayloadWriter, verdict: Verdict) -> Result<(), ProtocolError> {
    match verdict {
        Verdict::Accepted => w.write_u8(0),
        Verdict::Rejected(reason) => w.write_u8(reason.code()),
    }
}

fn read_verdict(r: &mut PayloadReader<'_>) -> Result<Verdict, ProtocolError> {
    match r.read_u8()? {
        0 => Ok(Verdict::Accepted),
        code => RejectReason::from_code(code)
            .map(Verdict::Rejected)
            .ok_or(ProtocolError::BadCode { field: "reject reason", code }),
    }
}

fn write_flag(w: &mut PayloadWriter, flag: FlagState) -> Result<(), ProtocolError> {
    let (code, arg) = match flag.location {
        FlagLocation::AtCenter => (0, 0),
        FlagLocation::HeldBy(unit) => (1, unit.0),
        FlagLocation::AtBase(team) => (2, u32::from(team.code())),
    };
    w.write_u8(code)?;
    w.write_u32(arg)?;
    w.write_u64(flag.version)
}

fn read_flag(r: &mut PayloadReader<'_>) -> Result<FlagState, ProtocolError> {
    let code = r.read_u8()?;
    let arg = r.read_u32()?;
    let location = match code {
        0 => FlagLocation::AtCenter,
        1 => FlagLocation::HeldBy(UnitId(arg)),
        2 => {
            let team = u8::try_from(arg)
                .ok()
                .and_then(Team::from_code)
                .ok_or(ProtocolError::BadCode { field: "flag base", code })?;
            FlagLocation::AtBase(team)
        }
        _ => return Err(ProtocolError::BadCode { field: "flag location", code }),
    };
    Ok(FlagState {
        location,
        version: r.read_u64()?,
    })
}

fn write_score(w: &mut PayloadWriter, score: TeamScore) -> Result<(), ProtocolError> {
    w.write_u8(score.get(Team::Red))?;
    w.write_u8(score.get(Team::Blue))
}

fn read_score(r: &mut PayloadReader<'_>) -> Result<TeamScore, ProtocolError> {
    Ok(TeamScore::new(r.read_u8()?, r.read_u8()?))
}

fn write_delta(w: &mut PayloadWriter, delta: &StateDelta) -> Result<(), ProtocolError> {
    match *delta {
        StateDelta::Flag(flag) => {
            w.write_u8(1)?;
            write_flag(w, flag)
        }
        StateDelta::Score(score) => {
            w.write_u8(2)?;
            write_score(w, score)
        }
        StateDelta::Phase(phase) => {
            w.write_u8(3)?;
            w.write_u8(phase as u8)
        }
        StateDelta::GameOver(team) => {
            w.write_u8(4)?;
            w.write_u8(team.code())
        }
        StateDelta::UnitJoined(identity) => {
            w.write_u8(5)?;
            w.write_u32(identity.id().0)?;
            w.write_u8(identity.team().code())
        }
        StateDelta::UnitStatus { unit, connected } => {
            w.write_u8(6)?;
            w.write_u32(unit.0)?;
            w.write_bool(connected)
        }
        StateDelta::UnitLeft(unit) => {
            w.write_u8(7)?;
            w.write_u32(unit.0)
        }
    }
}

fn read_delta(r: &mut PayloadReader<'_>) -> Result<StateDelta, ProtocolError> {
    let delta = match r.read_u8()? {
        1 => StateDelta::Flag(read_flag(r)?),
        2 => StateDelta::Score(read_score(r)?),
        3 => StateDelta::Phase(read_phase(r)?),
        4 => StateDelta::GameOver(read_team(r)?),
        5 => {
            let id = UnitId(r.read_u32()?);
            StateDelta::UnitJoined(UnitIdentity::new(id, read_team(r)?))
        }
        6 => StateDelta::UnitStatus {
            unit: UnitId(r.read_u32()?),
            connected: r.read_bool()?,
        },
        7 => StateDelta::UnitLeft(UnitId(r.read_u32()?)),
        code => return Err(ProtocolError::BadCode { field: "delta", code }),
    };
    Ok(delta)
}

fn write_snapshot(w: &mut PayloadWriter, s: &MatchSnapshot) -> Result<(), ProtocolError> {
    w.write_u8(s.phase as u8)?;
    write_flag(w, s.flag)?;
    write_score(w, s.score)?;
    w.write_u8(s.winner.map_or(NONE_U8, Team::code))?;
    w.write_u64(s.revision)?;
    let count = u16::try_from(s.units.len()).map_err(|_| ProtocolError::PayloadTooLarge(s.units.len()))?;
    w.write_u16(count)?;
    for unit in &s.units {
        w.write_u32(unit.identity.id().0)?;
        w.write_u8(unit.identity.team().code())?;
        w.write_bool(unit.connected)?;
        w.write_u32(unit.hits_taken)?;
        w.write_u32(unit.hits_landed)?;
        w.write_u8(unit.battery_pct.unwrap_or(NONE_U8))?;
    }
    Ok(())
}

fn read_snapshot(r: &mut PayloadReader<'_>) -> Result<MatchSnapshot, ProtocolError> {
    let phase = read_phase(r)?;
    let flag = read_flag(r)?;
    let score = read_score(r)?;
    let winner = read_opt_team(r)?;
    let revision = r.read_u64()?;
    let count = r.read_u16()?;
    let mut units = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let id = UnitId(r.read_u32()?);
        let team = read_team(r)?;
        units.push(UnitSummary {
            identity: UnitIdentity::new(id, team),
            connected: r.read_bool()?,
            hits_taken: r.read_u32()?,
            hits_landed: r.read_u32()?,
            battery_pct: match r.read_u8()? {
                NONE_U8 => None,
                pct => Some(pct),
            },
        });
    }
    Ok(MatchSnapshot {
        phase,
        flag,
        score,
        winner,
        revision,
        units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(topic: &str, sender: UnitId, message: Message) -> Envelope {
        let bytes = Codec::new().encode(sender, 42, &message).unwrap();
        let envelope = Codec::decode(topic, &bytes).unwrap();
        assert_eq!(envelope.message, message);
        assert_eq!(envelope.sequence, 42);
        envelope
    }

    #[test]
    fn test_join_carries_epoch() {
        let join = Message::Join(JoinRequest {
            team: Team::Blue,
            epoch: 0xDEAD_BEEF,
        });
        let envelope = roundtrip("unit/3/event", UnitId(3), join);
        assert_eq!(envelope.sender, UnitId(3));
    }

    #[test]
    fn test_deposit_event() {
        let event = GameEvent::new(
            UnitId(3),
            Timestamp::from_millis(9_001),
            EventKind::Deposit {
                team: Team::Blue,
                base_code: "BASE-BLUE".into(),
            },
        );
        let envelope = roundtrip("unit/3/event", UnitId(3), Message::Event(event));
        assert_eq!(envelope.sender, UnitId(3));
    }

    #[test]
    fn test_state_with_every_delta() {
        let update = StateUpdate {
            revision: 17,
            deltas: vec![
                StateDelta::Flag(FlagState {
                    location: FlagLocation::HeldBy(UnitId(2)),
                    version: 5,
                }),
                StateDelta::Score(TeamScore::new(2, 1)),
                StateDelta::Phase(GamePhase::Ended),
                StateDelta::GameOver(Team::Red),
                StateDelta::UnitJoined(UnitIdentity::new(UnitId(4), Team::Blue)),
                StateDelta::UnitStatus {
                    unit: UnitId(4),
                    connected: false,
                },
                StateDelta::UnitLeft(UnitId(4)),
            ],
        };
        roundtrip("arbiter/state", UnitId::ARBITER, Message::State(update));
    }

    #[test]
    fn test_snapshot_on_ack_topic() {
        let snapshot = MatchSnapshot {
            phase: GamePhase::Active,
            flag: FlagState {
                location: FlagLocation::AtBase(Team::Blue),
                version: 9,
            },
            score: TeamScore::new(0, 3),
            winner: Some(Team::Blue),
            revision: 30,
            units: vec![UnitSummary {
                identity: UnitIdentity::new(UnitId(1), Team::Red),
                connected: true,
                hits_taken: 2,
                hits_landed: 0,
                battery_pct: None,
            }],
        };
        roundtrip("arbiter/ack/1", UnitId::ARBITER, Message::Snapshot(snapshot));
    }

    #[test]
    fn test_identity_mismatch_rejected() {
        let bytes = Codec::new().encode(UnitId(2), 1, &Message::Heartbeat).unwrap();
        assert!(matches!(
            Codec::decode("session/heartbeat/3", &bytes),
            Err(ProtocolError::IdentityMismatch { .. })
        ));
        // Units may not speak for the arbiter.
        let ack = Message::Command(CommandBody {
            command: UnitCommand::ForceDrop,
            flag: FlagState::INITIAL,
        });
        let bytes = Codec::new().encode(UnitId(2), 1, &ack).unwrap();
        assert!(matches!(
            Codec::decode("arbiter/ack/2", &bytes),
            Err(ProtocolError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_must_fit_topic() {
        let bytes = Codec::new().encode(UnitId(2), 1, &Message::Heartbeat).unwrap();
        assert!(matches!(
            Codec::decode("unit/2/event", &bytes),
            Err(ProtocolError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            Codec::decode("unit/1/event", &[1, 2, 3]),
            Err(ProtocolError::Truncated { .. })
        ));

        let mut bytes = Codec::new().encode(UnitId(1), 1, &Message::SyncRequest).unwrap();
        bytes[9] = 99;
        assert_eq!(Codec::decode("unit/1/event", &bytes), Err(ProtocolError::BadVersion(99)));

        let mut bytes = Codec::new().encode(UnitId(1), 1, &Message::Join(JoinRequest { team: Team::Red, epoch: 7 })).unwrap();
        bytes.push(0);
        assert!(matches!(
            Codec::decode("unit/1/event", &bytes),
            Err(ProtocolError::LengthMismatch { .. })
        ));

        let bytes = Codec::new().encode(UnitId(1), 1, &Message::Heartbeat).unwrap();
        assert!(matches!(Codec::decode("rasptank/1", &bytes), Err(ProtocolError::Topic(_))));
    }
}
