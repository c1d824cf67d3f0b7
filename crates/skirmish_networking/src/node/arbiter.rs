//! The match server.
//!
//! Every unit publishes on its own topic, but the server drains all of them
//! through one transport and hands them to the [`ArbiterMachine`] one at a
//! time. That single loop is the serialization point that makes "first
//! valid claim wins" well defined.

use super::{Endpoint, NodeStats};
use crate::error::NetResult;
use crate::protocol::{Ack, CommandBody, Envelope, JoinRequest, Message, StateUpdate, Welcome};
use crate::reliability::{Deduplicator, Freshness, Outbox, ReliabilityConfig};
use crate::session::{SessionAction, SessionConfig, SessionManager};
use crate::transport::Transport;
use skirmish_core::{ArbiterMachine, Decision, MatchSnapshot, RejectReason, Rules, Verdict};
use skirmish_shared::topics::{ALL_HEARTBEATS, ALL_UNIT_EVENTS, ALL_UNIT_TELEMETRY, CONSOLE_SYNC};
use skirmish_shared::{GameEvent, GamePhase, Team, Timestamp, Topic, UnitId, UnitIdentity};
use std::collections::HashMap;

/// Authoritative match server bound to one transport.
pub struct ArbiterServer<T> {
    endpoint: Endpoint<T>,
    machine: ArbiterMachine,
    session: SessionManager,
    dedup: Deduplicator,
    /// Last join epoch per unit.
    epochs: HashMap<UnitId, u32>,
    sequences: Outbox,
    auto_start: bool,
    last_snapshot: Option<Timestamp>,
}

impl<T: Transport> ArbiterServer<T> {
    /// Creates a server in the lobby and subscribes to unit traffic.
    ///
    /// With `auto_start`, the match starts as soon as both teams have a unit.
    ///
    /// # Errors
    ///
    /// Fails if the rules are invalid or the subscriptions cannot be sent.
    pub fn new(
        transport: T,
        rules: Rules,
        reliability: &ReliabilityConfig,
        session: SessionConfig,
        auto_start: bool,
    ) -> NetResult<Self> {
        let machine = ArbiterMachine::new(rules)?;
        let mut endpoint = Endpoint::new(transport, UnitId::ARBITER);
        endpoint.subscribe_all(&[ALL_UNIT_EVENTS, ALL_UNIT_TELEMETRY, ALL_HEARTBEATS, CONSOLE_SYNC])?;
        tracing::info!(auto_start, "arbiter ready");
        Ok(Self {
            endpoint,
            machine,
            session: SessionManager::new(session, false),
            dedup: Deduplicator::new(reliability.dedup_window),
            epochs: HashMap::new(),
            sequences: Outbox::new(reliability.clone()),
            auto_start,
            last_snapshot: None,
        })
    }

    /// The authoritative state machine.
    #[must_use]
    pub const fn machine(&self) -> &ArbiterMachine {
        &self.machine
    }

    /// Current full state.
    #[must_use]
    pub fn snapshot(&self) -> MatchSnapshot {
        self.machine.snapshot()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> NodeStats {
        self.endpoint.stats()
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        self.endpoint.transport()
    }

    /// Runs one loop iteration: link supervision, inbound messages, session
    /// sweep and the periodic snapshot. Returns messages processed.
    pub fn tick(&mut self, now: Timestamp) -> usize {
        for action in self.endpoint.supervise(&mut self.session, now) {
            match action {
                SessionAction::SendHeartbeat => {
                    let seq = self.sequences.next_sequence();
                    self.endpoint
                        .send(&Topic::Heartbeat(UnitId::ARBITER).name(), seq, &Message::Heartbeat);
                }
                SessionAction::Established => self.broadcast_snapshot(now),
                _ => {}
            }
        }

        let mut processed = 0;
        while let Some(envelope) = self.endpoint.receive() {
            self.dispatch(now, envelope);
            processed += 1;
        }

        let config = self.session.config();
        let sweep = self
            .machine
            .sweep_sessions(now, config.link_timeout(), config.grace_period());
        for unit in &sweep.removed {
            self.dedup.forget(*unit);
        }
        self.publish(&Decision {
            verdict: Verdict::Accepted,
            flag: self.machine.flag(),
            deltas: sweep.deltas,
            commands: sweep.commands,
            revision: sweep.revision,
        });

        let interval = self.session.config().snapshot_interval();
        if self.last_snapshot.map_or(true, |at| now.saturating_since(at) >= interval) {
            self.broadcast_snapshot(now);
        }
        processed
    }

    /// Starts the match. `force` skips the both-teams check.
    pub fn start_match(&mut self, force: bool) -> Verdict {
        let decision = self.machine.start_match(force);
        self.publish(&decision);
        decision.verdict
    }

    /// Returns to the lobby, clearing score and flag.
    pub fn reset_match(&mut self) {
        let decision = self.machine.reset_match();
        self.publish(&decision);
    }

    fn dispatch(&mut self, now: Timestamp, envelope: Envelope) {
        let Envelope {
            sender,
            sequence,
            message,
        } = envelope;
        if sender.is_arbiter() {
            // Either our own heartbeat echoed back by the wildcard
            // subscription, or a console that just (re)connected.
            if matches!(message, Message::SyncRequest) {
                tracing::debug!("console sync requested");
                self.endpoint.stats_mut().resyncs += 1;
                self.broadcast_snapshot(now);
            }
            return;
        }

        let freshness = self.dedup.check(sender, sequence);
        if message.kind().is_deduplicated() && freshness != Freshness::New {
            self.endpoint.stats_mut().duplicates += 1;
            if let Message::Event(event) = &message {
                self.answer_duplicate(sender, sequence, event);
            }
            return;
        }

        match message {
            Message::Event(event) => self.on_event(now, sender, sequence, &event),
            Message::Join(join) => {
                if self.restarted(sender, freshness, join) {
                    tracing::info!(unit = %sender, sequence, epoch = join.epoch, "unit restarted, sequence history reset");
                    self.dedup.restart(sender, sequence);
                    self.machine.forget_history(sender);
                }
                self.on_join(now, sender, sequence, join.team);
            }
            Message::SyncRequest => {
                self.touch(now, sender);
                self.on_sync_request(sender);
            }
            Message::Heartbeat => self.touch(now, sender),
            Message::Telemetry(telemetry) => {
                self.touch(now, sender);
                self.machine.record_telemetry(now, sender, telemetry.battery_percent);
            }
            other => {
                tracing::debug!(unit = %sender, kind = other.kind().name(), "unexpected message from unit");
            }
        }
    }

    /// A new epoch, or a stale join from a unit we never saw an epoch for,
    /// means the sender's sequences started over.
    fn restarted(&mut self, sender: UnitId, freshness: Freshness, join: JoinRequest) -> bool {
        match self.epochs.insert(sender, join.epoch) {
            Some(previous) => previous != join.epoch,
            None => freshness == Freshness::Stale,
        }
    }

    fn on_event(&mut self, now: Timestamp, sender: UnitId, sequence: u32, event: &GameEvent) {
        let decision = self.machine.handle(now, sender, sequence, event);
        if event.is_critical() {
            self.send_ack(sender, sequence, event, decision.verdict, &decision);
        }
        self.publish(&decision);
    }

    /// Re-acks a replayed critical event without touching match state.
    fn answer_duplicate(&mut self, sender: UnitId, sequence: u32, event: &GameEvent) {
        if !event.is_critical() {
            return;
        }
        let verdict = match self.machine.logged(sender, sequence) {
            Some(logged) if logged.event == *event => logged.verdict,
            Some(logged) => {
                tracing::warn!(
                    unit = %sender,
                    sequence,
                    logged = ?logged.event.tag(),
                    received = ?event.tag(),
                    "sequence reused for a different event, dropped"
                );
                return;
            }
            None if !self.machine.is_registered(sender) => Verdict::Rejected(RejectReason::UnknownUnit),
            None => {
                tracing::debug!(unit = %sender, sequence, "duplicate without logged verdict dropped");
                return;
            }
        };
        tracing::debug!(unit = %sender, sequence, "duplicate event re-acknowledged");
        let ack = Ack {
            sequence,
            tag: event.tag(),
            verdict,
            flag: self.machine.flag(),
        };
        self.send_to(sender, &Message::Ack(ack));
    }

    fn on_join(&mut self, now: Timestamp, sender: UnitId, sequence: u32, team: Team) {
        let decision = self.machine.register(now, UnitIdentity::new(sender, team));
        let welcome = Welcome {
            join_sequence: sequence,
            verdict: decision.verdict,
            team,
            base_code: self.machine.rules().base_code(team).to_string(),
        };
        self.send_to(sender, &Message::Welcome(welcome));
        self.publish(&decision);

        if self.auto_start && self.machine.phase() == GamePhase::Lobby && self.machine.roster().has_both_teams() {
            tracing::info!("both teams present, starting match");
            self.start_match(false);
        }
    }

    /// Snapshot to the requester, then its adjudicated history as late acks.
    fn on_sync_request(&mut self, sender: UnitId) {
        tracing::debug!(unit = %sender, "sync requested");
        self.endpoint.stats_mut().resyncs += 1;
        self.send_to(sender, &Message::Snapshot(self.machine.snapshot()));
        for logged in self.machine.replay_for(sender) {
            let ack = Ack {
                sequence: logged.sequence,
                tag: logged.event.tag(),
                verdict: logged.verdict,
                flag: logged.flag,
            };
            self.send_to(sender, &Message::Ack(ack));
        }
    }

    fn touch(&mut self, now: Timestamp, unit: UnitId) {
        if let Some(decision) = self.machine.heartbeat(now, unit) {
            self.publish(&decision);
        }
    }

    fn send_ack(&mut self, to: UnitId, sequence: u32, event: &GameEvent, verdict: Verdict, decision: &Decision) {
        let ack = Ack {
            sequence,
            tag: event.tag(),
            verdict,
            flag: decision.flag,
        };
        self.send_to(to, &Message::Ack(ack));
    }

    fn send_to(&mut self, unit: UnitId, message: &Message) {
        let seq = self.sequences.next_sequence();
        self.endpoint.send(&Topic::ArbiterAck(unit).name(), seq, message);
    }

    /// Broadcasts deltas and delivers commands of a decision.
    fn publish(&mut self, decision: &Decision) {
        if decision.has_changes() {
            let update = StateUpdate {
                revision: decision.revision,
                deltas: decision.deltas.clone(),
            };
            let seq = self.sequences.next_sequence();
            self.endpoint.send(&Topic::ArbiterState.name(), seq, &Message::State(update));
        }
        for (unit, command) in &decision.commands {
            tracing::info!(%unit, ?command, "command issued");
            let body = CommandBody {
                command: *command,
                flag: decision.flag,
            };
            self.send_to(*unit, &Message::Command(body));
        }
    }

    fn broadcast_snapshot(&mut self, now: Timestamp) {
        self.last_snapshot = Some(now);
        let seq = self.sequences.next_sequence();
        self.endpoint
            .send(&Topic::ArbiterState.name(), seq, &Message::Snapshot(self.machine.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Codec;
    use crate::transport::{LocalBus, LocalLink};
    use skirmish_core::StateDelta;
    use skirmish_shared::EventKind;

    struct Harness {
        server: ArbiterServer<LocalLink>,
        listener: LocalLink,
        unit_links: Vec<LocalLink>,
        codec: Codec,
        bus: LocalBus,
    }

    impl Harness {
        fn new(auto_start: bool) -> Self {
            let bus = LocalBus::new();
            let server = ArbiterServer::new(
                bus.connect(),
                Rules::default(),
                &ReliabilityConfig::default(),
                SessionConfig::default(),
                auto_start,
            )
            .unwrap();
            let mut listener = bus.connect();
            listener.subscribe("arbiter/#").unwrap();
            Self {
                server,
                listener,
                unit_links: Vec::new(),
                codec: Codec::new(),
                bus,
            }
        }

        fn send(&mut self, unit: UnitId, sequence: u32, message: &Message) {
            if self.unit_links.is_empty() {
                self.unit_links.push(self.bus.connect());
            }
            let bytes = self.codec.encode(unit, sequence, message).unwrap();
            self.unit_links[0]
                .publish(&Topic::UnitEvent(unit).name(), &bytes)
                .unwrap();
        }

        fn drain(&mut self) -> Vec<(String, Message)> {
            std::iter::from_fn(|| self.listener.poll())
                .map(|d| {
                    let env = Codec::decode(&d.topic, &d.payload).unwrap();
                    (d.topic, env.message)
                })
                .collect()
        }
    }

    fn join(team: Team, epoch: u32) -> Message {
        Message::Join(JoinRequest { team, epoch })
    }

    fn acks_for(out: &[(String, Message)], unit: UnitId) -> Vec<Ack> {
        let topic = Topic::ArbiterAck(unit).name();
        out.iter()
            .filter_map(|(t, m)| match m {
                Message::Ack(a) if *t == topic => Some(*a),
                _ => None,
            })
            .collect()
    }

    fn event(unit: UnitId, kind: EventKind) -> Message {
        Message::Event(GameEvent::new(unit, Timestamp::from_millis(1), kind))
    }

    #[test]
    fn test_join_welcome_and_auto_start() {
        let mut h = Harness::new(true);
        h.server.tick(Timestamp::ZERO);
        h.drain();

        h.send(UnitId(1), 1, &join(Team::Red, 1));
        h.send(UnitId(2), 1, &join(Team::Blue, 1));
        h.server.tick(Timestamp::from_millis(10));

        let out = h.drain();
        let welcome = out.iter().find_map(|(topic, m)| match m {
            Message::Welcome(w) if topic == "arbiter/ack/1" => Some(w.clone()),
            _ => None,
        });
        let welcome = welcome.unwrap();
        assert_eq!(welcome.join_sequence, 1);
        assert!(welcome.verdict.is_accepted());
        assert_eq!(welcome.base_code, "BASE-RED");
        assert_eq!(h.server.machine().phase(), GamePhase::Active);
        assert!(out.iter().any(|(_, m)| matches!(
            m,
            Message::State(u) if u.deltas.contains(&StateDelta::Phase(GamePhase::Active))
        )));
    }

    #[test]
    fn test_duplicate_claim_is_reacked_not_reapplied() {
        let mut h = Harness::new(true);
        h.send(UnitId(1), 1, &join(Team::Red, 1));
        h.send(UnitId(2), 1, &join(Team::Blue, 1));
        h.server.tick(Timestamp::ZERO);
        h.drain();

        let claim = event(UnitId(1), EventKind::CaptureComplete);
        h.send(UnitId(1), 2, &claim);
        h.send(UnitId(1), 2, &claim);
        h.server.tick(Timestamp::from_millis(5_010));

        let out = h.drain();
        let acks: Vec<&Ack> = out
            .iter()
            .filter_map(|(_, m)| match m {
                Message::Ack(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(acks.len(), 2);
        assert!(acks.iter().all(|a| a.sequence == 2 && a.verdict.is_accepted()));
        let flag_broadcasts = out
            .iter()
            .filter(|(_, m)| matches!(m, Message::State(u) if u.deltas.iter().any(|d| matches!(d, StateDelta::Flag(_)))))
            .count();
        assert_eq!(flag_broadcasts, 1);
        assert_eq!(h.server.stats().duplicates, 1);
    }

    #[test]
    fn test_restarted_unit_reusing_sequences_is_adjudicated() {
        let mut h = Harness::new(true);
        h.send(UnitId(1), 1, &join(Team::Red, 100));
        h.send(UnitId(2), 1, &join(Team::Blue, 200));
        h.send(UnitId(1), 2, &event(UnitId(1), EventKind::Hit { shooter: Some(UnitId(2)) }));
        h.server.tick(Timestamp::ZERO);
        h.drain();

        // Same process after a crash: sequences start over under a new epoch.
        h.send(UnitId(1), 1, &join(Team::Red, 101));
        h.send(UnitId(1), 2, &event(UnitId(1), EventKind::CaptureComplete));
        h.server.tick(Timestamp::from_millis(5_010));

        let acks = acks_for(&h.drain(), UnitId(1));
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].tag, skirmish_shared::EventTag::CaptureComplete);
        assert!(acks[0].verdict.is_accepted());
        assert!(h.server.machine().flag().is_held_by(UnitId(1)));
    }

    #[test]
    fn test_reused_sequence_without_new_epoch_is_not_misacked() {
        let mut h = Harness::new(true);
        h.send(UnitId(1), 1, &join(Team::Red, 100));
        h.send(UnitId(2), 1, &join(Team::Blue, 200));
        h.send(UnitId(1), 2, &event(UnitId(1), EventKind::Hit { shooter: Some(UnitId(2)) }));
        h.server.tick(Timestamp::ZERO);
        h.drain();

        // A different event under an already adjudicated sequence.
        h.send(UnitId(1), 2, &event(UnitId(1), EventKind::CaptureComplete));
        h.server.tick(Timestamp::from_millis(5_010));

        assert!(acks_for(&h.drain(), UnitId(1)).is_empty());
        assert!(h.server.machine().flag().is_at_center());
        assert_eq!(h.server.stats().duplicates, 1);
    }

    #[test]
    fn test_join_retransmit_keeps_history() {
        let mut h = Harness::new(true);
        h.send(UnitId(1), 1, &join(Team::Red, 100));
        h.send(UnitId(2), 1, &join(Team::Blue, 200));
        h.send(UnitId(1), 2, &event(UnitId(1), EventKind::Hit { shooter: Some(UnitId(2)) }));
        h.send(UnitId(1), 1, &join(Team::Red, 100));
        h.server.tick(Timestamp::ZERO);
        h.drain();

        assert!(h.server.machine().logged(UnitId(1), 2).is_some());
    }

    #[test]
    fn test_sync_request_replays_history() {
        let mut h = Harness::new(true);
        h.send(UnitId(1), 1, &join(Team::Red, 1));
        h.send(UnitId(2), 1, &join(Team::Blue, 1));
        h.send(UnitId(1), 2, &event(UnitId(1), EventKind::Hit { shooter: Some(UnitId(2)) }));
        h.server.tick(Timestamp::ZERO);
        h.drain();

        h.send(UnitId(1), 3, &Message::SyncRequest);
        h.server.tick(Timestamp::from_millis(10));
        let out: Vec<Message> = h
            .drain()
            .into_iter()
            .filter(|(topic, _)| topic == "arbiter/ack/1")
            .map(|(_, m)| m)
            .collect();

        assert!(matches!(&out[0], Message::Snapshot(s) if s.is_registered(UnitId(1))));
        assert!(matches!(&out[1], Message::Ack(a) if a.sequence == 2 && a.verdict.is_accepted()));
    }

    #[test]
    fn test_unregistered_event_rejected() {
        let mut h = Harness::new(false);
        h.send(UnitId(9), 1, &event(UnitId(9), EventKind::CaptureComplete));
        h.server.tick(Timestamp::ZERO);
        let ack = h.drain().into_iter().find_map(|(_, m)| match m {
            Message::Ack(a) => Some(a),
            _ => None,
        });
        assert_eq!(ack.unwrap().verdict, Verdict::Rejected(RejectReason::UnknownUnit));
    }

    #[test]
    fn test_periodic_snapshot() {
        let mut h = Harness::new(false);
        h.server.tick(Timestamp::ZERO);
        h.drain();
        h.server.tick(Timestamp::from_millis(4_999));
        assert!(!h.drain().iter().any(|(_, m)| matches!(m, Message::Snapshot(_))));
        h.server.tick(Timestamp::from_millis(5_000));
        assert!(h.drain().iter().any(|(topic, m)| topic == "arbiter/state" && matches!(m, Message::Snapshot(_))));
    }
}
