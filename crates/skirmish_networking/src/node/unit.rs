//! The vehicle side.
//!
//! Sensor events go straight into the [`UnitMachine`], so a hit stuns the
//! unit immediately whatever the network is doing. Critical events are
//! retransmitted until the arbiter's ack arrives; the ack's verdict is then
//! fed back into the machine.
//!
//! After a reconnect nothing is retransmitted until a fresh snapshot says
//! whether the arbiter still knows us. Events queued under a registration
//! the arbiter has since dropped are discarded rather than replayed into
//! the new one.

use super::{ArbiterFeed, Endpoint, FeedCheck, NodeStats};
use crate::error::NetResult;
use crate::protocol::{Ack, CommandBody, Envelope, JoinRequest, Message, StateUpdate, Telemetry, Welcome};
use crate::reliability::{Outbox, ReliabilityConfig};
use crate::session::{SessionAction, SessionConfig, SessionManager, SessionState};
use crate::transport::Transport;
use skirmish_core::{Effect, MatchSnapshot, Rules, SensorEvent, StateDelta, UnitCommand, UnitInput, UnitMachine, UnitOutput};
use skirmish_shared::topics::ARBITER_STATE;
use skirmish_shared::{EventKind, EventTag, GameEvent, Timestamp, Topic, UnitId, UnitIdentity};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One unit's networked state machine.
pub struct UnitClient<T> {
    identity: UnitIdentity,
    endpoint: Endpoint<T>,
    machine: UnitMachine,
    session: SessionManager,
    outbox: Outbox,
    feed: ArbiterFeed,
    /// Critical events awaiting an ack, by sequence.
    inflight: BTreeMap<u32, EventTag>,
    join_sequence: Option<u32>,
    joined: bool,
    /// Sent with every join so the arbiter can tell a restart from a retry.
    epoch: u32,
    /// When the pending reconnect sync request went out.
    awaiting_snapshot: Option<Timestamp>,
    sync_retry: Duration,
    base_code: Option<String>,
    effects: Vec<Effect>,
}

impl<T: Transport> UnitClient<T> {
    /// Creates a client and subscribes to the arbiter's topics.
    ///
    /// # Errors
    ///
    /// Fails if the subscriptions cannot be sent.
    pub fn new(
        transport: T,
        identity: UnitIdentity,
        rules: &Rules,
        reliability: &ReliabilityConfig,
        session: SessionConfig,
    ) -> NetResult<Self> {
        let mut endpoint = Endpoint::new(transport, identity.id());
        let ack_topic = Topic::ArbiterAck(identity.id()).name();
        let arbiter_heartbeat = Topic::Heartbeat(UnitId::ARBITER).name();
        endpoint.subscribe_all(&[ARBITER_STATE, &ack_topic, &arbiter_heartbeat])?;
        Ok(Self {
            identity,
            endpoint,
            machine: UnitMachine::new(identity, rules),
            session: SessionManager::new(session, true),
            outbox: Outbox::new(reliability.clone()),
            feed: ArbiterFeed::new(reliability.dedup_window),
            inflight: BTreeMap::new(),
            join_sequence: None,
            joined: false,
            epoch: session_epoch(),
            awaiting_snapshot: None,
            sync_retry: reliability.retry_delay(1),
            base_code: None,
            effects: Vec::new(),
        })
    }

    /// Identity.
    #[must_use]
    pub const fn identity(&self) -> UnitIdentity {
        self.identity
    }

    /// The local state machine.
    #[must_use]
    pub const fn machine(&self) -> &UnitMachine {
        &self.machine
    }

    /// Session state.
    #[must_use]
    pub const fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the arbiter accepted our registration.
    #[must_use]
    pub const fn is_joined(&self) -> bool {
        self.joined
    }

    /// Epoch announced in our joins.
    #[must_use]
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Whether a reconnect is waiting for the arbiter's snapshot.
    #[must_use]
    pub const fn is_resyncing(&self) -> bool {
        self.awaiting_snapshot.is_some()
    }

    /// QR code of our own base, learned from the welcome.
    #[must_use]
    pub fn base_code(&self) -> Option<&str> {
        self.base_code.as_deref()
    }

    /// Critical messages still awaiting an ack.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.outbox.pending_len()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> NodeStats {
        self.endpoint.stats()
    }

    /// Drains effect requests produced since the last call.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Feeds a sensor event.
    pub fn sensor(&mut self, now: Timestamp, event: SensorEvent) {
        self.apply(now, UnitInput::Sensor(event));
    }

    /// Runs one loop iteration: link supervision, inbound messages, timers
    /// and retransmissions. Returns messages processed.
    pub fn tick(&mut self, now: Timestamp) -> usize {
        for action in self.endpoint.supervise(&mut self.session, now) {
            match action {
                SessionAction::SendHeartbeat => {
                    let seq = self.outbox.next_sequence();
                    let topic = Topic::Heartbeat(self.identity.id()).name();
                    self.endpoint.send(&topic, seq, &Message::Heartbeat);
                }
                SessionAction::Established => self.on_established(now),
                SessionAction::Lost { .. } | SessionAction::Idle | SessionAction::Reconnect => {}
            }
        }

        let mut processed = 0;
        while let Some(envelope) = self.endpoint.receive() {
            self.session.heard(now);
            self.dispatch(now, envelope);
            processed += 1;
        }

        self.apply(now, UnitInput::Tick);
        if self.session.is_connected() {
            match self.awaiting_snapshot {
                None => self.retransmit(now),
                Some(at) if now.saturating_since(at) >= self.sync_retry => {
                    tracing::debug!(unit = %self.identity.id(), "no snapshot yet, asking again");
                    self.awaiting_snapshot = Some(now);
                    self.request_sync();
                }
                Some(_) => {}
            }
        }
        if self.outbox.take_wrapped() {
            self.renew_epoch(now);
        }
        processed
    }

    /// Publishes a telemetry reading. Suppressed while disconnected.
    pub fn publish_telemetry(&mut self, now: Timestamp, battery_percent: u8, battery_millivolts: u16) {
        if !self.session.is_connected() {
            return;
        }
        let telemetry = Telemetry {
            battery_percent: battery_percent.min(100),
            battery_millivolts,
            capture: self.machine.capture().status,
            carrying: self.machine.possession() == skirmish_core::Possession::Carrying,
            stunned: self.machine.is_stunned(now),
        };
        let seq = self.outbox.next_sequence();
        let topic = Topic::UnitTelemetry(self.identity.id()).name();
        self.endpoint.send(&topic, seq, &Message::Telemetry(telemetry));
    }

    /// Announces a clean shutdown. Best effort.
    pub fn disconnect(&mut self, now: Timestamp) {
        let event = GameEvent::new(self.identity.id(), now, EventKind::Disconnect);
        self.send_event(now, event);
    }

    fn apply(&mut self, now: Timestamp, input: UnitInput) {
        let transition = self.machine.apply(now, input);
        for output in transition.outputs {
            match output {
                UnitOutput::Publish(event) => self.send_event(now, event),
                UnitOutput::Effect(effect) => self.effects.push(effect),
            }
        }
    }

    fn send_event(&mut self, now: Timestamp, event: GameEvent) {
        let seq = self.outbox.next_sequence();
        let topic = Topic::UnitEvent(self.identity.id()).name();
        let critical = event.is_critical();
        let tag = event.tag();

        if !critical && !self.session.is_connected() {
            tracing::debug!(unit = %self.identity.id(), ?tag, "disconnected, non-critical event suppressed");
            return;
        }
        let bytes = match self.endpoint.encode(seq, &Message::Event(event)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(unit = %self.identity.id(), ?tag, error = %e, "cannot encode event");
                return;
            }
        };
        let held = critical && self.awaiting_snapshot.is_some();
        if self.session.is_connected() && !held {
            self.endpoint.publish(&topic, &bytes);
        }
        if critical {
            tracing::debug!(unit = %self.identity.id(), seq, ?tag, "critical event awaiting ack");
            self.inflight.insert(seq, tag);
            self.outbox.track(now, seq, &topic, bytes);
        }
    }

    fn send_join(&mut self, now: Timestamp) {
        let seq = self.outbox.next_sequence();
        let topic = Topic::UnitEvent(self.identity.id()).name();
        let join = JoinRequest {
            team: self.identity.team(),
            epoch: self.epoch,
        };
        let bytes = match self.endpoint.encode(seq, &Message::Join(join)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode join");
                return;
            }
        };
        tracing::info!(identity = %self.identity, seq, epoch = self.epoch, "joining match");
        if self.session.is_connected() {
            self.endpoint.publish(&topic, &bytes);
        }
        self.join_sequence = Some(seq);
        self.outbox.track(now, seq, &topic, bytes);
    }

    fn request_sync(&mut self) {
        if !self.session.is_connected() {
            return;
        }
        self.endpoint.stats_mut().resyncs += 1;
        let seq = self.outbox.next_sequence();
        let topic = Topic::UnitEvent(self.identity.id()).name();
        self.endpoint.send(&topic, seq, &Message::SyncRequest);
    }

    /// Our sequences started over: rejoin under a new epoch so the arbiter
    /// drops the old window instead of treating everything as stale.
    fn renew_epoch(&mut self, now: Timestamp) {
        self.epoch = self.epoch.wrapping_add(1).max(1);
        tracing::warn!(unit = %self.identity.id(), epoch = self.epoch, "sequence counter wrapped, rejoining");
        if let Some(seq) = self.join_sequence.take() {
            self.outbox.acknowledge(seq);
        }
        self.send_join(now);
    }

    fn on_established(&mut self, now: Timestamp) {
        self.outbox.rearm(now);
        let fresh = !self.joined && self.join_sequence.is_none() && self.outbox.pending_len() == 0;
        if fresh {
            tracing::info!(unit = %self.identity.id(), "connected");
            self.send_join(now);
        } else {
            // Hold everything until the arbiter says whether we are still registered.
            tracing::info!(unit = %self.identity.id(), pending = self.outbox.pending_len(), "reconnected, resynchronizing");
            self.awaiting_snapshot = Some(now);
        }
        self.request_sync();
    }

    fn retransmit(&mut self, now: Timestamp) {
        let abandoned_before = self.outbox.abandoned();
        for retransmit in self.outbox.due(now) {
            tracing::debug!(seq = retransmit.sequence, attempt = retransmit.attempt, "retransmitting");
            self.endpoint.stats_mut().retransmits += 1;
            self.endpoint.publish(&retransmit.topic, &retransmit.bytes);
        }
        if self.outbox.abandoned() > abandoned_before {
            let outbox = &self.outbox;
            let (kept, lost): (BTreeMap<_, _>, BTreeMap<_, _>) =
                std::mem::take(&mut self.inflight).into_iter().partition(|(seq, _)| outbox.is_pending(*seq));
            self.inflight = kept;
            if self.join_sequence.is_some_and(|seq| !outbox.is_pending(seq)) {
                self.join_sequence = None;
            }
            for tag in lost.into_values() {
                self.apply(now, UnitInput::Abandoned { tag });
            }
            // The verdicts are lost; ask for the authoritative state instead.
            self.request_sync();
        }
    }

    fn dispatch(&mut self, now: Timestamp, envelope: Envelope) {
        match self.feed.check(envelope.message.kind(), envelope.sequence) {
            FeedCheck::Duplicate => {
                self.endpoint.stats_mut().duplicates += 1;
                return;
            }
            FeedCheck::Restarted => {
                tracing::warn!(unit = %self.identity.id(), "arbiter restarted, resynchronizing");
                self.request_sync();
            }
            FeedCheck::Accept => {}
        }

        match envelope.message {
            Message::Heartbeat => {}
            Message::State(update) => self.on_state(now, update),
            Message::Ack(ack) => self.on_ack(now, ack),
            Message::Command(body) => self.on_command(now, body),
            Message::Welcome(welcome) => self.on_welcome(welcome),
            Message::Snapshot(snapshot) => self.on_snapshot(now, &snapshot),
            other => tracing::debug!(kind = other.kind().name(), "unexpected message from arbiter"),
        }
    }

    fn on_state(&mut self, now: Timestamp, update: StateUpdate) {
        if let Err(gap) = self.feed.observe(update.revision) {
            tracing::warn!(unit = %self.identity.id(), "{}", gap);
            self.request_sync();
        }
        for delta in update.deltas {
            match delta {
                StateDelta::Flag(flag) => self.apply(now, UnitInput::FlagUpdate(flag)),
                StateDelta::GameOver(team) => tracing::info!(%team, "game over"),
                StateDelta::UnitLeft(unit) if unit == self.identity.id() => {
                    tracing::warn!(%unit, "removed from the match");
                    self.joined = false;
                }
                _ => {}
            }
        }
    }

    fn on_ack(&mut self, now: Timestamp, ack: Ack) {
        let ours = self.inflight.get(&ack.sequence) == Some(&ack.tag);
        if ours && self.outbox.acknowledge(ack.sequence) {
            self.inflight.remove(&ack.sequence);
            tracing::debug!(seq = ack.sequence, tag = ?ack.tag, verdict = ?ack.verdict, "ack received");
            self.apply(
                now,
                UnitInput::Verdict {
                    tag: ack.tag,
                    verdict: ack.verdict,
                    flag: ack.flag,
                },
            );
        } else {
            tracing::debug!(seq = ack.sequence, "late or foreign ack ignored");
            self.apply(now, UnitInput::FlagUpdate(ack.flag));
        }
    }

    fn on_command(&mut self, now: Timestamp, body: CommandBody) {
        tracing::info!(unit = %self.identity.id(), command = ?body.command, "arbiter command");
        self.apply(
            now,
            UnitInput::Command {
                command: body.command,
                flag: body.flag,
            },
        );
        if body.command == UnitCommand::Reset {
            self.outbox.clear();
            self.inflight.clear();
            self.join_sequence = None;
            self.joined = false;
            self.send_join(now);
        }
    }

    fn on_welcome(&mut self, welcome: Welcome) {
        if self.join_sequence != Some(welcome.join_sequence) {
            tracing::debug!(seq = welcome.join_sequence, "stale welcome ignored");
            return;
        }
        self.outbox.acknowledge(welcome.join_sequence);
        self.join_sequence = None;
        if welcome.verdict.is_accepted() {
            tracing::info!(identity = %self.identity, base = %welcome.base_code, "joined match");
            self.joined = true;
            self.base_code = Some(welcome.base_code);
        } else {
            tracing::warn!(identity = %self.identity, verdict = ?welcome.verdict, "join refused");
            self.joined = false;
        }
    }

    fn on_snapshot(&mut self, now: Timestamp, snapshot: &MatchSnapshot) {
        let resyncing = self.awaiting_snapshot.take().is_some();
        self.feed.resync(snapshot.revision);
        let registered = snapshot.is_registered(self.identity.id());
        if !registered && (resyncing || self.joined) {
            // Queued events belong to a registration the arbiter dropped.
            tracing::warn!(
                unit = %self.identity.id(),
                discarded = self.outbox.pending_len(),
                "no longer registered, pending events discarded"
            );
            self.outbox.clear();
            self.inflight.clear();
            self.join_sequence = None;
        }
        self.apply(
            now,
            UnitInput::Resync {
                flag: snapshot.flag,
                registered,
            },
        );
        if !registered {
            self.joined = false;
            if self.join_sequence.is_none() {
                self.send_join(now);
            }
        }
    }
}

/// Picks a join epoch from the wall clock. Never 0.
fn session_epoch() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(1, |d| (d.as_secs() as u32) ^ d.subsec_nanos())
        .max(1)
}
