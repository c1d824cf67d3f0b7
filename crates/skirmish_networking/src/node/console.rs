//! The operator console.
//!
//! Read-only: it follows `arbiter/state` and unit telemetry and keeps a
//! [`MatchView`] for an external renderer. After a missed broadcast the view
//! is marked stale until the next periodic snapshot replaces it. Each time
//! the link comes up the console asks the arbiter for a snapshot right away.

use super::{ArbiterFeed, Endpoint, FeedCheck, NodeStats};
use crate::error::NetResult;
use crate::protocol::{Envelope, Message, StateUpdate, Telemetry};
use crate::reliability::{Outbox, ReliabilityConfig};
use crate::session::{SessionAction, SessionConfig, SessionManager, SessionState};
use crate::transport::Transport;
use skirmish_core::{MatchSnapshot, StateDelta};
use skirmish_shared::topics::{ALL_UNIT_TELEMETRY, ARBITER_STATE};
use skirmish_shared::{FlagState, GamePhase, Team, TeamScore, Timestamp, Topic, UnitId, UnitIdentity};
use std::collections::BTreeMap;

/// What the console knows about one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitView {
    /// Identity, once the arbiter announced it.
    pub identity: Option<UnitIdentity>,
    /// Session liveness as seen by the arbiter.
    pub connected: bool,
    /// Hits received.
    pub hits_taken: u32,
    /// Hits landed.
    pub hits_landed: u32,
    /// Latest telemetry.
    pub telemetry: Option<Telemetry>,
    /// When the latest telemetry arrived.
    pub telemetry_at: Option<Timestamp>,
}

/// The console's picture of the match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchView {
    /// Phase.
    pub phase: GamePhase,
    /// Flag.
    pub flag: FlagState,
    /// Score.
    pub score: TeamScore,
    /// Winner of the current match.
    pub winner: Option<Team>,
    /// Winner of the most recent finished match, kept across resets.
    pub last_game_over: Option<Team>,
    /// Broadcast revision applied last.
    pub revision: u64,
    /// Set after a gap; cleared by the next snapshot.
    pub stale: bool,
    /// Units by id.
    pub units: BTreeMap<UnitId, UnitView>,
}

impl Default for MatchView {
    fn default() -> Self {
        Self {
            phase: GamePhase::Lobby,
            flag: FlagState::INITIAL,
            score: TeamScore::default(),
            winner: None,
            last_game_over: None,
            revision: 0,
            stale: true,
            units: BTreeMap::new(),
        }
    }
}

impl MatchView {
    /// Replaces everything the snapshot covers. Telemetry is kept.
    pub fn apply_snapshot(&mut self, snapshot: &MatchSnapshot) {
        self.phase = snapshot.phase;
        self.flag = snapshot.flag;
        self.score = snapshot.score;
        self.winner = snapshot.winner;
        if snapshot.winner.is_some() {
            self.last_game_over = snapshot.winner;
        }
        self.revision = snapshot.revision;
        self.stale = false;

        let mut units = BTreeMap::new();
        for summary in &snapshot.units {
            let id = summary.identity.id();
            let mut view = self.units.remove(&id).unwrap_or_default();
            view.identity = Some(summary.identity);
            view.connected = summary.connected;
            view.hits_taken = summary.hits_taken;
            view.hits_landed = summary.hits_landed;
            units.insert(id, view);
        }
        self.units = units;
    }

    /// Applies one broadcast change.
    pub fn apply_delta(&mut self, delta: &StateDelta) {
        match *delta {
            StateDelta::Flag(flag) => {
                if flag.version >= self.flag.version {
                    self.flag = flag;
                }
            }
            StateDelta::Score(score) => self.score = score,
            StateDelta::Phase(phase) => {
                self.phase = phase;
                if phase == GamePhase::Lobby {
                    self.winner = None;
                }
            }
            StateDelta::GameOver(team) => {
                tracing::info!(%team, "match won");
                self.winner = Some(team);
                self.last_game_over = Some(team);
            }
            StateDelta::UnitJoined(identity) => {
                self.units.entry(identity.id()).or_default().identity = Some(identity);
                if let Some(view) = self.units.get_mut(&identity.id()) {
                    view.connected = true;
                }
            }
            StateDelta::UnitStatus { unit, connected } => {
                self.units.entry(unit).or_default().connected = connected;
            }
            StateDelta::UnitLeft(unit) => {
                self.units.remove(&unit);
            }
        }
    }

    /// Flag holder's identity, if known.
    #[must_use]
    pub fn holder(&self) -> Option<UnitIdentity> {
        let id = self.flag.holder()?;
        self.units.get(&id).and_then(|u| u.identity)
    }
}

/// Console node.
pub struct ConsoleClient<T> {
    endpoint: Endpoint<T>,
    session: SessionManager,
    feed: ArbiterFeed,
    sequences: Outbox,
    view: MatchView,
}

impl<T: Transport> ConsoleClient<T> {
    /// Creates a console and subscribes to state and telemetry.
    ///
    /// # Errors
    ///
    /// Fails if the subscriptions cannot be sent.
    pub fn new(transport: T, reliability: &ReliabilityConfig, session: SessionConfig) -> NetResult<Self> {
        // Sync requests go out under the reserved id; see `Topic::ConsoleSync`.
        let mut endpoint = Endpoint::new(transport, UnitId::ARBITER);
        let arbiter_heartbeat = Topic::Heartbeat(UnitId::ARBITER).name();
        endpoint.subscribe_all(&[ARBITER_STATE, ALL_UNIT_TELEMETRY, &arbiter_heartbeat])?;
        Ok(Self {
            endpoint,
            session: SessionManager::new(session, true),
            feed: ArbiterFeed::new(reliability.dedup_window),
            sequences: Outbox::new(reliability.clone()),
            view: MatchView::default(),
        })
    }

    /// Current view.
    #[must_use]
    pub const fn view(&self) -> &MatchView {
        &self.view
    }

    /// Session state.
    #[must_use]
    pub const fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> NodeStats {
        self.endpoint.stats()
    }

    /// Drains pending messages into the view. Returns messages processed.
    pub fn tick(&mut self, now: Timestamp) -> usize {
        // Heartbeats are the arbiter's and units' business.
        for action in self.endpoint.supervise(&mut self.session, now) {
            match action {
                SessionAction::Established => self.request_snapshot(),
                SessionAction::Lost { .. } => self.view.stale = true,
                SessionAction::SendHeartbeat | SessionAction::Idle | SessionAction::Reconnect => {}
            }
        }

        let mut processed = 0;
        while let Some(envelope) = self.endpoint.receive() {
            self.session.heard(now);
            self.dispatch(now, envelope);
            processed += 1;
        }
        processed
    }

    fn request_snapshot(&mut self) {
        tracing::info!("console connected, requesting snapshot");
        self.view.stale = true;
        let seq = self.sequences.next_sequence();
        self.endpoint.send(&Topic::ConsoleSync.name(), seq, &Message::SyncRequest);
    }

    fn dispatch(&mut self, now: Timestamp, envelope: Envelope) {
        let Envelope {
            sender,
            sequence,
            message,
        } = envelope;

        if let Message::Telemetry(telemetry) = message {
            let view = self.view.units.entry(sender).or_default();
            view.telemetry = Some(telemetry);
            view.telemetry_at = Some(now);
            return;
        }

        match self.feed.check(message.kind(), sequence) {
            FeedCheck::Duplicate => {
                self.endpoint.stats_mut().duplicates += 1;
                return;
            }
            FeedCheck::Restarted => {
                tracing::warn!("arbiter restarted, waiting for snapshot");
                self.view.stale = true;
            }
            FeedCheck::Accept => {}
        }

        match message {
            Message::State(update) => self.on_state(&update),
            Message::Snapshot(snapshot) => {
                self.feed.resync(snapshot.revision);
                if self.view.stale {
                    tracing::info!(revision = snapshot.revision, "view resynchronized");
                    self.endpoint.stats_mut().resyncs += 1;
                }
                self.view.apply_snapshot(&snapshot);
            }
            Message::Heartbeat => {}
            other => tracing::debug!(kind = other.kind().name(), "unexpected message on console"),
        }
    }

    fn on_state(&mut self, update: &StateUpdate) {
        if let Err(gap) = self.feed.observe(update.revision) {
            tracing::warn!("{}, waiting for snapshot", gap);
            self.view.stale = true;
        }
        for delta in &update.deltas {
            self.view.apply_delta(delta);
        }
        self.view.revision = self.view.revision.max(update.revision);
    }
}
