//! The arbiter's transition function.
//!
//! Events are processed strictly one at a time in arrival order, so two
//! capture claims can never both succeed: the first one that finds the flag
//! at the center wins and every later one is rejected with a corrective
//! broadcast.

use super::replay::{LoggedEvent, ReplayLog};
use super::roster::Roster;
use super::snapshot::{Decision, MatchSnapshot, SessionSweep, StateDelta, UnitCommand, UnitSummary};
use crate::error::{CoreResult, RejectReason, Verdict};
use crate::rules::Rules;
use skirmish_shared::{
    EventKind, FlagLocation, FlagState, GameEvent, GamePhase, Team, TeamScore, Timestamp, UnitId, UnitIdentity,
};
use std::time::Duration;

/// Authoritative match state.
#[derive(Clone, Debug)]
pub struct ArbiterMachine {
    rules: Rules,
    phase: GamePhase,
    flag: FlagState,
    score: TeamScore,
    winner: Option<Team>,
    roster: Roster,
    replay: ReplayLog,
    revision: u64,
}

/// Scratch space for one operation.
#[derive(Default)]
struct Changes {
    deltas: Vec<StateDelta>,
    commands: Vec<(UnitId, UnitCommand)>,
}

impl ArbiterMachine {
    /// Creates a machine in the lobby.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules are unplayable.
    pub fn new(rules: Rules) -> CoreResult<Self> {
        rules.validate()?;
        Ok(Self {
            roster: Roster::new(rules.max_units),
            replay: ReplayLog::new(rules.replay_depth),
            rules,
            phase: GamePhase::Lobby,
            flag: FlagState::INITIAL,
            score: TeamScore::default(),
            winner: None,
            revision: 0,
        })
    }

    /// Active rules.
    #[must_use]
    pub const fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Current flag state.
    #[must_use]
    pub const fn flag(&self) -> FlagState {
        self.flag
    }

    /// Current score.
    #[must_use]
    pub const fn score(&self) -> TeamScore {
        self.score
    }

    /// Winner, once the match ended.
    #[must_use]
    pub const fn winner(&self) -> Option<Team> {
        self.winner
    }

    /// Registered units.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Revision of the last broadcast change.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Adjudicated history of a unit, oldest first.
    #[must_use]
    pub fn replay_for(&self, unit: UnitId) -> Vec<LoggedEvent> {
        self.replay.history(unit)
    }

    /// Logged decision for `(unit, sequence)`, if still in the history.
    #[must_use]
    pub fn logged(&self, unit: UnitId, sequence: u32) -> Option<&LoggedEvent> {
        self.replay.lookup(unit, sequence)
    }

    /// Drops the adjudication history of `unit` (its sequences restarted).
    pub fn forget_history(&mut self, unit: UnitId) {
        self.replay.forget(unit);
    }

    /// Returns true if `unit` is registered.
    #[must_use]
    pub fn is_registered(&self, unit: UnitId) -> bool {
        self.roster.contains(unit)
    }

    /// Registers (or re-registers) a unit.
    pub fn register(&mut self, now: Timestamp, identity: UnitIdentity) -> Decision {
        let mut changes = Changes::default();
        let known = self.roster.contains(identity.id());

        let verdict = if self.phase == GamePhase::Ended && !known {
            Verdict::Rejected(RejectReason::GameOver)
        } else {
            let was_connected = self.roster.get(identity.id()).is_some_and(|r| r.connected);
            match self.roster.admit(now, identity) {
                Ok(true) => {
                    tracing::info!(%identity, "unit registered");
                    changes.deltas.push(StateDelta::UnitJoined(identity));
                    Verdict::Accepted
                }
                Ok(false) => {
                    if !was_connected {
                        tracing::info!(%identity, "unit rejoined");
                        changes.deltas.push(StateDelta::UnitStatus {
                            unit: identity.id(),
                            connected: true,
                        });
                    }
                    Verdict::Accepted
                }
                Err(reason) => Verdict::Rejected(reason),
            }
        };

        if let Verdict::Rejected(reason) = verdict {
            tracing::warn!(%identity, %reason, "registration refused");
        }
        self.commit(verdict, changes)
    }

    /// Starts the match. `force` skips the both-teams check.
    pub fn start_match(&mut self, force: bool) -> Decision {
        let mut changes = Changes::default();
        let verdict = match self.phase {
            GamePhase::Active => Verdict::Accepted,
            GamePhase::Ended => Verdict::Rejected(RejectReason::GameOver),
            GamePhase::Lobby if !force && !self.roster.has_both_teams() => {
                Verdict::Rejected(RejectReason::TeamsIncomplete)
            }
            GamePhase::Lobby => {
                self.phase = GamePhase::Active;
                tracing::info!(units = self.roster.len(), force, "match started");
                changes.deltas.push(StateDelta::Phase(GamePhase::Active));
                Verdict::Accepted
            }
        };
        self.commit(verdict, changes)
    }

    /// Back to the lobby with score zeroed and the flag at center.
    ///
    /// Registered units stay; each receives a reset command.
    pub fn reset_match(&mut self) -> Decision {
        let mut changes = Changes::default();
        self.phase = GamePhase::Lobby;
        self.score = TeamScore::default();
        self.winner = None;
        // Version keeps counting so cached copies see the reset as newer.
        self.flag.relocate(FlagLocation::AtCenter);
        self.replay.clear();
        self.roster.clear_stats();

        changes.deltas.push(StateDelta::Phase(GamePhase::Lobby));
        changes.deltas.push(StateDelta::Score(self.score));
        changes.deltas.push(StateDelta::Flag(self.flag));
        changes.commands = self.roster.ids().into_iter().map(|id| (id, UnitCommand::Reset)).collect();

        tracing::info!("match reset");
        self.commit(Verdict::Accepted, changes)
    }

    /// Records a heartbeat. Returns a status change if the unit was down.
    pub fn heartbeat(&mut self, now: Timestamp, unit: UnitId) -> Option<Decision> {
        if !self.roster.touch(now, unit) {
            return None;
        }
        tracing::info!(%unit, "unit session restored");
        let changes = Changes {
            deltas: vec![StateDelta::UnitStatus { unit, connected: true }],
            commands: Vec::new(),
        };
        Some(self.commit(Verdict::Accepted, changes))
    }

    /// Stores a telemetry reading.
    pub fn record_telemetry(&mut self, now: Timestamp, unit: UnitId, battery_pct: u8) {
        self.roster.touch(now, unit);
        if let Some(record) = self.roster.get_mut(unit) {
            record.battery_pct = Some(battery_pct.min(100));
        }
    }

    /// Adjudicates one event from `origin`.
    ///
    /// `sequence` is the sender's message sequence; a repeat of an already
    /// logged critical event gets its original verdict and changes nothing.
    pub fn handle(&mut self, now: Timestamp, origin: UnitId, sequence: u32, event: &GameEvent) -> Decision {
        if let Some(logged) = self.replay.lookup(origin, sequence) {
            if logged.event == *event {
                tracing::debug!(unit = %origin, sequence, "duplicate event answered from log");
                let verdict = logged.verdict;
                return self.commit(verdict, Changes::default());
            }
        }

        let mut changes = Changes::default();
        let verdict = match self.adjudicate(now, origin, event, &mut changes) {
            Ok(()) => Verdict::Accepted,
            Err(reason) => Verdict::Rejected(reason),
        };

        match verdict {
            Verdict::Accepted => tracing::debug!(unit = %origin, tag = ?event.tag(), "event accepted"),
            Verdict::Rejected(reason) => {
                tracing::info!(unit = %origin, tag = ?event.tag(), %reason, "event rejected");
            }
        }

        let decision = self.commit(verdict, changes);
        if event.is_critical() && self.roster.contains(origin) {
            self.replay.record(
                origin,
                LoggedEvent {
                    sequence,
                    event: event.clone(),
                    verdict,
                    flag: self.flag,
                },
            );
        }
        decision
    }

    fn adjudicate(
        &mut self,
        now: Timestamp,
        origin: UnitId,
        event: &GameEvent,
        changes: &mut Changes,
    ) -> Result<(), RejectReason> {
        let Some(record) = self.roster.get(origin) else {
            return Err(RejectReason::UnknownUnit);
        };
        if event.unit != origin {
            return Err(RejectReason::IdentityMismatch);
        }
        let team = record.identity.team();

        if self.roster.touch(now, origin) {
            changes.deltas.push(StateDelta::UnitStatus {
                unit: origin,
                connected: true,
            });
        }

        if let EventKind::Disconnect = event.kind {
            if self.roster.mark_disconnected(now, origin) {
                tracing::info!(unit = %origin, "unit announced disconnect");
                changes.deltas.push(StateDelta::UnitStatus {
                    unit: origin,
                    connected: false,
                });
            }
            return Ok(());
        }

        match self.phase {
            GamePhase::Lobby => return Err(RejectReason::NotActive),
            GamePhase::Ended => return Err(RejectReason::GameOver),
            GamePhase::Active => {}
        }

        match &event.kind {
            EventKind::Hit { shooter } => {
                self.on_hit(origin, *shooter, changes);
                Ok(())
            }
            EventKind::ZoneEnter | EventKind::ZoneExit | EventKind::Disconnect => Ok(()),
            EventKind::CaptureComplete => self.on_capture(origin, changes),
            EventKind::FlagDrop => {
                if !self.flag.is_held_by(origin) {
                    return Err(RejectReason::NotFlagHolder);
                }
                self.move_flag(FlagLocation::AtCenter, changes);
                Ok(())
            }
            EventKind::Deposit {
                team: claimed,
                base_code,
            } => self.on_deposit(origin, team, *claimed, base_code, changes),
        }
    }

    fn on_hit(&mut self, origin: UnitId, shooter: Option<UnitId>, changes: &mut Changes) {
        if let Some(record) = self.roster.get_mut(origin) {
            record.hits_taken = record.hits_taken.saturating_add(1);
        }
        if let Some(record) = shooter.and_then(|s| self.roster.get_mut(s)) {
            record.hits_landed = record.hits_landed.saturating_add(1);
        }
        if self.flag.is_held_by(origin) {
            tracing::info!(unit = %origin, "flag holder hit, flag returns to center");
            self.move_flag(FlagLocation::AtCenter, changes);
            changes.commands.push((origin, UnitCommand::ForceDrop));
        }
    }

    fn on_capture(&mut self, origin: UnitId, changes: &mut Changes) -> Result<(), RejectReason> {
        if self.flag.is_held_by(origin) {
            // Repeated claim by the winner.
            return Ok(());
        }
        if !self.flag.is_at_center() {
            changes.deltas.push(StateDelta::Flag(self.flag));
            return Err(RejectReason::FlagNotAtCenter);
        }
        tracing::info!(unit = %origin, "flag captured");
        self.move_flag(FlagLocation::HeldBy(origin), changes);
        Ok(())
    }

    fn on_deposit(
        &mut self,
        origin: UnitId,
        team: Team,
        claimed: Team,
        base_code: &str,
        changes: &mut Changes,
    ) -> Result<(), RejectReason> {
        if !self.flag.is_held_by(origin) {
            return Err(RejectReason::NotFlagHolder);
        }
        if claimed != team {
            return Err(RejectReason::WrongTeam);
        }
        if base_code != self.rules.base_code(team) {
            return Err(RejectReason::WrongBase);
        }

        let count = self.score.increment(team);
        tracing::info!(unit = %origin, %team, count, "flag deposited");
        changes.deltas.push(StateDelta::Score(self.score));

        if count >= self.rules.winning_score {
            self.move_flag(FlagLocation::AtBase(team), changes);
            self.phase = GamePhase::Ended;
            self.winner = Some(team);
            tracing::info!(%team, score = %self.score, "match over");
            changes.deltas.push(StateDelta::Phase(GamePhase::Ended));
            changes.deltas.push(StateDelta::GameOver(team));
        } else {
            self.move_flag(FlagLocation::AtCenter, changes);
        }
        Ok(())
    }

    /// Declares silent units disconnected and removes expired ones.
    pub fn sweep_sessions(&mut self, now: Timestamp, link_timeout: Duration, grace: Duration) -> SessionSweep {
        let mut sweep = SessionSweep::default();
        let mut changes = Changes::default();

        let silent: Vec<UnitId> = self
            .roster
            .iter()
            .filter(|r| r.connected && r.silence(now) > link_timeout)
            .map(|r| r.identity.id())
            .collect();
        for unit in silent {
            if self.roster.mark_disconnected(now, unit) {
                tracing::warn!(%unit, "unit session lost");
                changes.deltas.push(StateDelta::UnitStatus { unit, connected: false });
                sweep.disconnected.push(unit);
            }
        }

        let expired: Vec<UnitId> = self
            .roster
            .iter()
            .filter(|r| r.disconnected_since.is_some_and(|since| now.saturating_since(since) >= grace))
            .map(|r| r.identity.id())
            .collect();
        for unit in expired {
            self.roster.remove(unit);
            self.replay.forget(unit);
            if self.flag.is_held_by(unit) {
                tracing::warn!(%unit, "holder removed, flag returns to center");
                self.move_flag(FlagLocation::AtCenter, &mut changes);
            }
            tracing::warn!(%unit, "unit removed after grace period");
            changes.deltas.push(StateDelta::UnitLeft(unit));
            changes.commands.push((unit, UnitCommand::Reset));
            sweep.removed.push(unit);
        }

        let decision = self.commit(Verdict::Accepted, changes);
        sweep.deltas = decision.deltas;
        sweep.commands = decision.commands;
        sweep.revision = decision.revision;
        sweep
    }

    /// Full state for resync and periodic broadcast.
    #[must_use]
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            phase: self.phase,
            flag: self.flag,
            score: self.score,
            winner: self.winner,
            revision: self.revision,
            units: self
                .roster
                .iter()
                .map(|r| UnitSummary {
                    identity: r.identity,
                    connected: r.connected,
                    hits_taken: r.hits_taken,
                    hits_landed: r.hits_landed,
                    battery_pct: r.battery_pct,
                })
                .collect(),
        }
    }

    fn move_flag(&mut self, location: FlagLocation, changes: &mut Changes) {
        self.flag.relocate(location);
        changes.deltas.push(StateDelta::Flag(self.flag));
    }

    fn commit(&mut self, verdict: Verdict, changes: Changes) -> Decision {
        if !changes.deltas.is_empty() {
            self.revision += 1;
        }
        Decision {
            verdict,
            flag: self.flag,
            deltas: changes.deltas,
            commands: changes.commands,
            revision: self.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED_1: UnitId = UnitId(1);
    const RED_2: UnitId = UnitId(2);
    const BLUE_1: UnitId = UnitId(3);

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn active_match() -> ArbiterMachine {
        let mut arbiter = ArbiterMachine::new(Rules::default()).unwrap();
        arbiter.register(ms(0), UnitIdentity::new(RED_1, Team::Red));
        arbiter.register(ms(0), UnitIdentity::new(RED_2, Team::Red));
        arbiter.register(ms(0), UnitIdentity::new(BLUE_1, Team::Blue));
        assert!(arbiter.start_match(false).verdict.is_accepted());
        arbiter
    }

    fn event(unit: UnitId, kind: EventKind) -> GameEvent {
        GameEvent::new(unit, ms(1_000), kind)
    }

    fn deposit(unit: UnitId, team: Team) -> GameEvent {
        let base_code = Rules::default().base_code(team).to_string();
        event(unit, EventKind::Deposit { team, base_code })
    }

    #[test]
    fn test_first_claim_wins() {
        let mut arbiter = active_match();
        let first = arbiter.handle(ms(5_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        let second = arbiter.handle(ms(5_001), BLUE_1, 1, &event(BLUE_1, EventKind::CaptureComplete));

        assert_eq!(first.verdict, Verdict::Accepted);
        assert_eq!(second.verdict, Verdict::Rejected(RejectReason::FlagNotAtCenter));
        assert_eq!(arbiter.flag().holder(), Some(RED_1));
        // Loser gets a corrective broadcast
        assert_eq!(second.deltas, vec![StateDelta::Flag(arbiter.flag())]);
    }

    #[test]
    fn test_duplicate_claim_by_holder_is_idempotent() {
        let mut arbiter = active_match();
        arbiter.handle(ms(5_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        let version = arbiter.flag().version;
        let again = arbiter.handle(ms(5_500), RED_1, 2, &event(RED_1, EventKind::CaptureComplete));
        assert!(again.verdict.is_accepted());
        assert!(!again.has_changes());
        assert_eq!(arbiter.flag().version, version);
    }

    #[test]
    fn test_repeated_sequence_returns_logged_verdict() {
        let mut arbiter = active_match();
        let claim = event(BLUE_1, EventKind::CaptureComplete);
        arbiter.handle(ms(5_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        let first = arbiter.handle(ms(5_001), BLUE_1, 7, &claim);
        let replayed = arbiter.handle(ms(5_600), BLUE_1, 7, &claim);
        assert_eq!(first.verdict, replayed.verdict);
        assert!(replayed.deltas.is_empty());
    }

    #[test]
    fn test_hit_on_holder_returns_flag() {
        let mut arbiter = active_match();
        arbiter.handle(ms(5_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));

        let hit = arbiter.handle(ms(6_000), RED_1, 2, &event(RED_1, EventKind::Hit { shooter: Some(BLUE_1) }));
        assert!(hit.verdict.is_accepted());
        assert!(arbiter.flag().is_at_center());
        assert_eq!(hit.commands, vec![(RED_1, UnitCommand::ForceDrop)]);
        assert_eq!(arbiter.roster().get(BLUE_1).unwrap().hits_landed, 1);
        assert_eq!(arbiter.roster().get(RED_1).unwrap().hits_taken, 1);

        // The follow-up drop request is moot.
        let drop = arbiter.handle(ms(6_010), RED_1, 3, &event(RED_1, EventKind::FlagDrop));
        assert_eq!(drop.verdict, Verdict::Rejected(RejectReason::NotFlagHolder));
    }

    #[test]
    fn test_deposit_validation_order() {
        let mut arbiter = active_match();
        assert_eq!(
            arbiter.handle(ms(1), RED_1, 1, &deposit(RED_1, Team::Red)).verdict,
            Verdict::Rejected(RejectReason::NotFlagHolder)
        );

        arbiter.handle(ms(5_000), RED_1, 2, &event(RED_1, EventKind::CaptureComplete));
        assert_eq!(
            arbiter.handle(ms(9_000), RED_1, 3, &deposit(RED_1, Team::Blue)).verdict,
            Verdict::Rejected(RejectReason::WrongTeam)
        );
        let wrong_base = event(
            RED_1,
            EventKind::Deposit {
                team: Team::Red,
                base_code: "BASE-BLUE".into(),
            },
        );
        assert_eq!(
            arbiter.handle(ms(9_100), RED_1, 4, &wrong_base).verdict,
            Verdict::Rejected(RejectReason::WrongBase)
        );
        assert_eq!(arbiter.flag().holder(), Some(RED_1));

        let ok = arbiter.handle(ms(9_200), RED_1, 5, &deposit(RED_1, Team::Red));
        assert!(ok.verdict.is_accepted());
        assert_eq!(arbiter.score().get(Team::Red), 1);
        assert!(arbiter.flag().is_at_center());
    }

    #[test]
    fn test_third_deposit_ends_match() {
        let mut arbiter = active_match();
        let mut seq = 0;
        let mut last = None;
        for _ in 0..3 {
            seq += 1;
            arbiter.handle(ms(1_000), RED_1, seq, &event(RED_1, EventKind::CaptureComplete));
            seq += 1;
            last = Some(arbiter.handle(ms(2_000), RED_1, seq, &deposit(RED_1, Team::Red)));
        }
        let last = last.unwrap();

        assert_eq!(arbiter.phase(), GamePhase::Ended);
        assert_eq!(arbiter.winner(), Some(Team::Red));
        assert_eq!(arbiter.flag().location, FlagLocation::AtBase(Team::Red));
        assert_eq!(
            last.deltas,
            vec![
                StateDelta::Score(TeamScore::new(3, 0)),
                StateDelta::Flag(arbiter.flag()),
                StateDelta::Phase(GamePhase::Ended),
                StateDelta::GameOver(Team::Red),
            ]
        );

        let late = arbiter.handle(ms(3_000), BLUE_1, 1, &event(BLUE_1, EventKind::CaptureComplete));
        assert_eq!(late.verdict, Verdict::Rejected(RejectReason::GameOver));
    }

    #[test]
    fn test_lobby_rejects_gameplay() {
        let mut arbiter = ArbiterMachine::new(Rules::default()).unwrap();
        arbiter.register(ms(0), UnitIdentity::new(RED_1, Team::Red));
        let d = arbiter.handle(ms(10), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        assert_eq!(d.verdict, Verdict::Rejected(RejectReason::NotActive));
        assert_eq!(arbiter.start_match(false).verdict, Verdict::Rejected(RejectReason::TeamsIncomplete));
        assert!(arbiter.start_match(true).verdict.is_accepted());
    }

    #[test]
    fn test_identity_checks() {
        let mut arbiter = active_match();
        let stranger = arbiter.handle(ms(10), UnitId(42), 1, &event(UnitId(42), EventKind::CaptureComplete));
        assert_eq!(stranger.verdict, Verdict::Rejected(RejectReason::UnknownUnit));
        let forged = arbiter.handle(ms(10), RED_1, 1, &event(BLUE_1, EventKind::CaptureComplete));
        assert_eq!(forged.verdict, Verdict::Rejected(RejectReason::IdentityMismatch));
        assert!(arbiter.flag().is_at_center());
    }

    #[test]
    fn test_session_sweep_grace_then_removal() {
        let mut arbiter = active_match();
        arbiter.handle(ms(1_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        let timeout = Duration::from_secs(3);
        let grace = Duration::from_secs(10);

        for unit in [RED_2, BLUE_1] {
            arbiter.heartbeat(ms(4_000), unit);
        }
        let sweep = arbiter.sweep_sessions(ms(4_500), timeout, grace);
        assert_eq!(sweep.disconnected, vec![RED_1]);
        // Possession held through the grace period
        assert_eq!(arbiter.flag().holder(), Some(RED_1));

        for unit in [RED_2, BLUE_1] {
            arbiter.heartbeat(ms(14_000), unit);
        }
        let sweep = arbiter.sweep_sessions(ms(14_500), timeout, grace);
        assert_eq!(sweep.removed, vec![RED_1]);
        assert!(arbiter.flag().is_at_center());
        assert!(sweep.deltas.contains(&StateDelta::UnitLeft(RED_1)));
        assert_eq!(sweep.commands, vec![(RED_1, UnitCommand::Reset)]);
        assert!(!arbiter.is_registered(RED_1));
    }

    #[test]
    fn test_reconnect_within_grace_keeps_flag() {
        let mut arbiter = active_match();
        arbiter.handle(ms(1_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        arbiter.sweep_sessions(ms(5_000), Duration::from_secs(3), Duration::from_secs(10));
        assert!(!arbiter.roster().get(RED_1).unwrap().connected);

        let back = arbiter.heartbeat(ms(6_000), RED_1).unwrap();
        assert_eq!(back.deltas, vec![StateDelta::UnitStatus { unit: RED_1, connected: true }]);
        assert_eq!(arbiter.flag().holder(), Some(RED_1));
    }

    #[test]
    fn test_reset_keeps_flag_version_monotonic() {
        let mut arbiter = active_match();
        arbiter.handle(ms(1_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        let before = arbiter.flag().version;
        let reset = arbiter.reset_match();
        assert_eq!(arbiter.phase(), GamePhase::Lobby);
        assert!(arbiter.flag().version > before);
        assert_eq!(reset.commands.len(), 3);
        assert!(arbiter.replay_for(RED_1).is_empty());
    }

    #[test]
    fn test_revision_bumps_only_on_change() {
        let mut arbiter = active_match();
        let r = arbiter.revision();
        arbiter.handle(ms(10), RED_1, 1, &event(RED_1, EventKind::ZoneEnter));
        assert_eq!(arbiter.revision(), r);
        let d = arbiter.handle(ms(5_010), RED_1, 2, &event(RED_1, EventKind::CaptureComplete));
        assert_eq!(d.revision, r + 1);
        assert_eq!(arbiter.snapshot().revision, r + 1);
    }

    #[test]
    fn test_registration_rules() {
        let mut arbiter = active_match();
        let clash = arbiter.register(ms(10), UnitIdentity::new(RED_1, Team::Blue));
        assert_eq!(clash.verdict, Verdict::Rejected(RejectReason::AlreadyRegistered));
        let again = arbiter.register(ms(10), UnitIdentity::new(RED_1, Team::Red));
        assert!(again.verdict.is_accepted());
        assert!(again.deltas.is_empty());
    }

    #[test]
    fn test_forget_history_after_restart() {
        let mut arbiter = active_match();
        arbiter.handle(ms(5_000), RED_1, 1, &event(RED_1, EventKind::CaptureComplete));
        assert!(arbiter.logged(RED_1, 1).is_some());

        arbiter.forget_history(RED_1);
        assert!(arbiter.logged(RED_1, 1).is_none());
        assert!(arbiter.replay_for(RED_1).is_empty());
        assert_eq!(arbiter.flag().holder(), Some(RED_1));
    }
}
