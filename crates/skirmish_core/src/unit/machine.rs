//! The unit's transition function.

use super::capture::{CaptureProgress, CaptureStatus};
use super::stun::StunState;
use crate::arbiter::UnitCommand;
use crate::error::{IllegalTransition, Verdict};
use crate::rules::Rules;
use skirmish_shared::{EventKind, EventTag, FlagState, GameEvent, Timestamp, UnitId, UnitIdentity};
use std::time::Duration;

/// Whether this unit carries the flag, as last confirmed by the arbiter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Possession {
    /// Not carrying.
    #[default]
    NotCarrying,
    /// Carrying.
    Carrying,
}

/// Signals from the unit's sensors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensorEvent {
    /// Infrared receiver decoded a hit.
    Hit {
        /// Shooter, when the IR code carries it.
        shooter: Option<UnitId>,
    },
    /// Line sensor sees the capture zone.
    ZoneEnter,
    /// Line sensor left the capture zone.
    ZoneExit,
    /// A QR code was decoded at a base.
    DepositScan {
        /// Decoded payload.
        code: String,
    },
}

/// Everything the unit machine consumes, in queue order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitInput {
    /// A sensor fired.
    Sensor(SensorEvent),
    /// Periodic tick; only advances time-based transitions.
    Tick,
    /// The arbiter adjudicated one of our critical events.
    Verdict {
        /// Kind of event that was adjudicated.
        tag: EventTag,
        /// The verdict.
        verdict: Verdict,
        /// Flag state at decision time.
        flag: FlagState,
    },
    /// Authoritative flag broadcast.
    FlagUpdate(FlagState),
    /// Corrective command; applied unconditionally.
    Command {
        /// The command.
        command: UnitCommand,
        /// Flag state when the command was issued.
        flag: FlagState,
    },
    /// Authoritative snapshot after (re)connection; overwrites local state.
    Resync {
        /// Snapshot flag.
        flag: FlagState,
        /// Whether the arbiter still has us on its roster.
        registered: bool,
    },
    /// A critical event ran out of retransmissions; no verdict will come.
    Abandoned {
        /// Kind of event given up on.
        tag: EventTag,
    },
}

impl UnitInput {
    fn name(&self) -> &'static str {
        match self {
            Self::Sensor(SensorEvent::Hit { .. }) => "HIT",
            Self::Sensor(SensorEvent::ZoneEnter) => "ZONE_ENTER",
            Self::Sensor(SensorEvent::ZoneExit) => "ZONE_EXIT",
            Self::Sensor(SensorEvent::DepositScan { .. }) => "DEPOSIT",
            Self::Tick => "TICK",
            Self::Verdict { .. } => "VERDICT",
            Self::FlagUpdate(_) => "FLAG_UPDATE",
            Self::Command { .. } => "COMMAND",
            Self::Resync { .. } => "RESYNC",
            Self::Abandoned { .. } => "ABANDONED",
        }
    }
}

/// Controller feedback cue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RumbleCue {
    /// We got hit.
    Hit,
    /// Capture completed.
    Capture,
    /// Flag now carried.
    Carry,
}

/// Fire-and-forget requests for presentation and haptic collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Show the stun indicator until the given time.
    StunStarted {
        /// End of lockout.
        until: Timestamp,
    },
    /// Stun indicator off.
    StunCleared,
    /// Capture-zone audible/visual feedback.
    CaptureFeedback(CaptureStatus),
    /// Flag possession indicator.
    FlagIndicator {
        /// Whether the flag is carried.
        carrying: bool,
    },
    /// Controller rumble.
    Rumble(RumbleCue),
}

/// What a transition asks the outside world to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitOutput {
    /// Send this event to the arbiter.
    Publish(GameEvent),
    /// Trigger a local effect.
    Effect(Effect),
}

/// Result of applying one input.
///
/// Time-based transitions run before the input, so `outputs` may be
/// non-empty even when the input itself was ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// Requested outputs, in order.
    pub outputs: Vec<UnitOutput>,
    /// Set when the input was an impossible transition and was dropped.
    pub ignored: Option<IllegalTransition>,
}

impl Transition {
    /// Returns true if the input was dropped.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        self.ignored.is_some()
    }

    /// Events to publish.
    pub fn published(&self) -> impl Iterator<Item = &GameEvent> {
        self.outputs.iter().filter_map(|o| match o {
            UnitOutput::Publish(event) => Some(event),
            UnitOutput::Effect(_) => None,
        })
    }

    /// Effects to trigger.
    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.outputs.iter().filter_map(|o| match o {
            UnitOutput::Effect(effect) => Some(effect),
            UnitOutput::Publish(_) => None,
        })
    }
}

/// The unit's state machine.
#[derive(Clone, Debug)]
pub struct UnitMachine {
    identity: UnitIdentity,
    capture_threshold: Duration,
    stun_lockout: Duration,
    capture: CaptureProgress,
    stun: StunState,
    possession: Possession,
    /// Raw line-sensor fact, independent of capture status.
    in_zone: bool,
    /// Cached, possibly stale, authoritative flag.
    flag: FlagState,
    claim_pending: bool,
    drop_pending: bool,
    deposit_pending: bool,
}

impl UnitMachine {
    /// Creates an idle machine.
    #[must_use]
    pub fn new(identity: UnitIdentity, rules: &Rules) -> Self {
        Self {
            identity,
            capture_threshold: rules.capture_duration(),
            stun_lockout: rules.stun_duration(),
            capture: CaptureProgress::new(identity.id()),
            stun: StunState::new(identity.id()),
            possession: Possession::NotCarrying,
            in_zone: false,
            flag: FlagState::INITIAL,
            claim_pending: false,
            drop_pending: false,
            deposit_pending: false,
        }
    }

    /// This unit's identity.
    #[must_use]
    pub const fn identity(&self) -> UnitIdentity {
        self.identity
    }

    /// Capture progress.
    #[must_use]
    pub const fn capture(&self) -> &CaptureProgress {
        &self.capture
    }

    /// Stun state.
    #[must_use]
    pub const fn stun(&self) -> &StunState {
        &self.stun
    }

    /// Arbiter-confirmed possession.
    #[must_use]
    pub const fn possession(&self) -> Possession {
        self.possession
    }

    /// Whether the line sensor currently reports the zone.
    #[must_use]
    pub const fn in_zone(&self) -> bool {
        self.in_zone
    }

    /// Cached flag state.
    #[must_use]
    pub const fn cached_flag(&self) -> FlagState {
        self.flag
    }

    /// Whether a capture claim awaits adjudication.
    #[must_use]
    pub const fn claim_pending(&self) -> bool {
        self.claim_pending
    }

    /// Whether a deposit awaits adjudication.
    #[must_use]
    pub const fn deposit_pending(&self) -> bool {
        self.deposit_pending
    }

    /// Whether a drop request awaits adjudication.
    #[must_use]
    pub const fn drop_pending(&self) -> bool {
        self.drop_pending
    }

    /// Whether the unit is locked out at `now`.
    #[must_use]
    pub fn is_stunned(&self, now: Timestamp) -> bool {
        self.stun.is_active(now)
    }

    /// Applies one input at `now`.
    pub fn apply(&mut self, now: Timestamp, input: UnitInput) -> Transition {
        let mut outputs = Vec::new();
        self.advance(now, &mut outputs);

        let name = input.name();
        let refused = match input {
            UnitInput::Sensor(SensorEvent::Hit { shooter }) => {
                self.on_hit(now, shooter, &mut outputs);
                None
            }
            UnitInput::Sensor(SensorEvent::ZoneEnter) => self.on_zone_enter(now, &mut outputs),
            UnitInput::Sensor(SensorEvent::ZoneExit) => self.on_zone_exit(now, &mut outputs),
            UnitInput::Sensor(SensorEvent::DepositScan { code }) => self.on_deposit_scan(now, code, &mut outputs),
            UnitInput::Tick => None,
            UnitInput::Verdict { tag, verdict, flag } => {
                self.on_verdict(tag, verdict, flag, &mut outputs);
                None
            }
            UnitInput::FlagUpdate(flag) => {
                self.observe_flag(flag, &mut outputs);
                None
            }
            UnitInput::Command { command, flag } => {
                self.on_command(command, flag, &mut outputs);
                None
            }
            UnitInput::Resync { flag, registered } => {
                self.on_resync(flag, registered, &mut outputs);
                None
            }
            UnitInput::Abandoned { tag } => {
                self.on_abandoned(tag, &mut outputs);
                None
            }
        };

        let ignored = refused.map(|reason| {
            let error = IllegalTransition {
                state: self.summary(now),
                input: name,
            };
            tracing::debug!(unit = %self.identity.id(), %error, reason, "input ignored");
            error
        });

        Transition { outputs, ignored }
    }

    /// Time-based transitions: stun expiry and dwell completion.
    fn advance(&mut self, now: Timestamp, out: &mut Vec<UnitOutput>) {
        if self.stun.expire(now) {
            out.push(UnitOutput::Effect(Effect::StunCleared));
        }

        if self.capture.is_capturing() && !self.stun.is_active(now) {
            let dwell = self.capture.accrue(now);
            if dwell >= self.capture_threshold {
                self.capture.complete();
                self.claim_pending = true;
                tracing::info!(unit = %self.identity.id(), dwell_ms = dwell.as_millis() as u64, "capture complete");
                out.push(self.publish(now, EventKind::CaptureComplete));
                out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Complete)));
                out.push(UnitOutput::Effect(Effect::Rumble(RumbleCue::Capture)));
            }
        }
    }

    fn on_hit(&mut self, now: Timestamp, shooter: Option<UnitId>, out: &mut Vec<UnitOutput>) {
        let until = self.stun.hit(now, self.stun_lockout);
        out.push(self.publish(now, EventKind::Hit { shooter }));
        out.push(UnitOutput::Effect(Effect::StunStarted { until }));
        out.push(UnitOutput::Effect(Effect::Rumble(RumbleCue::Hit)));

        if self.capture.is_capturing() {
            self.capture.cancel();
            tracing::info!(unit = %self.identity.id(), "capture canceled by hit");
            out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Canceled)));
        }

        // Possession is only relinquished when the arbiter confirms.
        if self.possession == Possession::Carrying && !self.drop_pending {
            self.drop_pending = true;
            out.push(self.publish(now, EventKind::FlagDrop));
        }
    }

    fn on_zone_enter(&mut self, now: Timestamp, out: &mut Vec<UnitOutput>) -> Option<&'static str> {
        let was_inside = std::mem::replace(&mut self.in_zone, true);
        if was_inside {
            return Some("already inside the zone; exit and re-enter");
        }
        if self.stun.is_active(now) {
            return Some("stunned");
        }
        if self.possession == Possession::Carrying {
            return Some("already carrying the flag");
        }
        if self.claim_pending {
            return Some("capture claim pending");
        }
        if !matches!(self.capture.status, CaptureStatus::Idle | CaptureStatus::Canceled) {
            return Some("capture not idle");
        }

        self.capture.start(now);
        out.push(self.publish(now, EventKind::ZoneEnter));
        out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Capturing)));
        None
    }

    fn on_zone_exit(&mut self, now: Timestamp, out: &mut Vec<UnitOutput>) -> Option<&'static str> {
        if !self.in_zone {
            return Some("not inside the zone");
        }
        self.in_zone = false;
        if self.capture.is_capturing() {
            self.capture.cancel();
            out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Canceled)));
        }
        out.push(self.publish(now, EventKind::ZoneExit));
        None
    }

    fn on_deposit_scan(&mut self, now: Timestamp, code: String, out: &mut Vec<UnitOutput>) -> Option<&'static str> {
        if self.possession != Possession::Carrying {
            return Some("no flag to deposit");
        }
        if self.drop_pending {
            return Some("flag drop pending");
        }
        if self.deposit_pending {
            return Some("deposit already pending");
        }
        self.deposit_pending = true;
        out.push(self.publish(
            now,
            EventKind::Deposit {
                team: self.identity.team(),
                base_code: code,
            },
        ));
        None
    }

    fn on_verdict(&mut self, tag: EventTag, verdict: Verdict, flag: FlagState, out: &mut Vec<UnitOutput>) {
        match tag {
            EventTag::CaptureComplete if self.claim_pending => {
                self.claim_pending = false;
                self.capture.reset();
                if let Verdict::Rejected(reason) = verdict {
                    tracing::info!(unit = %self.identity.id(), %reason, "capture claim rejected");
                    out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Idle)));
                }
            }
            EventTag::Deposit => self.deposit_pending = false,
            EventTag::FlagDrop => self.drop_pending = false,
            _ => {}
        }
        self.observe_flag(flag, out);
    }

    /// Releases the pending flag of an event the arbiter never answered.
    /// Possession is left alone; a later snapshot or late ack corrects it.
    fn on_abandoned(&mut self, tag: EventTag, out: &mut Vec<UnitOutput>) {
        match tag {
            EventTag::CaptureComplete if self.claim_pending => {
                tracing::warn!(unit = %self.identity.id(), "capture claim unanswered, capture reset");
                self.claim_pending = false;
                self.capture.reset();
                out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Idle)));
            }
            EventTag::Deposit => self.deposit_pending = false,
            EventTag::FlagDrop => self.drop_pending = false,
            _ => {}
        }
    }

    fn on_command(&mut self, command: UnitCommand, flag: FlagState, out: &mut Vec<UnitOutput>) {
        tracing::info!(unit = %self.identity.id(), ?command, "arbiter command");
        match command {
            UnitCommand::ForceDrop => {
                self.drop_pending = false;
                self.deposit_pending = false;
                self.set_possession(false, out);
            }
            UnitCommand::Reset => self.clear_all(out),
        }
        self.observe_flag(flag, out);
    }

    fn on_resync(&mut self, flag: FlagState, registered: bool, out: &mut Vec<UnitOutput>) {
        tracing::info!(unit = %self.identity.id(), %flag, registered, "resynchronised from snapshot");
        if !registered {
            self.flag = flag;
            self.clear_all(out);
            return;
        }
        if self.capture.is_capturing() && !flag.is_at_center() && !flag.is_held_by(self.identity.id()) {
            self.capture.cancel();
            out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Canceled)));
        }
        self.flag = flag;
        self.reconcile(out);
    }

    /// Accepts a newer flag state and derives possession from it.
    fn observe_flag(&mut self, flag: FlagState, out: &mut Vec<UnitOutput>) {
        if flag.version <= self.flag.version {
            return;
        }
        self.flag = flag;
        self.reconcile(out);
    }

    fn reconcile(&mut self, out: &mut Vec<UnitOutput>) {
        let me = self.identity.id();
        let carrying = self.flag.is_held_by(me);
        self.set_possession(carrying, out);

        if carrying {
            if self.claim_pending {
                self.claim_pending = false;
                self.capture.reset();
            }
        } else {
            self.drop_pending = false;
            self.deposit_pending = false;
            if self.claim_pending && !self.flag.is_at_center() {
                // Somebody else won the race.
                self.claim_pending = false;
                self.capture.reset();
                out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Idle)));
            }
        }
    }

    fn clear_all(&mut self, out: &mut Vec<UnitOutput>) {
        if self.capture.status != CaptureStatus::Idle {
            self.capture.reset();
            out.push(UnitOutput::Effect(Effect::CaptureFeedback(CaptureStatus::Idle)));
        }
        self.claim_pending = false;
        self.drop_pending = false;
        self.deposit_pending = false;
        self.set_possession(false, out);
    }

    fn set_possession(&mut self, carrying: bool, out: &mut Vec<UnitOutput>) {
        let next = if carrying { Possession::Carrying } else { Possession::NotCarrying };
        if next == self.possession {
            return;
        }
        self.possession = next;
        tracing::info!(unit = %self.identity.id(), carrying, "possession changed");
        out.push(UnitOutput::Effect(Effect::FlagIndicator { carrying }));
        if carrying {
            out.push(UnitOutput::Effect(Effect::Rumble(RumbleCue::Carry)));
        }
    }

    fn publish(&self, now: Timestamp, kind: EventKind) -> UnitOutput {
        UnitOutput::Publish(GameEvent::new(self.identity.id(), now, kind))
    }

    fn summary(&self, now: Timestamp) -> String {
        format!(
            "capture={:?} stunned={} possession={:?} in_zone={}",
            self.capture.status,
            self.stun.is_active(now),
            self.possession,
            self.in_zone
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_shared::{FlagLocation, Team};

    const ME: UnitId = UnitId(1);

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn machine() -> UnitMachine {
        UnitMachine::new(UnitIdentity::new(ME, Team::Red), &Rules::default())
    }

    fn sensor(event: SensorEvent) -> UnitInput {
        UnitInput::Sensor(event)
    }

    fn hit() -> UnitInput {
        sensor(SensorEvent::Hit { shooter: Some(UnitId(9)) })
    }

    fn flag(location: FlagLocation, version: u64) -> FlagState {
        FlagState { location, version }
    }

    fn published_tags(t: &Transition) -> Vec<EventTag> {
        t.published().map(GameEvent::tag).collect()
    }

    /// Drives a unit to CARRYING through an accepted capture.
    fn carrying_machine() -> UnitMachine {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        unit.apply(ms(5_000), UnitInput::Tick);
        unit.apply(
            ms(5_100),
            UnitInput::Verdict {
                tag: EventTag::CaptureComplete,
                verdict: Verdict::Accepted,
                flag: flag(FlagLocation::HeldBy(ME), 1),
            },
        );
        assert_eq!(unit.possession(), Possession::Carrying);
        unit
    }

    #[test]
    fn test_capture_completes_after_five_seconds() {
        let mut unit = machine();
        let t = unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        assert_eq!(published_tags(&t), vec![EventTag::ZoneEnter]);
        assert_eq!(unit.capture().status, CaptureStatus::Capturing);

        let t = unit.apply(ms(4_999), UnitInput::Tick);
        assert!(t.outputs.is_empty());

        let t = unit.apply(ms(5_010), UnitInput::Tick);
        assert_eq!(published_tags(&t), vec![EventTag::CaptureComplete]);
        assert_eq!(unit.capture().status, CaptureStatus::Complete);
        assert!(unit.claim_pending());
        // Possession is not taken optimistically
        assert_eq!(unit.possession(), Possession::NotCarrying);
    }

    #[test]
    fn test_completion_is_not_missed_without_ticks() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        // First input after the threshold is a hit: completion happens first.
        let t = unit.apply(ms(6_000), hit());
        assert_eq!(published_tags(&t), vec![EventTag::CaptureComplete, EventTag::Hit]);
        assert_eq!(unit.capture().status, CaptureStatus::Complete);
    }

    #[test]
    fn test_hit_cancels_capture_and_stuns() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        let t = unit.apply(ms(3_000), hit());

        assert_eq!(unit.capture().status, CaptureStatus::Canceled);
        assert_eq!(unit.capture().dwell, Duration::ZERO);
        assert_eq!(unit.stun().until, Some(ms(5_000)));
        assert!(t.effects().any(|e| *e == Effect::StunStarted { until: ms(5_000) }));
        assert!(t.effects().any(|e| *e == Effect::CaptureFeedback(CaptureStatus::Canceled)));
    }

    #[test]
    fn test_reenter_without_exit_is_rejected() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        unit.apply(ms(3_000), hit());

        // Stun over, still inside: must exit first.
        let t = unit.apply(ms(5_000), sensor(SensorEvent::ZoneEnter));
        assert!(t.is_ignored());
        assert_eq!(unit.capture().status, CaptureStatus::Canceled);
        assert!(!unit.is_stunned(ms(5_000)));

        unit.apply(ms(5_200), sensor(SensorEvent::ZoneExit));
        let t = unit.apply(ms(5_400), sensor(SensorEvent::ZoneEnter));
        assert!(!t.is_ignored());
        assert_eq!(unit.capture().status, CaptureStatus::Capturing);
        assert_eq!(unit.capture().entered_at, Some(ms(5_400)));
    }

    #[test]
    fn test_enter_while_stunned_is_rejected() {
        let mut unit = machine();
        unit.apply(ms(0), hit());
        let t = unit.apply(ms(1_000), sensor(SensorEvent::ZoneEnter));
        assert!(t.is_ignored());
        assert_eq!(unit.capture().status, CaptureStatus::Idle);

        // Expiry alone does not resume anything.
        let t = unit.apply(ms(2_500), UnitInput::Tick);
        assert_eq!(t.effects().copied().collect::<Vec<_>>(), vec![Effect::StunCleared]);
        assert_eq!(unit.capture().status, CaptureStatus::Idle);
    }

    #[test]
    fn test_exit_cancels_and_allows_fresh_entry() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        let t = unit.apply(ms(4_900), sensor(SensorEvent::ZoneExit));
        assert_eq!(published_tags(&t), vec![EventTag::ZoneExit]);
        assert_eq!(unit.capture().status, CaptureStatus::Canceled);
        assert_eq!(unit.capture().dwell, Duration::ZERO);

        unit.apply(ms(6_000), sensor(SensorEvent::ZoneEnter));
        let t = unit.apply(ms(10_999), UnitInput::Tick);
        assert!(t.published().next().is_none());
        let t = unit.apply(ms(11_000), UnitInput::Tick);
        assert_eq!(published_tags(&t), vec![EventTag::CaptureComplete]);
    }

    #[test]
    fn test_spurious_exit_is_noop() {
        let mut unit = machine();
        let t = unit.apply(ms(10), sensor(SensorEvent::ZoneExit));
        assert!(t.is_ignored());
        assert!(t.outputs.is_empty());
    }

    #[test]
    fn test_rehit_never_shrinks_lockout() {
        let mut unit = machine();
        unit.apply(ms(1_000), hit());
        unit.apply(ms(1_500), hit());
        assert_eq!(unit.stun().until, Some(ms(3_500)));
        unit.apply(ms(1_600), hit());
        assert_eq!(unit.stun().until, Some(ms(3_600)));
    }

    #[test]
    fn test_rejected_claim_rolls_back() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        unit.apply(ms(5_000), UnitInput::Tick);

        unit.apply(
            ms(5_050),
            UnitInput::Verdict {
                tag: EventTag::CaptureComplete,
                verdict: Verdict::Rejected(crate::RejectReason::FlagNotAtCenter),
                flag: flag(FlagLocation::HeldBy(UnitId(2)), 1),
            },
        );
        assert_eq!(unit.possession(), Possession::NotCarrying);
        assert_eq!(unit.capture().status, CaptureStatus::Idle);
        assert!(!unit.claim_pending());
    }

    #[test]
    fn test_unanswered_claim_allows_new_capture() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        unit.apply(ms(5_000), UnitInput::Tick);
        assert!(unit.claim_pending());

        let t = unit.apply(
            ms(30_000),
            UnitInput::Abandoned {
                tag: EventTag::CaptureComplete,
            },
        );
        assert!(!unit.claim_pending());
        assert_eq!(unit.capture().status, CaptureStatus::Idle);
        assert!(t.effects().any(|e| *e == Effect::CaptureFeedback(CaptureStatus::Idle)));

        unit.apply(ms(30_100), sensor(SensorEvent::ZoneExit));
        let t = unit.apply(ms(30_200), sensor(SensorEvent::ZoneEnter));
        assert!(!t.is_ignored());
        assert_eq!(unit.capture().status, CaptureStatus::Capturing);
    }

    #[test]
    fn test_unanswered_drop_and_deposit_release_pending() {
        let mut unit = carrying_machine();
        unit.apply(ms(6_000), sensor(SensorEvent::DepositScan { code: "BASE-RED".into() }));
        assert!(unit.deposit_pending());
        unit.apply(ms(6_100), hit());
        assert!(unit.drop_pending());

        unit.apply(ms(40_000), UnitInput::Abandoned { tag: EventTag::Deposit });
        unit.apply(ms(40_000), UnitInput::Abandoned { tag: EventTag::FlagDrop });
        assert!(!unit.deposit_pending());
        assert!(!unit.drop_pending());
        // Only the arbiter takes the flag away.
        assert_eq!(unit.possession(), Possession::Carrying);
    }

    #[test]
    fn test_competing_broadcast_rolls_back_claim() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        unit.apply(ms(5_000), UnitInput::Tick);

        // The corrective broadcast arrives before our ack.
        unit.apply(ms(5_020), UnitInput::FlagUpdate(flag(FlagLocation::HeldBy(UnitId(2)), 1)));
        assert!(!unit.claim_pending());
        assert_eq!(unit.capture().status, CaptureStatus::Idle);
    }

    #[test]
    fn test_hit_while_carrying_requests_drop_without_letting_go() {
        let mut unit = carrying_machine();
        let t = unit.apply(ms(7_000), hit());
        assert_eq!(published_tags(&t), vec![EventTag::Hit, EventTag::FlagDrop]);
        assert_eq!(unit.possession(), Possession::Carrying);
        assert!(unit.drop_pending());

        // A second hit does not repeat the request.
        let t = unit.apply(ms(7_100), hit());
        assert_eq!(published_tags(&t), vec![EventTag::Hit]);

        unit.apply(ms(7_200), UnitInput::FlagUpdate(flag(FlagLocation::AtCenter, 2)));
        assert_eq!(unit.possession(), Possession::NotCarrying);
        assert!(!unit.drop_pending());
    }

    #[test]
    fn test_deposit_waits_for_ack() {
        let mut unit = carrying_machine();
        let t = unit.apply(ms(9_000), sensor(SensorEvent::DepositScan { code: "BASE-RED".into() }));
        let deposit = t.published().next().unwrap();
        assert_eq!(
            deposit.kind,
            EventKind::Deposit {
                team: Team::Red,
                base_code: "BASE-RED".into()
            }
        );
        assert_eq!(unit.possession(), Possession::Carrying);

        // Rescans while pending are ignored.
        let t = unit.apply(ms(9_100), sensor(SensorEvent::DepositScan { code: "BASE-RED".into() }));
        assert!(t.is_ignored());

        unit.apply(
            ms(9_200),
            UnitInput::Verdict {
                tag: EventTag::Deposit,
                verdict: Verdict::Accepted,
                flag: flag(FlagLocation::AtCenter, 2),
            },
        );
        assert_eq!(unit.possession(), Possession::NotCarrying);
        assert!(!unit.deposit_pending());
    }

    #[test]
    fn test_deposit_without_flag_is_ignored() {
        let mut unit = machine();
        let t = unit.apply(ms(100), sensor(SensorEvent::DepositScan { code: "BASE-RED".into() }));
        assert!(t.is_ignored());
        assert!(t.published().next().is_none());
    }

    #[test]
    fn test_stale_flag_update_ignored() {
        let mut unit = carrying_machine();
        unit.apply(ms(6_000), UnitInput::FlagUpdate(flag(FlagLocation::AtCenter, 0)));
        assert_eq!(unit.possession(), Possession::Carrying);
        assert_eq!(unit.cached_flag().version, 1);
    }

    #[test]
    fn test_force_drop_is_unconditional() {
        let mut unit = carrying_machine();
        unit.apply(
            ms(6_000),
            UnitInput::Command {
                command: UnitCommand::ForceDrop,
                flag: flag(FlagLocation::AtCenter, 2),
            },
        );
        assert_eq!(unit.possession(), Possession::NotCarrying);
        // A late broadcast from before the drop cannot resurrect possession.
        unit.apply(ms(6_100), UnitInput::FlagUpdate(flag(FlagLocation::HeldBy(ME), 1)));
        assert_eq!(unit.possession(), Possession::NotCarrying);
    }

    #[test]
    fn test_resync_when_removed_resets_everything() {
        let mut unit = machine();
        unit.apply(ms(0), sensor(SensorEvent::ZoneEnter));
        unit.apply(ms(2_000), UnitInput::Tick);

        unit.apply(
            ms(2_500),
            UnitInput::Resync {
                flag: flag(FlagLocation::AtCenter, 4),
                registered: false,
            },
        );
        assert_eq!(unit.capture().status, CaptureStatus::Idle);
        assert_eq!(unit.capture().dwell, Duration::ZERO);
        assert_eq!(unit.possession(), Possession::NotCarrying);
        assert_eq!(unit.cached_flag().version, 4);
    }

    #[test]
    fn test_resync_overwrites_possession() {
        let mut unit = carrying_machine();
        unit.apply(
            ms(8_000),
            UnitInput::Resync {
                flag: flag(FlagLocation::HeldBy(UnitId(3)), 1),
                registered: true,
            },
        );
        assert_eq!(unit.possession(), Possession::NotCarrying);
    }
}
