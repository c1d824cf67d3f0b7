//! Outputs of the arbiter: deltas, commands, snapshots.

use crate::error::Verdict;
use skirmish_shared::{FlagState, GamePhase, Team, TeamScore, UnitId, UnitIdentity};

/// One authoritative change, broadcast to every participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateDelta {
    /// Flag moved (or a corrective re-broadcast of its location).
    Flag(FlagState),
    /// Score changed.
    Score(TeamScore),
    /// Phase changed.
    Phase(GamePhase),
    /// A team won.
    GameOver(Team),
    /// A unit registered.
    UnitJoined(UnitIdentity),
    /// A unit's session went up or down.
    UnitStatus {
        /// The unit.
        unit: UnitId,
        /// New liveness.
        connected: bool,
    },
    /// A unit was removed after its grace period.
    UnitLeft(UnitId),
}

/// Corrective instruction addressed to one unit.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitCommand {
    /// Relinquish the flag now.
    ForceDrop = 1,
    /// Forget all match state.
    Reset = 2,
}

impl UnitCommand {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::ForceDrop),
            2 => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Result of one arbiter operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Verdict for the requester.
    pub verdict: Verdict,
    /// Flag state after the decision, carried in the ack.
    pub flag: FlagState,
    /// Changes to broadcast, in order. Empty if nothing changed.
    pub deltas: Vec<StateDelta>,
    /// Commands to deliver.
    pub commands: Vec<(UnitId, UnitCommand)>,
    /// Broadcast revision the deltas are published under.
    pub revision: u64,
}

impl Decision {
    /// Returns true if the decision changed broadcast state.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.deltas.is_empty()
    }
}

/// Result of a liveness sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSweep {
    /// Units just declared disconnected.
    pub disconnected: Vec<UnitId>,
    /// Units removed after the grace period.
    pub removed: Vec<UnitId>,
    /// Changes to broadcast.
    pub deltas: Vec<StateDelta>,
    /// Commands to deliver.
    pub commands: Vec<(UnitId, UnitCommand)>,
    /// Broadcast revision of the deltas.
    pub revision: u64,
}

/// Per-unit line in a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitSummary {
    /// Identity.
    pub identity: UnitIdentity,
    /// Live session.
    pub connected: bool,
    /// Hits received.
    pub hits_taken: u32,
    /// Hits landed.
    pub hits_landed: u32,
    /// Battery, when reported.
    pub battery_pct: Option<u8>,
}

/// Full authoritative state, sent periodically and on resync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSnapshot {
    /// Phase.
    pub phase: GamePhase,
    /// Flag.
    pub flag: FlagState,
    /// Score.
    pub score: TeamScore,
    /// Winner once ended.
    pub winner: Option<Team>,
    /// Revision of the last delta included.
    pub revision: u64,
    /// Registered units.
    pub units: Vec<UnitSummary>,
}

impl MatchSnapshot {
    /// Returns true if `unit` is on the roster.
    #[must_use]
    pub fn is_registered(&self, unit: UnitId) -> bool {
        self.units.iter().any(|u| u.identity.id() == unit)
    }
}
