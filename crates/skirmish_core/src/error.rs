//! # Core Error Types
//!
//! Errors and verdicts produced by the state machines.
//!
//! None of these are fatal. An [`IllegalTransition`] is a logged no-op, and
//! a [`RejectReason`] travels back to the unit inside an ack.

use thiserror::Error;

/// A locally detected impossible state change. The machine is unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition: {input} while {state}")]
pub struct IllegalTransition {
    /// Summary of the machine state when the input arrived.
    pub state: String,
    /// The input that could not be applied.
    pub input: &'static str,
}

/// Why the arbiter refused an event. Each reason has a stable wire code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Gameplay event outside the ACTIVE phase (lobby).
    #[error("match is not active")]
    NotActive,

    /// Gameplay event after the match ended.
    #[error("match is over")]
    GameOver,

    /// Capture claim while the flag is not at the center (lost the race).
    #[error("flag is not at the center")]
    FlagNotAtCenter,

    /// Drop or deposit by a unit that does not hold the flag.
    #[error("unit does not hold the flag")]
    NotFlagHolder,

    /// Deposit for a team other than the unit's own.
    #[error("deposit for the wrong team")]
    WrongTeam,

    /// Scanned code does not match the team's base.
    #[error("scanned code does not match the team base")]
    WrongBase,

    /// Event from a unit that never joined (or was removed).
    #[error("unit is not registered")]
    UnknownUnit,

    /// Event about a different unit than its sender.
    #[error("event unit does not match its sender")]
    IdentityMismatch,

    /// Join with an id already registered to another team.
    #[error("unit id already registered to another team")]
    AlreadyRegistered,

    /// Roster is full.
    #[error("match is full")]
    MatchFull,

    /// Start requested without at least one unit per team.
    #[error("both teams need at least one unit")]
    TeamsIncomplete,
}

impl RejectReason {
    /// Every reason, in code order.
    pub const ALL: [Self; 11] = [
        Self::NotActive,
        Self::GameOver,
        Self::FlagNotAtCenter,
        Self::NotFlagHolder,
        Self::WrongTeam,
        Self::WrongBase,
        Self::UnknownUnit,
        Self::IdentityMismatch,
        Self::AlreadyRegistered,
        Self::MatchFull,
        Self::TeamsIncomplete,
    ];

    /// Stable wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::NotActive => 1,
            Self::GameOver => 2,
            Self::FlagNotAtCenter => 3,
            Self::NotFlagHolder => 4,
            Self::WrongTeam => 5,
            Self::WrongBase => 6,
            Self::UnknownUnit => 7,
            Self::IdentityMismatch => 8,
            Self::AlreadyRegistered => 9,
            Self::MatchFull => 10,
            Self::TeamsIncomplete => 11,
        }
    }

    /// Decodes a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }
}

/// Outcome of an adjudicated event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Event applied (or idempotently re-applied).
    Accepted,
    /// Event refused; state unchanged.
    Rejected(RejectReason),
}

impl Verdict {
    /// Returns true if accepted.
    #[inline]
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Errors raised while building the machines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Rule configuration is unusable.
    #[error("invalid rules: {0}")]
    InvalidRules(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_roundtrip() {
        for reason in RejectReason::ALL {
            assert_eq!(RejectReason::from_code(reason.code()), Some(reason));
        }
        assert_eq!(RejectReason::from_code(0), None);
    }

    #[test]
    fn test_game_over_message() {
        assert_eq!(RejectReason::GameOver.to_string(), "match is over");
    }
}
