//! Authoritative match state: flag, scores, phase.
//!
//! The arbiter is the only writer of these values. Units and consoles keep
//! cached copies and compare [`FlagState::version`] to discard stale updates.

use crate::constants::WINNING_SCORE;
use crate::identity::{Team, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the flag is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagLocation {
    /// Waiting in the central zone.
    AtCenter,
    /// Carried by a unit.
    HeldBy(UnitId),
    /// Resting at a team's base (after the deciding deposit).
    AtBase(Team),
}

/// Flag location plus a version counter bumped on every authoritative change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagState {
    /// Current location.
    pub location: FlagLocation,
    /// Monotonic version.
    pub version: u64,
}

impl FlagState {
    /// Flag at the center, version 0.
    pub const INITIAL: Self = Self {
        location: FlagLocation::AtCenter,
        version: 0,
    };

    /// Returns the holder, if any.
    #[must_use]
    pub const fn holder(&self) -> Option<UnitId> {
        match self.location {
            FlagLocation::HeldBy(unit) => Some(unit),
            _ => None,
        }
    }

    /// Returns true if `unit` holds the flag.
    #[must_use]
    pub fn is_held_by(&self, unit: UnitId) -> bool {
        self.holder() == Some(unit)
    }

    /// Returns true if the flag can be claimed.
    #[must_use]
    pub const fn is_at_center(&self) -> bool {
        matches!(self.location, FlagLocation::AtCenter)
    }

    /// Moves the flag and bumps the version.
    pub fn relocate(&mut self, location: FlagLocation) {
        self.location = location;
        self.version += 1;
    }
}

impl Default for FlagState {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for FlagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            FlagLocation::AtCenter => write!(f, "at center (v{})", self.version),
            FlagLocation::HeldBy(unit) => write!(f, "held by unit {} (v{})", unit, self.version),
            FlagLocation::AtBase(team) => write!(f, "at {} base (v{})", team, self.version),
        }
    }
}

/// Deposited flags per team, each in `[0, WINNING_SCORE]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamScore {
    red: u8,
    blue: u8,
}

impl TeamScore {
    /// Creates a score, clamping each side to the legal range.
    #[must_use]
    pub fn new(red: u8, blue: u8) -> Self {
        Self {
            red: red.min(WINNING_SCORE),
            blue: blue.min(WINNING_SCORE),
        }
    }

    /// Returns a team's count.
    #[must_use]
    pub const fn get(&self, team: Team) -> u8 {
        match team {
            Team::Red => self.red,
            Team::Blue => self.blue,
        }
    }

    /// Adds one deposit, saturating at `WINNING_SCORE`. Returns the new count.
    pub fn increment(&mut self, team: Team) -> u8 {
        let slot = match team {
            Team::Red => &mut self.red,
            Team::Blue => &mut self.blue,
        };
        *slot = slot.saturating_add(1).min(WINNING_SCORE);
        *slot
    }

    /// Returns the first team that reached `target`, if any.
    #[must_use]
    pub fn leader_at(&self, target: u8) -> Option<Team> {
        Team::ALL.into_iter().find(|team| self.get(*team) >= target)
    }
}

impl fmt::Display for TeamScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "red {} - {} blue", self.red, self.blue)
    }
}

/// Overall game phase. Only `Active` accepts gameplay events.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    /// Waiting for units to join.
    #[default]
    Lobby = 0,
    /// Match running.
    Active = 1,
    /// A team reached the winning score.
    Ended = 2,
}

impl GamePhase {
    /// Decodes a phase from its wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Lobby),
            1 => Some(Self::Active),
            2 => Some(Self::Ended),
            _ => None,
        }
    }
}
