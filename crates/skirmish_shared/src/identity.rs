//! Participant identities and teams.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable identifier of a participant on the bus.
///
/// Units use ids starting at 1. The arbiter always speaks as [`UnitId::ARBITER`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl UnitId {
    /// Reserved sender id of the arbiter.
    pub const ARBITER: Self = Self(0);

    /// Returns true if this is the arbiter's id.
    #[inline]
    #[must_use]
    pub const fn is_arbiter(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team color.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// Red team.
    Red = 0,
    /// Blue team.
    Blue = 1,
}

impl Team {
    /// Both teams, in wire order.
    pub const ALL: [Self; 2] = [Self::Red, Self::Blue];

    /// Returns the wire code of this team.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a team from its wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Red),
            1 => Some(Self::Blue),
            _ => None,
        }
    }

    /// Returns the other team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a team name is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown team: {0}")]
pub struct ParseTeamError(pub String);

impl FromStr for Team {
    type Err = ParseTeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Self::Red),
            "blue" => Ok(Self::Blue),
            _ => Err(ParseTeamError(s.to_string())),
        }
    }
}

/// A unit's identity: id plus team. Immutable once assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitIdentity {
    id: UnitId,
    team: Team,
}

impl UnitIdentity {
    /// Creates an identity.
    #[must_use]
    pub const fn new(id: UnitId, team: Team) -> Self {
        Self { id, team }
    }

    /// Unit id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Team the unit plays for.
    #[inline]
    #[must_use]
    pub const fn team(&self) -> Team {
        self.team
    }
}

impl fmt::Display for UnitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {} ({})", self.id, self.team)
    }
}
