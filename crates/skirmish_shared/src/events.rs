//! Game events exchanged between units and the arbiter.
//!
//! A [`GameEvent`] is transient: it is published once and not persisted
//! beyond delivery. The arbiter keeps a short per-unit history only for
//! replay after a reconnection.

use crate::clock::Timestamp;
use crate::identity::{Team, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event discriminator (wire code).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTag {
    /// Infrared hit received.
    Hit = 0,
    /// Line sensor detected the capture zone.
    ZoneEnter = 1,
    /// Line sensor left the capture zone.
    ZoneExit = 2,
    /// Dwell reached the capture threshold.
    CaptureComplete = 3,
    /// Base deposit requested after a confirming scan.
    Deposit = 4,
    /// Session to the unit was lost.
    Disconnect = 5,
    /// Holder asks to relinquish the flag.
    FlagDrop = 6,
}

impl EventTag {
    /// Decodes a tag from its wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Hit),
            1 => Some(Self::ZoneEnter),
            2 => Some(Self::ZoneExit),
            3 => Some(Self::CaptureComplete),
            4 => Some(Self::Deposit),
            5 => Some(Self::Disconnect),
            6 => Some(Self::FlagDrop),
            _ => None,
        }
    }

    /// Whether events with this tag change authoritative state and
    /// therefore must be acknowledged by the arbiter.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Hit | Self::CaptureComplete | Self::Deposit | Self::FlagDrop)
    }
}

/// Event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Unit was hit. `shooter` is known when the IR code identified it.
    Hit {
        /// Shooting unit, if identified.
        shooter: Option<UnitId>,
    },
    /// Entered the central zone.
    ZoneEnter,
    /// Left the central zone.
    ZoneExit,
    /// Capture dwell reached the threshold; claims the flag.
    CaptureComplete,
    /// Deposit at a base, confirmed by the scanned code.
    Deposit {
        /// Team the unit claims to deposit for.
        team: Team,
        /// QR payload read at the base.
        base_code: String,
    },
    /// Participant went away.
    Disconnect,
    /// Flag holder relinquishes the flag.
    FlagDrop,
}

impl EventKind {
    /// Returns the discriminator.
    #[must_use]
    pub const fn tag(&self) -> EventTag {
        match self {
            Self::Hit { .. } => EventTag::Hit,
            Self::ZoneEnter => EventTag::ZoneEnter,
            Self::ZoneExit => EventTag::ZoneExit,
            Self::CaptureComplete => EventTag::CaptureComplete,
            Self::Deposit { .. } => EventTag::Deposit,
            Self::Disconnect => EventTag::Disconnect,
            Self::FlagDrop => EventTag::FlagDrop,
        }
    }
}

/// A game event: who, when, what.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Unit the event is about.
    pub unit: UnitId,
    /// Timestamp on the originating participant's clock.
    pub at: Timestamp,
    /// What happened.
    pub kind: EventKind,
}

impl GameEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(unit: UnitId, at: Timestamp, kind: EventKind) -> Self {
        Self { unit, at, kind }
    }

    /// Returns the discriminator.
    #[inline]
    #[must_use]
    pub const fn tag(&self) -> EventTag {
        self.kind.tag()
    }

    /// Whether this event must be acknowledged.
    #[inline]
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        self.kind.tag().is_critical()
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} from unit {} at {}", self.tag(), self.unit, self.at)
    }
}
