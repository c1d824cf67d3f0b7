//! # Skirmish Shared
//!
//! Common types used by the unit, the console and the arbiter.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - sockets or async runtimes
//! - hardware drivers
//! - anything that reads the wall clock directly (use [`Clock`])
//!
//! If you need I/O, put it in `skirmish_networking` or `skirmish`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod constants;
pub mod events;
pub mod identity;
pub mod match_state;
pub mod topics;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use constants::{CAPTURE_DURATION, STUN_DURATION, WINNING_SCORE, MAX_PACKET_SIZE};
pub use events::{EventKind, EventTag, GameEvent};
pub use identity::{ParseTeamError, Team, UnitId, UnitIdentity};
pub use match_state::{FlagLocation, FlagState, GamePhase, TeamScore};
pub use topics::{Topic, TopicError};
