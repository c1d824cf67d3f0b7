//! # Arbiter State Machine
//!
//! The single source of truth for flag location, score and phase. Every
//! unit-visible change is emitted as a [`StateDelta`] under a monotonically
//! increasing revision so that receivers can detect gaps.

mod machine;
mod replay;
mod roster;
mod snapshot;

pub use machine::ArbiterMachine;
pub use replay::{LoggedEvent, ReplayLog};
pub use roster::{Roster, UnitRecord};
pub use snapshot::{Decision, MatchSnapshot, SessionSweep, StateDelta, UnitCommand, UnitSummary};
