//! # Skirmish Core
//!
//! The two state machines that keep a match consistent:
//!
//! - **Unit State Machine** ([`UnitMachine`]): runs on the vehicle. Owns
//!   capture-zone timing, hit/stun lockout and the local possession bit.
//! - **Arbiter State Machine** ([`ArbiterMachine`]): runs on the match
//!   server. Owns the canonical flag location, team scores and game phase,
//!   and resolves conflicting unit reports by arrival order.
//!
//! ## Architecture Rules
//!
//! 1. **Single-threaded consumers** - each machine is driven from one
//!    ordered event queue, so no locking is needed inside.
//! 2. **Injected time** - every operation takes `now`; dwell and stun are
//!    recomputed from stored absolute timestamps.
//! 3. **Never fatal** - an impossible input is reported as
//!    [`IllegalTransition`] and dropped.
//!
//! ## Example
//!
//! ```rust
//! use skirmish_core::{Rules, UnitInput, UnitMachine, SensorEvent};
//! use skirmish_shared::{Team, Timestamp, UnitId, UnitIdentity};
//!
//! let mut unit = UnitMachine::new(UnitIdentity::new(UnitId(1), Team::Red), &Rules::default());
//! unit.apply(Timestamp::ZERO, UnitInput::Sensor(SensorEvent::ZoneEnter));
//! let out = unit.apply(Timestamp::from_millis(5_010), UnitInput::Tick);
//! assert!(out.published().next().is_some()); // CAPTURE_COMPLETE
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arbiter;
pub mod error;
pub mod rules;
pub mod unit;

pub use arbiter::{
    ArbiterMachine, Decision, LoggedEvent, MatchSnapshot, ReplayLog, Roster, SessionSweep,
    StateDelta, UnitCommand, UnitRecord, UnitSummary,
};
pub use error::{CoreError, CoreResult, IllegalTransition, RejectReason, Verdict};
pub use rules::Rules;
pub use unit::{
    CaptureProgress, CaptureStatus, Effect, Possession, RumbleCue, SensorEvent, StunState,
    Transition, UnitInput, UnitMachine, UnitOutput,
};
