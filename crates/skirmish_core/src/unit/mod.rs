//! # Unit State Machine
//!
//! Runs on the vehicle. Three orthogonal parts:
//!
//! ```text
//!  Possession: NOT_CARRYING <-> CARRYING        (arbiter-confirmed only)
//!  Capture:    IDLE -> CAPTURING -> COMPLETE    (5s uninterrupted dwell)
//!                        \-> CANCELED           (hit or zone exit)
//!  Stun:       inactive <-> active              (gates capture, 2s per hit)
//! ```
//!
//! Local decisions (immediate stun on hit, capture cancel) happen here.
//! Everything that changes the flag is only *requested* and becomes true
//! when the arbiter says so.

mod capture;
mod machine;
mod stun;

pub use capture::{CaptureProgress, CaptureStatus};
pub use machine::{Effect, Possession, RumbleCue, SensorEvent, Transition, UnitInput, UnitMachine, UnitOutput};
pub use stun::StunState;
