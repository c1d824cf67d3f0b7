//! # Skirmish
//!
//! Process-level integration for a capture-the-flag match between
//! remote-controlled vehicles.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐        ┌──────────────────┐        ┌───────────────┐
//! │  skirmish_    │  UDP   │ skirmish_broker  │  UDP   │  skirmish_    │
//! │  unit  (xN)   │<──────>│  (topic relay)   │<──────>│  arbiter      │
//! │               │        └────────┬─────────┘        │               │
//! │ sensors ──┐   │                 │                  │ single        │
//! │ effects <─┤   │                 v                  │ decision      │
//! │ UnitClient│   │          ConsoleClient             │ point         │
//! └───────────────┘                                    └───────────────┘
//! ```
//!
//! Each process drives one node from one ordered [`events::EventQueue`]
//! through a [`game_loop::LoopDriver`]. Hardware stays behind
//! [`devices::SensorSource`] and [`devices::EffectSink`].
//!
//! ## Modules
//!
//! - `config`: TOML configuration
//! - `events`: per-process event queue
//! - `game_loop`: loop driver and the [`game_loop::Participant`] seam
//! - `participants`: unit, arbiter and console processes
//! - `devices`: sensor and effect seams
//! - `sim`: whole match in one process
//! - `logging`: subscriber setup for the binaries

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod devices;
pub mod events;
pub mod game_loop;
pub mod logging;
pub mod participants;
pub mod sim;

// Re-export the libraries
pub use skirmish_core as core;
pub use skirmish_networking as networking;
pub use skirmish_shared as shared;

// Re-export commonly used types
pub use config::{ConfigError, NetworkConfig, RuntimeConfig, SkirmishConfig};
pub use devices::{EffectSink, LoggingEffects, RecordedEffects, ScriptedSensors, SensorSource};
pub use events::{EventQueue, EventReceiver, EventSender, LoopEvent};
pub use game_loop::{LoopDriver, LoopStats, Participant};
pub use participants::{ArbiterProcess, ConsoleProcess, UnitProcess};
pub use sim::{MatchScenario, MatchSim, SimReport};
