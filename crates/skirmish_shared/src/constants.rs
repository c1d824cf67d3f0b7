//! # Match & Network Constants
//!
//! Default rule values for a Skirmish match.
//!
//! **NOTE:** These are the defaults only. Every timing value can be
//! overridden from the TOML config loaded by the `skirmish` crate.

use std::time::Duration;

// =============================================================================
// MATCH RULES
// =============================================================================

/// Uninterrupted dwell in the central zone required to take the flag.
pub const CAPTURE_DURATION: Duration = Duration::from_millis(5_000);

/// Lockout applied to a unit after an infrared hit.
pub const STUN_DURATION: Duration = Duration::from_millis(2_000);

/// Deposits needed to win; also the upper bound of a team score.
pub const WINNING_SCORE: u8 = 3;

/// Number of adjudicated events the arbiter remembers per unit.
pub const REPLAY_DEPTH: usize = 16;

/// QR payload printed on the red base.
pub const RED_BASE_CODE: &str = "BASE-RED";

/// QR payload printed on the blue base.
pub const BLUE_BASE_CODE: &str = "BASE-BLUE";

// =============================================================================
// NETWORK CONFIGURATION
// =============================================================================

/// Maximum datagram size (MTU-safe over the field Wi-Fi).
pub const MAX_PACKET_SIZE: usize = 1200;

/// Default port of the relay broker.
pub const BROKER_PORT: u16 = 1883;

/// Default broker address for participants on the field network.
pub const BROKER_ADDR: &str = "192.168.1.200:1883";

/// Default bind address of the relay broker.
pub const BROKER_BIND: &str = "0.0.0.0:1883";
