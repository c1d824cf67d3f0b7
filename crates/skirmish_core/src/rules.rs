//! Match rules shared by both machines.
//!
//! Loaded from the `[rules]` section of the TOML config; every field has a
//! default so an empty section is valid.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use skirmish_shared::constants::{BLUE_BASE_CODE, RED_BASE_CODE, REPLAY_DEPTH};
use skirmish_shared::{Team, CAPTURE_DURATION, STUN_DURATION, WINNING_SCORE};
use std::time::Duration;

/// Tunable match rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Dwell required to capture, in milliseconds.
    pub capture_ms: u64,
    /// Lockout after a hit, in milliseconds.
    pub stun_ms: u64,
    /// Deposits needed to win (1..=3).
    pub winning_score: u8,
    /// Adjudicated events kept per unit for replay.
    pub replay_depth: usize,
    /// Maximum registered units.
    pub max_units: usize,
    /// QR payload of the red base.
    pub red_base_code: String,
    /// QR payload of the blue base.
    pub blue_base_code: String,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            capture_ms: millis(CAPTURE_DURATION),
            stun_ms: millis(STUN_DURATION),
            winning_score: WINNING_SCORE,
            replay_depth: REPLAY_DEPTH,
            max_units: 8,
            red_base_code: RED_BASE_CODE.to_string(),
            blue_base_code: BLUE_BASE_CODE.to_string(),
        }
    }
}

impl Rules {
    /// Capture dwell threshold.
    #[must_use]
    pub const fn capture_duration(&self) -> Duration {
        Duration::from_millis(self.capture_ms)
    }

    /// Stun lockout length.
    #[must_use]
    pub const fn stun_duration(&self) -> Duration {
        Duration::from_millis(self.stun_ms)
    }

    /// QR payload of a team's base.
    #[must_use]
    pub fn base_code(&self, team: Team) -> &str {
        match team {
            Team::Red => &self.red_base_code,
            Team::Blue => &self.blue_base_code,
        }
    }

    /// Checks the rules are playable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.capture_ms == 0 {
            return Err(CoreError::InvalidRules("capture_ms must be positive".into()));
        }
        if self.stun_ms == 0 {
            return Err(CoreError::InvalidRules("stun_ms must be positive".into()));
        }
        if self.winning_score == 0 || self.winning_score > WINNING_SCORE {
            return Err(CoreError::InvalidRules(format!(
                "winning_score must be in 1..={WINNING_SCORE}, got {}",
                self.winning_score
            )));
        }
        if self.replay_depth == 0 {
            return Err(CoreError::InvalidRules("replay_depth must be positive".into()));
        }
        if self.red_base_code.is_empty() || self.blue_base_code.is_empty() {
            return Err(CoreError::InvalidRules("base codes must not be empty".into()));
        }
        if self.red_base_code == self.blue_base_code {
            return Err(CoreError::InvalidRules("base codes must differ".into()));
        }
        Ok(())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let rules = Rules::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.capture_duration(), Duration::from_secs(5));
        assert_eq!(rules.stun_duration(), Duration::from_secs(2));
        assert_eq!(rules.base_code(Team::Blue), "BASE-BLUE");
    }

    #[test]
    fn test_score_cap_enforced() {
        let rules = Rules {
            winning_score: 4,
            ..Rules::default()
        };
        assert!(matches!(rules.validate(), Err(CoreError::InvalidRules(_))));
    }

    #[test]
    fn test_base_codes_must_differ() {
        let rules = Rules {
            blue_base_code: RED_BASE_CODE.to_string(),
            ..Rules::default()
        };
        assert!(rules.validate().is_err());
    }
}
