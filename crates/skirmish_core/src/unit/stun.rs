//! Hit lockout.

use skirmish_shared::{Timestamp, UnitId};
use std::time::Duration;

/// Stun lockout of one unit.
///
/// `until` never moves backwards while a stun is active: a re-hit extends
/// or holds the lockout, it never shortens it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StunState {
    /// Owning unit.
    pub unit: UnitId,
    /// Absolute end of the lockout, if one was ever applied.
    pub until: Option<Timestamp>,
}

impl StunState {
    /// No stun.
    #[must_use]
    pub const fn new(unit: UnitId) -> Self {
        Self { unit, until: None }
    }

    /// Returns true while locked out.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Applies a hit at `now`. Returns the resulting end of lockout.
    pub fn hit(&mut self, now: Timestamp, lockout: Duration) -> Timestamp {
        let candidate = now + lockout;
        let until = match self.until {
            Some(current) if current > candidate => current,
            _ => candidate,
        };
        self.until = Some(until);
        until
    }

    /// Clears an elapsed lockout. Returns true if it just expired.
    pub fn expire(&mut self, now: Timestamp) -> bool {
        match self.until {
            Some(until) if now >= until => {
                self.until = None;
                true
            }
            _ => false,
        }
    }

    /// Remaining lockout at `now`.
    #[must_use]
    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.until.map_or(Duration::ZERO, |until| until.saturating_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_rehit_extends() {
        let mut stun = StunState::new(UnitId(1));
        assert_eq!(stun.hit(Timestamp::from_millis(1_000), LOCKOUT), Timestamp::from_millis(3_000));
        assert_eq!(stun.hit(Timestamp::from_millis(2_500), LOCKOUT), Timestamp::from_millis(4_500));
        assert!(stun.is_active(Timestamp::from_millis(4_499)));
        assert!(!stun.is_active(Timestamp::from_millis(4_500)));
    }

    #[test]
    fn test_rehit_never_shrinks() {
        let mut stun = StunState::new(UnitId(1));
        stun.hit(Timestamp::from_millis(5_000), Duration::from_secs(10));
        // A shorter lockout cannot shorten the active one
        assert_eq!(stun.hit(Timestamp::from_millis(6_000), LOCKOUT), Timestamp::from_millis(15_000));
    }

    #[test]
    fn test_expire() {
        let mut stun = StunState::new(UnitId(1));
        stun.hit(Timestamp::ZERO, LOCKOUT);
        assert!(!stun.expire(Timestamp::from_millis(1_999)));
        assert_eq!(stun.remaining(Timestamp::from_millis(1_500)), Duration::from_millis(500));
        assert!(stun.expire(Timestamp::from_millis(2_000)));
        assert!(!stun.expire(Timestamp::from_millis(2_001)));
    }
}
