//! Registered units and their session bookkeeping.

use crate::error::RejectReason;
use skirmish_shared::{Team, Timestamp, UnitId, UnitIdentity};
use std::collections::BTreeMap;
use std::time::Duration;

/// What the arbiter knows about one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitRecord {
    /// Registered identity.
    pub identity: UnitIdentity,
    /// Whether the session is considered live.
    pub connected: bool,
    /// Last time anything was heard from the unit.
    pub last_seen: Timestamp,
    /// When the session was declared lost.
    pub disconnected_since: Option<Timestamp>,
    /// Hits this unit received.
    pub hits_taken: u32,
    /// Hits attributed to this unit as shooter.
    pub hits_landed: u32,
    /// Last reported battery level.
    pub battery_pct: Option<u8>,
}

impl UnitRecord {
    fn new(identity: UnitIdentity, now: Timestamp) -> Self {
        Self {
            identity,
            connected: true,
            last_seen: now,
            disconnected_since: None,
            hits_taken: 0,
            hits_landed: 0,
            battery_pct: None,
        }
    }

    /// Time since the unit was last heard from.
    #[must_use]
    pub fn silence(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.last_seen)
    }
}

/// Registered units, ordered by id.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    units: BTreeMap<UnitId, UnitRecord>,
    capacity: usize,
}

impl Roster {
    /// Creates an empty roster admitting at most `capacity` units.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            units: BTreeMap::new(),
            capacity,
        }
    }

    /// Admits a unit. Returns `Ok(true)` if it was not yet registered.
    ///
    /// Re-joining with the same team refreshes the session; a different
    /// team is refused.
    pub fn admit(&mut self, now: Timestamp, identity: UnitIdentity) -> Result<bool, RejectReason> {
        if let Some(record) = self.units.get_mut(&identity.id()) {
            if record.identity.team() != identity.team() {
                return Err(RejectReason::AlreadyRegistered);
            }
            record.connected = true;
            record.last_seen = now;
            record.disconnected_since = None;
            return Ok(false);
        }
        if self.units.len() >= self.capacity {
            return Err(RejectReason::MatchFull);
        }
        self.units.insert(identity.id(), UnitRecord::new(identity, now));
        Ok(true)
    }

    /// Removes a unit.
    pub fn remove(&mut self, unit: UnitId) -> Option<UnitRecord> {
        self.units.remove(&unit)
    }

    /// Records liveness. Returns true if the unit was disconnected.
    pub fn touch(&mut self, now: Timestamp, unit: UnitId) -> bool {
        let Some(record) = self.units.get_mut(&unit) else {
            return false;
        };
        record.last_seen = record.last_seen.max(now);
        let revived = !record.connected;
        record.connected = true;
        record.disconnected_since = None;
        revived
    }

    /// Declares a unit's session lost. Returns true if it was connected.
    pub fn mark_disconnected(&mut self, now: Timestamp, unit: UnitId) -> bool {
        match self.units.get_mut(&unit) {
            Some(record) if record.connected => {
                record.connected = false;
                record.disconnected_since = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Looks up a unit.
    #[must_use]
    pub fn get(&self, unit: UnitId) -> Option<&UnitRecord> {
        self.units.get(&unit)
    }

    /// Looks up a unit mutably.
    pub fn get_mut(&mut self, unit: UnitId) -> Option<&mut UnitRecord> {
        self.units.get_mut(&unit)
    }

    /// Returns true if the unit is registered.
    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        self.units.contains_key(&unit)
    }

    /// Number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if nobody joined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterates records by id.
    pub fn iter(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    /// Ids of all registered units.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitId> {
        self.units.keys().copied().collect()
    }

    /// Units registered for `team`.
    #[must_use]
    pub fn team_size(&self, team: Team) -> usize {
        self.units.values().filter(|r| r.identity.team() == team).count()
    }

    /// Returns true if both teams have at least one unit.
    #[must_use]
    pub fn has_both_teams(&self) -> bool {
        Team::ALL.into_iter().all(|team| self.team_size(team) > 0)
    }

    /// Zeroes per-match statistics.
    pub fn clear_stats(&mut self) {
        for record in self.units.values_mut() {
            record.hits_taken = 0;
            record.hits_landed = 0;
        }
    }
}
