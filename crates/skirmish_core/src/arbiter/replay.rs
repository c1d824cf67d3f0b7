//! Bounded per-unit history of adjudicated events.
//!
//! Used to answer a reconnecting unit's sync request with the verdicts it
//! may have missed, and to re-answer a critical event that slipped past
//! transport dedup with its original verdict.

use crate::error::Verdict;
use skirmish_shared::{FlagState, GameEvent, UnitId};
use std::collections::{BTreeMap, VecDeque};

/// One adjudicated event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedEvent {
    /// Sender sequence number.
    pub sequence: u32,
    /// The event.
    pub event: GameEvent,
    /// What was decided.
    pub verdict: Verdict,
    /// Flag state right after the decision.
    pub flag: FlagState,
}

/// Last `depth` adjudicated events per unit.
#[derive(Clone, Debug)]
pub struct ReplayLog {
    depth: usize,
    entries: BTreeMap<UnitId, VecDeque<LoggedEvent>>,
}

impl ReplayLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            entries: BTreeMap::new(),
        }
    }

    /// Appends an entry, evicting the oldest past `depth`.
    pub fn record(&mut self, origin: UnitId, entry: LoggedEvent) {
        let history = self.entries.entry(origin).or_default();
        if history.len() == self.depth {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// Finds the entry for `(origin, sequence)`.
    #[must_use]
    pub fn lookup(&self, origin: UnitId, sequence: u32) -> Option<&LoggedEvent> {
        self.entries.get(&origin)?.iter().rev().find(|e| e.sequence == sequence)
    }

    /// History for `origin`, oldest first.
    #[must_use]
    pub fn history(&self, origin: UnitId) -> Vec<LoggedEvent> {
        self.entries
            .get(&origin)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops a unit's history.
    pub fn forget(&mut self, origin: UnitId) {
        self.entries.remove(&origin);
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
