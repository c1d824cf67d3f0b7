//! Capture-zone progress.
//!
//! Dwell is recomputed from the absolute entry timestamp on every update,
//! never accumulated tick by tick, so irregular polling cannot drift it.

use skirmish_shared::{Timestamp, UnitId};
use std::time::Duration;

/// Capture sub-state.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CaptureStatus {
    /// Not capturing.
    #[default]
    Idle = 0,
    /// Dwelling in the zone.
    Capturing = 1,
    /// Interrupted by a hit or a zone exit.
    Canceled = 2,
    /// Threshold reached; claim sent to the arbiter.
    Complete = 3,
}

impl CaptureStatus {
    /// Decodes a status from its wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Capturing),
            2 => Some(Self::Canceled),
            3 => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Capture progress of one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureProgress {
    /// Owning unit.
    pub unit: UnitId,
    /// Current status.
    pub status: CaptureStatus,
    /// When the current attempt started (only while capturing or complete).
    pub entered_at: Option<Timestamp>,
    /// Dwell accrued by the current attempt.
    pub dwell: Duration,
}

impl CaptureProgress {
    /// Idle progress for `unit`.
    #[must_use]
    pub const fn new(unit: UnitId) -> Self {
        Self {
            unit,
            status: CaptureStatus::Idle,
            entered_at: None,
            dwell: Duration::ZERO,
        }
    }

    /// Starts an attempt at `now`.
    pub fn start(&mut self, now: Timestamp) {
        self.status = CaptureStatus::Capturing;
        self.entered_at = Some(now);
        self.dwell = Duration::ZERO;
    }

    /// Recomputes dwell from the entry timestamp. Only accrues while capturing.
    pub fn accrue(&mut self, now: Timestamp) -> Duration {
        if let (CaptureStatus::Capturing, Some(entered)) = (self.status, self.entered_at) {
            self.dwell = now.saturating_since(entered);
        }
        self.dwell
    }

    /// Cancels the attempt and zeroes the dwell.
    pub fn cancel(&mut self) {
        self.status = CaptureStatus::Canceled;
        self.entered_at = None;
        self.dwell = Duration::ZERO;
    }

    /// Marks the threshold reached.
    pub fn complete(&mut self) {
        self.status = CaptureStatus::Complete;
    }

    /// Back to idle.
    pub fn reset(&mut self) {
        *self = Self::new(self.unit);
    }

    /// Returns true while dwelling.
    #[inline]
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        matches!(self.status, CaptureStatus::Capturing)
    }
}
