//! # Device Seams
//!
//! The unit loop never talks to hardware directly. Sensors push
//! [`LoopEvent`]s through a [`SensorSource`]; presentation and haptics
//! receive fire-and-forget [`Effect`]s through an [`EffectSink`].
//!
//! Two implementations of each ship here: scripted sensors plus a logging
//! sink for running without hardware, and a recording sink for tests.

use crate::events::{EventSender, LoopEvent};
use parking_lot::Mutex;
use serde::Deserialize;
use skirmish_core::{Effect, SensorEvent};
use skirmish_shared::{Timestamp, UnitId};
use std::sync::Arc;

/// Something that produces sensor events.
pub trait SensorSource: Send {
    /// Pushes every reading due at `now` into `out`.
    fn poll(&mut self, now: Timestamp, out: &EventSender);

    /// Whether the source will never produce anything again.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Something that renders unit effects (LEDs, buzzer, rumble).
pub trait EffectSink: Send {
    /// Applies one effect. Must not block.
    fn apply(&mut self, now: Timestamp, effect: &Effect);
}

/// One input in a sensor script.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum ScriptedInput {
    /// Line sensor sees the zone.
    ZoneEnter,
    /// Line sensor lost the zone.
    ZoneExit,
    /// Infrared hit.
    Hit {
        /// Shooter id, if the IR code carried one.
        #[serde(default)]
        shooter: Option<u32>,
    },
    /// QR code decoded at a base.
    Deposit {
        /// Decoded payload.
        code: String,
    },
    /// Battery reading.
    Battery {
        /// Charge, 0..=100.
        percent: u8,
        /// Voltage in millivolts.
        millivolts: u16,
    },
}

impl ScriptedInput {
    fn into_event(self) -> LoopEvent {
        match self {
            Self::ZoneEnter => LoopEvent::Sensor(SensorEvent::ZoneEnter),
            Self::ZoneExit => LoopEvent::Sensor(SensorEvent::ZoneExit),
            Self::Hit { shooter } => LoopEvent::Sensor(SensorEvent::Hit {
                shooter: shooter.map(UnitId),
            }),
            Self::Deposit { code } => LoopEvent::Sensor(SensorEvent::DepositScan { code }),
            Self::Battery { percent, millivolts } => LoopEvent::Battery { percent, millivolts },
        }
    }
}

/// A scripted input at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ScriptStep {
    /// Milliseconds since the loop started.
    pub at_ms: u64,
    /// What happens.
    #[serde(flatten)]
    pub input: ScriptedInput,
}

#[derive(Deserialize)]
struct ScriptFile {
    #[serde(default)]
    step: Vec<ScriptStep>,
}

/// Replays a fixed timeline of sensor inputs.
///
/// Script files are TOML:
///
/// ```toml
/// [[step]]
/// at_ms = 1000
/// sensor = "zone_enter"
///
/// [[step]]
/// at_ms = 7000
/// sensor = "deposit"
/// code = "BASE-RED"
/// ```
#[derive(Clone, Debug, Default)]
pub struct ScriptedSensors {
    steps: Vec<ScriptStep>,
    next: usize,
}

impl ScriptedSensors {
    /// Creates a source from steps in any order.
    #[must_use]
    pub fn new(mut steps: Vec<ScriptStep>) -> Self {
        steps.sort_by_key(|s| s.at_ms);
        Self { steps, next: 0 }
    }

    /// Parses a TOML script.
    ///
    /// # Errors
    ///
    /// Fails if the text is not a valid script.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let file: ScriptFile = toml::from_str(text)?;
        Ok(Self::new(file.step))
    }

    /// Steps not yet emitted.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.len() - self.next
    }
}

impl SensorSource for ScriptedSensors {
    fn poll(&mut self, now: Timestamp, out: &EventSender) {
        while let Some(step) = self.steps.get(self.next) {
            if step.at_ms > now.as_millis() {
                break;
            }
            tracing::debug!(at = step.at_ms, input = ?step.input, "scripted input");
            out.send(step.input.clone().into_event());
            self.next += 1;
        }
    }

    fn is_exhausted(&self) -> bool {
        self.next >= self.steps.len()
    }
}

/// Logs effects; stands in for LEDs and buzzers when none are attached.
#[derive(Clone, Copy, Debug)]
pub struct LoggingEffects {
    unit: UnitId,
}

impl LoggingEffects {
    /// Creates a sink that tags lines with `unit`.
    #[must_use]
    pub const fn new(unit: UnitId) -> Self {
        Self { unit }
    }
}

impl EffectSink for LoggingEffects {
    fn apply(&mut self, now: Timestamp, effect: &Effect) {
        match effect {
            Effect::StunStarted { until } => {
                tracing::info!(unit = %self.unit, %now, %until, "stun indicator on");
            }
            Effect::StunCleared => tracing::info!(unit = %self.unit, %now, "stun indicator off"),
            Effect::CaptureFeedback(status) => {
                tracing::info!(unit = %self.unit, %now, ?status, "capture feedback");
            }
            Effect::FlagIndicator { carrying } => {
                tracing::info!(unit = %self.unit, %now, carrying, "flag indicator");
            }
            Effect::Rumble(cue) => tracing::debug!(unit = %self.unit, ?cue, "rumble"),
        }
    }
}

/// Keeps every effect; clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct RecordedEffects {
    log: Arc<Mutex<Vec<(Timestamp, Effect)>>>,
}

impl RecordedEffects {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Timestamp, Effect)> {
        self.log.lock().clone()
    }

    /// Whether `effect` was ever recorded.
    #[must_use]
    pub fn contains(&self, effect: &Effect) -> bool {
        self.log.lock().iter().any(|(_, e)| e == effect)
    }
}

impl EffectSink for RecordedEffects {
    fn apply(&mut self, now: Timestamp, effect: &Effect) {
        self.log.lock().push((now, *effect));
    }
}
