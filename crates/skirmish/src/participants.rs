//! Process wrappers that let the loop drive the networking nodes.

use crate::devices::{EffectSink, SensorSource};
use crate::events::{EventSender, LoopEvent};
use crate::game_loop::Participant;
use skirmish_networking::{ArbiterServer, ConsoleClient, MatchView, Transport, UnitClient};
use skirmish_shared::{GamePhase, TeamScore, Timestamp};
use std::time::Duration;

/// A unit process: sensors in, effects out, client in between.
pub struct UnitProcess<T, S, E> {
    client: UnitClient<T>,
    sensors: S,
    effects: E,
    battery: Option<(u8, u16)>,
    telemetry_interval: Duration,
    last_telemetry: Option<Timestamp>,
}

impl<T: Transport, S: SensorSource, E: EffectSink> UnitProcess<T, S, E> {
    /// Wraps a client.
    pub fn new(client: UnitClient<T>, sensors: S, effects: E, telemetry_interval: Duration) -> Self {
        Self {
            client,
            sensors,
            effects,
            battery: None,
            telemetry_interval,
            last_telemetry: None,
        }
    }

    /// The wrapped client.
    #[must_use]
    pub const fn client(&self) -> &UnitClient<T> {
        &self.client
    }

    /// The sensor source.
    #[must_use]
    pub const fn sensors(&self) -> &S {
        &self.sensors
    }

    fn publish_telemetry(&mut self, now: Timestamp) {
        let Some((percent, millivolts)) = self.battery else {
            return;
        };
        let due = self
            .last_telemetry
            .map_or(true, |at| now.saturating_since(at) >= self.telemetry_interval);
        if due {
            self.client.publish_telemetry(now, percent, millivolts);
            self.last_telemetry = Some(now);
        }
    }
}

impl<T: Transport, S: SensorSource, E: EffectSink> Participant for UnitProcess<T, S, E> {
    fn name(&self) -> &'static str {
        "unit"
    }

    fn poll_sources(&mut self, now: Timestamp, out: &EventSender) {
        self.sensors.poll(now, out);
    }

    fn handle(&mut self, now: Timestamp, event: LoopEvent) {
        match event {
            LoopEvent::Sensor(sensor) => self.client.sensor(now, sensor),
            LoopEvent::Battery { percent, millivolts } => self.battery = Some((percent, millivolts)),
            other => tracing::debug!(event = ?other, "not a unit input"),
        }
    }

    fn tick(&mut self, now: Timestamp) -> usize {
        let processed = self.client.tick(now);
        for effect in self.client.take_effects() {
            self.effects.apply(now, &effect);
        }
        self.publish_telemetry(now);
        processed
    }

    fn shutdown(&mut self, now: Timestamp) {
        self.client.disconnect(now);
        let stats = self.client.stats();
        tracing::info!(
            unit = %self.client.identity(),
            sent = stats.sent,
            received = stats.received,
            retransmits = stats.retransmits,
            duplicates = stats.duplicates,
            "unit stopped"
        );
    }
}

/// The arbiter process; also takes operator controls from the queue.
pub struct ArbiterProcess<T> {
    server: ArbiterServer<T>,
}

impl<T: Transport> ArbiterProcess<T> {
    /// Wraps a server.
    pub const fn new(server: ArbiterServer<T>) -> Self {
        Self { server }
    }

    /// The wrapped server.
    #[must_use]
    pub const fn server(&self) -> &ArbiterServer<T> {
        &self.server
    }
}

impl<T: Transport> Participant for ArbiterProcess<T> {
    fn name(&self) -> &'static str {
        "arbiter"
    }

    fn handle(&mut self, _now: Timestamp, event: LoopEvent) {
        match event {
            LoopEvent::StartMatch { force } => {
                let verdict = self.server.start_match(force);
                tracing::info!(force, ?verdict, "operator start");
            }
            LoopEvent::ResetMatch => {
                tracing::info!("operator reset");
                self.server.reset_match();
            }
            other => tracing::debug!(event = ?other, "not an arbiter input"),
        }
    }

    fn tick(&mut self, now: Timestamp) -> usize {
        self.server.tick(now)
    }

    fn shutdown(&mut self, _now: Timestamp) {
        let machine = self.server.machine();
        tracing::info!(
            phase = ?machine.phase(),
            score = %machine.score(),
            revision = machine.revision(),
            "arbiter stopped"
        );
    }
}

/// The console process. Logs what changed in the view after each tick.
pub struct ConsoleProcess<T> {
    client: ConsoleClient<T>,
    shown: Option<(GamePhase, TeamScore, bool)>,
}

impl<T: Transport> ConsoleProcess<T> {
    /// Wraps a console client.
    pub const fn new(client: ConsoleClient<T>) -> Self {
        Self { client, shown: None }
    }

    /// Current view.
    #[must_use]
    pub const fn view(&self) -> &MatchView {
        self.client.view()
    }
}

impl<T: Transport> Participant for ConsoleProcess<T> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn handle(&mut self, _now: Timestamp, event: LoopEvent) {
        tracing::debug!(event = ?event, "not a console input");
    }

    fn tick(&mut self, now: Timestamp) -> usize {
        let processed = self.client.tick(now);
        let view = self.client.view();
        let current = (view.phase, view.score, view.stale);
        if self.shown != Some(current) {
            tracing::info!(
                phase = ?view.phase,
                score = %view.score,
                flag = %view.flag,
                units = view.units.len(),
                stale = view.stale,
                "match view"
            );
            self.shown = Some(current);
        }
        processed
    }
}
