//! # Match Simulation
//!
//! A whole match in one process: arbiter, units and a console, each with
//! its own [`LoopDriver`], sharing a [`ManualClock`] and an in-process bus.
//! Every link goes through a seeded [`LossyLink`], so a run is reproducible
//! from its seed.

use crate::config::SkirmishConfig;
use crate::devices::{RecordedEffects, ScriptStep, ScriptedInput, ScriptedSensors, SensorSource};
use crate::game_loop::LoopDriver;
use crate::participants::{ArbiterProcess, ConsoleProcess, UnitProcess};
use skirmish_core::Rules;
use skirmish_networking::{
    ArbiterServer, ConsoleClient, LinkSwitch, LocalBus, LocalLink, LossyLink, MatchView, NetResult,
    NodeStats, UnitClient,
};
use skirmish_shared::{Clock, FlagState, GamePhase, ManualClock, Team, TeamScore, Timestamp, UnitId, UnitIdentity};
use std::time::Duration;

/// Link type used by every simulated node.
pub type SimLink = LossyLink<LocalLink>;

/// A unit and its sensor timeline.
#[derive(Clone, Debug)]
pub struct ScriptedUnit {
    /// Who.
    pub identity: UnitIdentity,
    /// What its sensors will report.
    pub steps: Vec<ScriptStep>,
}

/// Units, their scripts and how long to run.
#[derive(Clone, Debug)]
pub struct MatchScenario {
    /// Participating units.
    pub units: Vec<ScriptedUnit>,
    /// Simulated duration.
    pub duration: Duration,
}

fn at(at_ms: u64, input: ScriptedInput) -> ScriptStep {
    ScriptStep { at_ms, input }
}

impl MatchScenario {
    /// Red scores three times; Blue steals the flag once and loses it to a
    /// hit.
    #[must_use]
    pub fn standard(rules: &Rules) -> Self {
        let red = UnitIdentity::new(UnitId(1), Team::Red);
        let blue = UnitIdentity::new(UnitId(2), Team::Blue);
        let red_base = rules.base_code(Team::Red).to_string();
        let capture = rules.capture_ms;
        let stun = rules.stun_ms;
        let deposit = || ScriptedInput::Deposit { code: red_base.clone() };

        let mut red_steps = vec![at(
            500,
            ScriptedInput::Battery {
                percent: 96,
                millivolts: 8_200,
            },
        )];
        let mut blue_steps = vec![at(
            500,
            ScriptedInput::Battery {
                percent: 88,
                millivolts: 7_900,
            },
        )];

        // Round 1: uncontested.
        let mut t = 1_000;
        red_steps.push(at(t, ScriptedInput::ZoneEnter));
        t += capture + 1_000;
        red_steps.push(at(t, ScriptedInput::ZoneExit));
        t += 1_000;
        red_steps.push(at(t, deposit()));

        // Blue is shot mid-capture, retries, then loses the flag to a hit.
        t += 1_000;
        blue_steps.push(at(t, ScriptedInput::ZoneEnter));
        t += capture / 2;
        blue_steps.push(at(t, ScriptedInput::Hit { shooter: Some(1) }));
        t += 500;
        blue_steps.push(at(t, ScriptedInput::ZoneExit));
        t += stun + 500;
        blue_steps.push(at(t, ScriptedInput::ZoneEnter));
        t += capture + 1_000;
        blue_steps.push(at(t, ScriptedInput::Hit { shooter: Some(1) }));
        t += 500;
        blue_steps.push(at(t, ScriptedInput::ZoneExit));

        // Rounds 2 and 3.
        for _ in 0..2 {
            t += 1_000;
            red_steps.push(at(t, ScriptedInput::ZoneEnter));
            t += capture + 1_000;
            red_steps.push(at(t, ScriptedInput::ZoneExit));
            t += 1_000;
            red_steps.push(at(t, deposit()));
        }

        Self {
            units: vec![
                ScriptedUnit {
                    identity: red,
                    steps: red_steps,
                },
                ScriptedUnit {
                    identity: blue,
                    steps: blue_steps,
                },
            ],
            duration: Duration::from_millis(t + 4_000),
        }
    }
}

/// Outcome of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimReport {
    /// Simulated time elapsed.
    pub elapsed: Timestamp,
    /// Final phase at the arbiter.
    pub phase: GamePhase,
    /// Final score at the arbiter.
    pub score: TeamScore,
    /// Winner, if any.
    pub winner: Option<Team>,
    /// Final flag at the arbiter.
    pub flag: FlagState,
    /// Whether the console and every unit agree with the arbiter.
    pub consistent: bool,
    /// Arbiter counters.
    pub arbiter: NodeStats,
    /// Unit counters.
    pub units: Vec<(UnitId, NodeStats)>,
}

struct SimUnitSlot {
    driver: LoopDriver<ManualClock>,
    process: UnitProcess<SimLink, ScriptedSensors, RecordedEffects>,
    effects: RecordedEffects,
    switch: LinkSwitch,
}

/// The simulated match.
pub struct MatchSim {
    clock: ManualClock,
    step: Duration,
    duration: Duration,
    arbiter_driver: LoopDriver<ManualClock>,
    arbiter: ArbiterProcess<SimLink>,
    console_driver: LoopDriver<ManualClock>,
    console: ConsoleProcess<SimLink>,
    units: Vec<SimUnitSlot>,
}

impl MatchSim {
    /// Builds every node on a fresh bus. Link `i` is seeded with `seed + i`.
    ///
    /// # Errors
    ///
    /// Fails if a node cannot subscribe.
    pub fn new(config: &SkirmishConfig, scenario: MatchScenario, seed: u64) -> NetResult<Self> {
        let clock = ManualClock::new();
        let bus = LocalBus::new();
        let conditions = config.simulation;
        let mut next_seed = seed;
        let mut link = || {
            let local = bus.connect();
            let switch = local.switch();
            next_seed = next_seed.wrapping_add(1);
            (LossyLink::new(local, conditions, next_seed), switch)
        };

        let (arbiter_link, _) = link();
        let server = ArbiterServer::new(
            arbiter_link,
            config.rules.clone(),
            &config.reliability,
            config.session.clone(),
            true,
        )?;

        let mut units = Vec::with_capacity(scenario.units.len());
        for unit in scenario.units {
            let (unit_link, switch) = link();
            let client = UnitClient::new(
                unit_link,
                unit.identity,
                &config.rules,
                &config.reliability,
                config.session.clone(),
            )?;
            let effects = RecordedEffects::new();
            let process = UnitProcess::new(
                client,
                ScriptedSensors::new(unit.steps),
                effects.clone(),
                config.runtime.telemetry_interval(),
            );
            units.push(SimUnitSlot {
                driver: LoopDriver::new(clock.clone(), config.runtime.clone()),
                process,
                effects,
                switch,
            });
        }

        let (console_link, _) = link();
        let console = ConsoleClient::new(console_link, &config.reliability, config.session.clone())?;

        tracing::info!(
            units = units.len(),
            seed,
            loss = conditions.loss_percent,
            duplicate = conditions.duplicate_percent,
            "simulation ready"
        );

        Ok(Self {
            step: config.runtime.tick_interval(),
            duration: scenario.duration,
            arbiter_driver: LoopDriver::new(clock.clone(), config.runtime.clone()),
            arbiter: ArbiterProcess::new(server),
            console_driver: LoopDriver::new(clock.clone(), config.runtime.clone()),
            console: ConsoleProcess::new(console),
            units,
            clock,
        })
    }

    /// Current simulated time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Advances one tick and runs every node once: units, then arbiter,
    /// then console.
    pub fn step(&mut self) {
        self.clock.advance(self.step);
        for unit in &mut self.units {
            unit.driver.run_once(&mut unit.process);
        }
        self.arbiter_driver.run_once(&mut self.arbiter);
        self.console_driver.run_once(&mut self.console);
    }

    /// Steps until `span` of simulated time has passed.
    pub fn run_for(&mut self, span: Duration) {
        let end = self.now() + span;
        while self.now() < end {
            self.step();
        }
    }

    /// Runs the scenario to its end and reports.
    pub fn run(&mut self) -> SimReport {
        let end = Timestamp::ZERO + self.duration;
        while self.now() < end {
            self.step();
        }
        self.report()
    }

    /// Takes unit `index` off the air or back.
    pub fn set_unit_online(&self, index: usize, online: bool) {
        if let Some(unit) = self.units.get(index) {
            tracing::info!(unit = %unit.process.client().identity(), online, "link switched");
            unit.switch.set_online(online);
        }
    }

    /// The arbiter node.
    #[must_use]
    pub const fn arbiter(&self) -> &ArbiterServer<SimLink> {
        self.arbiter.server()
    }

    /// Unit node `index`.
    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&UnitClient<SimLink>> {
        self.units.get(index).map(|u| u.process.client())
    }

    /// Effects unit `index` produced so far.
    #[must_use]
    pub fn effects(&self, index: usize) -> Option<&RecordedEffects> {
        self.units.get(index).map(|u| &u.effects)
    }

    /// Whether every unit script has been played.
    #[must_use]
    pub fn scripts_done(&self) -> bool {
        self.units.iter().all(|u| u.process.sensors().is_exhausted())
    }

    /// The console's view.
    #[must_use]
    pub const fn view(&self) -> &MatchView {
        self.console.view()
    }

    /// Snapshot of the outcome so far.
    #[must_use]
    pub fn report(&self) -> SimReport {
        let machine = self.arbiter().machine();
        let flag = machine.flag();
        let view = self.view();
        let console_agrees = !view.stale && view.score == machine.score() && view.flag == flag;
        let units_agree = self
            .units
            .iter()
            .all(|u| u.process.client().machine().cached_flag() == flag);

        SimReport {
            elapsed: self.now(),
            phase: machine.phase(),
            score: machine.score(),
            winner: machine.winner(),
            flag,
            consistent: console_agrees && units_agree,
            arbiter: self.arbiter().stats(),
            units: self
                .units
                .iter()
                .map(|u| (u.process.client().identity().id(), u.process.client().stats()))
                .collect(),
        }
    }
}
