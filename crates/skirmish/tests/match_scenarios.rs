//! Whole-match scenarios driven through the process layer: scripted
//! sensors, loop drivers and the simulated radio.

use skirmish::core::{CaptureStatus, Effect, Possession, RumbleCue};
use skirmish::devices::{ScriptStep, ScriptedInput};
use skirmish::networking::NetworkConditions;
use skirmish::sim::ScriptedUnit;
use skirmish::{MatchScenario, MatchSim, SkirmishConfig};
use skirmish_shared::{FlagLocation, GamePhase, Team, TeamScore, UnitId, UnitIdentity};
use std::time::Duration;

fn at(at_ms: u64, input: ScriptedInput) -> ScriptStep {
    ScriptStep { at_ms, input }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[test]
fn test_standard_match_on_perfect_radio() {
    let config = SkirmishConfig::default();
    let mut sim = MatchSim::new(&config, MatchScenario::standard(&config.rules), 1).unwrap();
    let report = sim.run();

    assert!(sim.scripts_done());
    assert_eq!(report.phase, GamePhase::Ended);
    assert_eq!(report.winner, Some(Team::Red));
    assert_eq!(report.score, TeamScore::new(3, 0));
    assert_eq!(report.flag.location, FlagLocation::AtBase(Team::Red));
    assert!(report.consistent);
    assert_eq!(report.arbiter.malformed, 0);

    let red = sim.effects(0).unwrap();
    assert!(red.contains(&Effect::FlagIndicator { carrying: true }));
    assert!(red.contains(&Effect::Rumble(RumbleCue::Capture)));

    let blue = sim.effects(1).unwrap();
    assert!(blue.snapshot().iter().any(|(_, e)| matches!(e, Effect::StunStarted { .. })));
    assert!(blue.contains(&Effect::FlagIndicator { carrying: true }));
    assert!(blue.contains(&Effect::FlagIndicator { carrying: false }));

    let view = sim.view();
    assert_eq!(view.winner, Some(Team::Red));
    assert_eq!(view.units.len(), 2);
    assert!(view.units.values().all(|u| u.connected));
    assert!(view.units.values().all(|u| u.telemetry.is_some()));
}

#[test]
fn test_field_radio_converges() {
    let mut config = SkirmishConfig::default();
    config.simulation = NetworkConditions::FIELD;
    let mut sim = MatchSim::new(&config, MatchScenario::standard(&config.rules), 0x5EED).unwrap();
    sim.run();
    // Long enough for the last retransmissions and a periodic snapshot.
    sim.run_for(secs(12));

    let report = sim.report();
    assert!(report.consistent, "views diverged: {report:?}");
    assert!(report.score.get(Team::Red) >= 1);
    assert_eq!(report.score.get(Team::Blue), 0);
}

#[test]
fn test_carrier_partition_returns_flag_after_grace() {
    let config = SkirmishConfig::default();
    let capture = config.rules.capture_ms;
    let scenario = MatchScenario {
        units: vec![
            ScriptedUnit {
                identity: UnitIdentity::new(UnitId(1), Team::Red),
                steps: vec![
                    at(1_000, ScriptedInput::ZoneEnter),
                    at(1_000 + capture + 500, ScriptedInput::ZoneExit),
                ],
            },
            ScriptedUnit {
                identity: UnitIdentity::new(UnitId(2), Team::Blue),
                steps: Vec::new(),
            },
        ],
        duration: secs(60),
    };
    let mut sim = MatchSim::new(&config, scenario, 3).unwrap();

    sim.run_for(secs(8));
    assert_eq!(sim.arbiter().machine().flag().holder(), Some(UnitId(1)));

    // Silence past the link timeout plus the grace period.
    sim.set_unit_online(0, false);
    sim.run_for(secs(16));
    let machine = sim.arbiter().machine();
    assert!(machine.flag().is_at_center());
    assert!(!machine.is_registered(UnitId(1)));
    assert!(!sim.view().units.contains_key(&UnitId(1)));

    // Back on the air: the unit learns it was removed and joins again.
    sim.set_unit_online(0, true);
    sim.run_for(secs(15));
    let red = sim.unit(0).unwrap();
    assert!(red.is_joined());
    assert!(sim.arbiter().machine().is_registered(UnitId(1)));
    assert!(red.machine().cached_flag().is_at_center());
    assert!(sim.report().consistent);
}

#[test]
fn test_claim_made_while_timed_out_is_not_replayed() {
    let config = SkirmishConfig::default();
    let scenario = MatchScenario {
        units: vec![
            ScriptedUnit {
                identity: UnitIdentity::new(UnitId(1), Team::Red),
                steps: vec![at(1_000, ScriptedInput::ZoneEnter)],
            },
            ScriptedUnit {
                identity: UnitIdentity::new(UnitId(2), Team::Blue),
                steps: Vec::new(),
            },
        ],
        duration: secs(60),
    };
    let mut sim = MatchSim::new(&config, scenario, 5).unwrap();

    sim.run_for(secs(2));
    assert_eq!(sim.unit(0).unwrap().machine().capture().status, CaptureStatus::Capturing);

    // The dwell completes on the unit while the arbiter times it out.
    sim.set_unit_online(0, false);
    sim.run_for(secs(20));
    assert!(sim.unit(0).unwrap().machine().claim_pending());
    assert!(!sim.arbiter().machine().is_registered(UnitId(1)));

    sim.set_unit_online(0, true);
    sim.run_for(secs(15));
    let red = sim.unit(0).unwrap();
    assert!(red.is_joined());
    assert!(sim.arbiter().machine().is_registered(UnitId(1)));
    assert!(sim.arbiter().machine().flag().is_at_center());
    assert_eq!(red.machine().possession(), Possession::NotCarrying);
    assert!(!red.machine().claim_pending());
    assert_eq!(red.machine().capture().status, CaptureStatus::Idle);
    assert_eq!(red.pending_acks(), 0);
    assert!(sim.report().consistent);
}

#[test]
fn test_rules_from_config_file() {
    let config = SkirmishConfig::from_toml(
        r#"
        [rules]
        winning_score = 1
        capture_ms = 2000
        red_base_code = "R-HOME"
        blue_base_code = "B-HOME"

        [session]
        snapshot_interval_ms = 2000
        "#,
    )
    .unwrap();
    let scenario = MatchScenario::standard(&config.rules);
    assert!(scenario.units[0]
        .steps
        .iter()
        .any(|s| matches!(&s.input, ScriptedInput::Deposit { code } if code == "R-HOME")));

    let mut sim = MatchSim::new(&config, scenario, 11).unwrap();
    let report = sim.run();
    assert_eq!(report.phase, GamePhase::Ended);
    assert_eq!(report.winner, Some(Team::Red));
    assert_eq!(report.score, TeamScore::new(1, 0));
    assert!(report.consistent);
}

#[test]
fn test_same_seed_same_outcome() {
    let mut config = SkirmishConfig::default();
    config.simulation = NetworkConditions::HOSTILE;
    let run = |seed| {
        let mut sim = MatchSim::new(&config, MatchScenario::standard(&config.rules), seed).unwrap();
        sim.run()
    };
    assert_eq!(run(99), run(99));
}
