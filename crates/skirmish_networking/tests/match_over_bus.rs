//! Whole matches between nodes sharing an in-process bus.

use skirmish_core::{Possession, Rules, SensorEvent};
use skirmish_networking::{
    ArbiterServer, ConsoleClient, LocalBus, LossyLink, NetworkConditions, ReliabilityConfig, SessionConfig,
    Transport, UnitClient,
};
use skirmish_shared::{FlagLocation, GamePhase, Team, TeamScore, Timestamp, UnitId, UnitIdentity};

const STEP_MS: u64 = 50;

struct World<T> {
    arbiter: ArbiterServer<T>,
    units: Vec<UnitClient<T>>,
    console: ConsoleClient<T>,
    now: u64,
}

impl<T: Transport> World<T> {
    fn new(mut link: impl FnMut() -> T) -> Self {
        let rules = Rules::default();
        let reliability = ReliabilityConfig::default();
        let arbiter =
            ArbiterServer::new(link(), rules.clone(), &reliability, SessionConfig::default(), true).unwrap();
        let units = [(1, Team::Red), (2, Team::Blue)]
            .into_iter()
            .map(|(id, team)| {
                UnitClient::new(
                    link(),
                    UnitIdentity::new(UnitId(id), team),
                    &rules,
                    &reliability,
                    SessionConfig::default(),
                )
                .unwrap()
            })
            .collect();
        let console = ConsoleClient::new(link(), &reliability, SessionConfig::default()).unwrap();
        Self {
            arbiter,
            units,
            console,
            now: 0,
        }
    }

    fn at(&self) -> Timestamp {
        Timestamp::from_millis(self.now)
    }

    fn run_for(&mut self, ms: u64) {
        let end = self.now + ms;
        while self.now < end {
            self.now += STEP_MS;
            let now = self.at();
            for unit in &mut self.units {
                unit.tick(now);
            }
            self.arbiter.tick(now);
            self.console.tick(now);
        }
    }

    fn sensor(&mut self, unit: usize, event: SensorEvent) {
        let now = self.at();
        self.units[unit].sensor(now, event);
    }

    /// Drives `unit` through a capture and a deposit at its own base.
    fn score_once(&mut self, unit: usize) {
        let team = self.units[unit].identity().team();
        self.sensor(unit, SensorEvent::ZoneEnter);
        // Dwell plus room for one retransmission of the claim.
        self.run_for(6_500);
        assert_eq!(self.units[unit].machine().possession(), Possession::Carrying);
        self.sensor(unit, SensorEvent::ZoneExit);
        self.run_for(1_000);
        self.sensor(
            unit,
            SensorEvent::DepositScan {
                code: Rules::default().base_code(team).to_string(),
            },
        );
        self.run_for(1_000);
    }
}

#[test]
fn test_full_match_on_perfect_bus() {
    let bus = LocalBus::new();
    let mut world = World::new(|| bus.connect());
    world.run_for(500);

    assert!(world.units.iter().all(UnitClient::is_joined));
    assert_eq!(world.arbiter.machine().phase(), GamePhase::Active);

    for round in 1..=3u8 {
        world.score_once(0);
        assert_eq!(world.arbiter.machine().score(), TeamScore::new(round, 0));
        assert_eq!(world.console.view().score, TeamScore::new(round, 0));
    }

    assert_eq!(world.arbiter.machine().phase(), GamePhase::Ended);
    let view = world.console.view();
    assert_eq!(view.winner, Some(Team::Red));
    assert_eq!(view.last_game_over, Some(Team::Red));
    assert_eq!(view.flag.location, FlagLocation::AtBase(Team::Red));
    assert_eq!(world.units[0].machine().possession(), Possession::NotCarrying);
    assert_eq!(world.units[0].pending_acks(), 0);
}

#[test]
fn test_hit_forces_drop_everywhere() {
    let bus = LocalBus::new();
    let mut world = World::new(|| bus.connect());
    world.run_for(500);

    world.sensor(1, SensorEvent::ZoneEnter);
    world.run_for(5_500);
    assert!(world.arbiter.machine().flag().is_held_by(UnitId(2)));

    world.sensor(1, SensorEvent::Hit { shooter: Some(UnitId(1)) });
    world.run_for(500);

    assert!(world.arbiter.machine().flag().is_at_center());
    assert_eq!(world.units[1].machine().possession(), Possession::NotCarrying);
    assert!(world.units[0].machine().cached_flag().is_at_center());
    assert!(world.console.view().flag.is_at_center());
    let shooter = world.arbiter.snapshot().units.into_iter().find(|u| u.identity.id() == UnitId(1)).unwrap();
    assert_eq!(shooter.hits_landed, 1);
}

#[test]
fn test_lossy_field_converges() {
    let bus = LocalBus::new();
    let mut seed = 0xC0FFEE_u64;
    let mut world = World::new(|| {
        seed += 1;
        LossyLink::new(bus.connect(), NetworkConditions::FIELD, seed)
    });
    world.run_for(2_000);
    assert!(world.units.iter().all(UnitClient::is_joined));

    world.score_once(0);
    // Two snapshot periods, so one lost snapshot is tolerated.
    world.run_for(11_000);

    let expected = world.arbiter.machine().score();
    assert_eq!(expected, TeamScore::new(1, 0));
    assert_eq!(world.console.view().score, expected);
    assert!(!world.console.view().stale);
    assert_eq!(world.console.view().flag, world.arbiter.machine().flag());
    for unit in &world.units {
        assert_eq!(unit.pending_acks(), 0);
        assert_eq!(unit.machine().cached_flag(), world.arbiter.machine().flag());
    }
}
