//! Benchmark for the wire codec and arbiter message handling.
//!
//! TARGET: a full match round (join, capture, deposit) adjudicated in well
//! under a millisecond on a Raspberry Pi class CPU.
//!
//! Run with: cargo bench --package skirmish_networking --bench codec_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use skirmish_core::{Rules, StateDelta};
use skirmish_networking::{
    ArbiterServer, Codec, LocalBus, Message, ReliabilityConfig, SessionConfig, StateUpdate, UnitClient,
};
use skirmish_shared::{
    EventKind, FlagState, GameEvent, GamePhase, Team, TeamScore, Timestamp, Topic, UnitId, UnitIdentity,
};

fn deposit_event() -> Message {
    Message::Event(GameEvent::new(
        UnitId(7),
        Timestamp::from_millis(123_456),
        EventKind::Deposit {
            team: Team::Blue,
            base_code: "BASE-BLUE".to_string(),
        },
    ))
}

fn state_update() -> Message {
    Message::State(StateUpdate {
        revision: 4_242,
        deltas: vec![
            StateDelta::Flag(FlagState::INITIAL),
            StateDelta::Score(TeamScore::new(2, 1)),
            StateDelta::Phase(GamePhase::Active),
        ],
    })
}

fn benchmark_encode(c: &mut Criterion) {
    let mut codec = Codec::new();
    let event = deposit_event();
    let state = state_update();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("deposit_event", |b| {
        let mut seq = 0u32;
        b.iter(|| {
            seq = seq.wrapping_add(1);
            black_box(codec.encode(UnitId(7), seq, black_box(&event)))
        });
    });
    group.bench_function("state_update", |b| {
        b.iter(|| black_box(codec.encode(UnitId::ARBITER, 1, black_box(&state))));
    });
    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut codec = Codec::new();
    let event_topic = Topic::UnitEvent(UnitId(7)).name();
    let event_bytes = codec.encode(UnitId(7), 99, &deposit_event()).unwrap();
    let state_bytes = codec.encode(UnitId::ARBITER, 1, &state_update()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("deposit_event", |b| {
        b.iter(|| black_box(Codec::decode(&event_topic, black_box(&event_bytes))));
    });
    group.bench_function("state_update", |b| {
        b.iter(|| black_box(Codec::decode("arbiter/state", black_box(&state_bytes))));
    });
    // Garbage must be rejected quickly.
    group.bench_function("reject_garbage", |b| {
        let garbage = vec![0xAB_u8; 200];
        b.iter(|| black_box(Codec::decode(&event_topic, black_box(&garbage))));
    });
    group.finish();
}

fn benchmark_arbiter_round(c: &mut Criterion) {
    let rules = Rules::default();
    let reliability = ReliabilityConfig::default();

    c.bench_function("arbiter_join_round", |b| {
        b.iter(|| {
            let bus = LocalBus::new();
            let mut arbiter =
                ArbiterServer::new(bus.connect(), rules.clone(), &reliability, SessionConfig::default(), true)
                    .unwrap();
            let mut units: Vec<_> = (1..=4)
                .map(|id| {
                    let team = if id % 2 == 0 { Team::Blue } else { Team::Red };
                    UnitClient::new(
                        bus.connect(),
                        UnitIdentity::new(UnitId(id), team),
                        &rules,
                        &reliability,
                        SessionConfig::default(),
                    )
                    .unwrap()
                })
                .collect();
            for step in 0..3 {
                let now = Timestamp::from_millis(step * 20);
                for unit in &mut units {
                    unit.tick(now);
                }
                arbiter.tick(now);
            }
            black_box(arbiter.snapshot())
        });
    });
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_arbiter_round);
criterion_main!(benches);
