use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serenity_core::game::{
    entity::{Ability, ObstacleKind},
    input::DeviceState,
    level::{FountainRecord, GameConfig, LevelDescription, PlatformRecord, ShardRecord},
    physics::{EntityRef, FixtureTag, ScriptedEvent, ScriptedWorld},
    save::MemorySaveSink,
    tick::Session,
};

fn level(platforms: u32) -> LevelDescription {
    let mut desc = LevelDescription::empty("bench");
    desc.entrance = [0.0, 1.0];
    desc.fountains = vec![FountainRecord { id: 1, position: [1.0, 1.0], ability: Ability::Transparency }];
    for id in 0..platforms {
        let x = id as f32 * 5.0;
        desc.platforms.push(PlatformRecord {
            id: 100 + id,
            kind: if id % 2 == 0 { ObstacleKind::Solid } else { ObstacleKind::Cloud },
            position: [x, 0.0],
            size: [4.0, 1.0],
            direction: None,
            velocity: (id % 3 == 0).then_some([1.0, 0.0]),
            bounds: Some([[x - 2.0, 0.0], [x + 2.0, 0.0]]),
        });
        desc.shards.push(ShardRecord { id: 1000 + id, position: [x, 2.0] });
    }
    desc
}

/// Every step reports the player resting on two platforms.
fn busy_world(steps: usize) -> ScriptedWorld {
    let body = FixtureTag::player_body();
    let feet = FixtureTag::player_feet();
    let mut world = ScriptedWorld::new();
    for i in 0..steps {
        let a = FixtureTag::body(EntityRef::Obstacle(100 + (i % 8) as u32));
        let b = FixtureTag::body(EntityRef::Obstacle(101 + (i % 8) as u32));
        world.queue_step(vec![
            ScriptedEvent::begin(feet, a),
            ScriptedEvent::pre_solve(body, a),
            ScriptedEvent::pre_solve(body, b),
            ScriptedEvent::end(feet, a),
        ]);
    }
    world
}

fn bench_idle_tick(c: &mut Criterion) {
    let desc = level(64);
    let mut session = Session::new(&desc, GameConfig::default()).unwrap();
    let mut world = ScriptedWorld::new();
    let mut saves = MemorySaveSink::new();

    c.bench_function("session_tick_idle", |b| {
        b.iter(|| {
            black_box(session.tick(DeviceState::new(), &mut world, &mut saves))
        })
    });
}

fn bench_contact_heavy(c: &mut Criterion) {
    let desc = level(64);

    c.bench_function("session_600_ticks_contacts", |b| {
        b.iter(|| {
            let mut session = Session::new(&desc, GameConfig::default()).unwrap();
            let mut world = busy_world(600);
            let mut saves = MemorySaveSink::new();
            for _ in 0..600 {
                session.tick(DeviceState::new(), &mut world, &mut saves);
            }
            black_box(session.compute_hash())
        })
    });
}

fn bench_state_hash(c: &mut Criterion) {
    let session = Session::new(&level(256), GameConfig::default()).unwrap();
    c.bench_function("state_hash_256_platforms", |b| b.iter(|| black_box(session.compute_hash())));
}

criterion_group!(benches, bench_idle_tick, bench_contact_heavy, bench_state_hash);
criterion_main!(benches);
