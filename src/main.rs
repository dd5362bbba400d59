//! Serenity Simulator
//!
//! Runs a level against the scripted physics engine and checks that a
//! replay of the same inputs ends in the same state hash.
//!
//! Usage: `serenity-sim [level.json] [config.json] [save-dir]`

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use serenity_core::{
    TICK_RATE, VERSION,
    game::{
        entity::{Ability, EnemyKind, ObstacleKind},
        events::GameEventData,
        input::{DeviceState, InputRecording},
        level::{
            EnemyRecord, FountainRecord, GameConfig, GoalRecord, LevelDescription, PlatformRecord,
            ShardRecord,
        },
        physics::{EntityRef, FixtureTag, ScriptedEvent, ScriptedWorld},
        save::{JsonFileSaveSink, MemorySaveSink, SaveSink},
        state::GamePhase,
        tick::{replay_level, Session},
    },
};

const DEMO_TICKS: u32 = 600;

fn main() -> Result<()> {
    // Initialize logging
    let level = if cfg!(feature = "debug-tracing") { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Serenity Simulator v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let args: Vec<String> = std::env::args().skip(1).collect();

    let description = match args.first() {
        Some(path) => load_json::<LevelDescription>(path)?,
        None => demo_level(),
    };
    let config = match args.get(1) {
        Some(path) => load_json::<GameConfig>(path)?,
        None => GameConfig::default(),
    };

    match args.get(2) {
        Some(dir) => run(&description, config, &mut JsonFileSaveSink::new(dir)),
        None => run(&description, config, &mut MemorySaveSink::new()),
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Small level with one of everything.
fn demo_level() -> LevelDescription {
    let mut desc = LevelDescription::empty("demo");
    desc.entrance = [0.0, 1.0];
    desc.goal = GoalRecord { position: [40.0, 1.0], size: [2.0, 2.0] };
    desc.fountains = vec![
        FountainRecord { id: 1, position: [4.0, 1.0], ability: Ability::Dash },
        FountainRecord { id: 2, position: [12.0, 1.0], ability: Ability::Restore },
    ];
    desc.platforms = vec![
        PlatformRecord {
            id: 10,
            kind: ObstacleKind::Solid,
            position: [20.0, 0.0],
            size: [50.0, 1.0],
            direction: None,
            velocity: None,
            bounds: None,
        },
        PlatformRecord {
            id: 11,
            kind: ObstacleKind::Spiked,
            position: [16.0, 0.5],
            size: [2.0, 0.5],
            direction: Some([0.0, 1.0]),
            velocity: None,
            bounds: None,
        },
    ];
    desc.enemies = vec![EnemyRecord { id: 30, kind: EnemyKind::Ground, position: [24.0, 1.0] }];
    desc.shards = vec![
        ShardRecord { id: 20, position: [8.0, 1.0] },
        ShardRecord { id: 21, position: [28.0, 1.0] },
    ];
    desc
}

/// Contact script matching the demo level.
fn demo_world() -> ScriptedWorld {
    let body = FixtureTag::player_body();
    let feet = FixtureTag::player_feet();
    let ground = FixtureTag::body(EntityRef::Obstacle(10));
    let spikes = FixtureTag::body(EntityRef::Obstacle(11));
    let enemy = FixtureTag::body(EntityRef::Enemy(30));

    let mut world = ScriptedWorld::new();
    world.queue_step(vec![ScriptedEvent::begin(feet, ground)]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::begin(body, FixtureTag::sensor(EntityRef::Fountain(1)))]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::begin(body, FixtureTag::sensor(EntityRef::Shard(20)))]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::begin(body, FixtureTag::sensor(EntityRef::Fountain(2)))]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::pre_solve(body, spikes)]);
    world.queue_step(vec![ScriptedEvent::end(body, spikes)]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::begin(body, enemy)]);
    world.queue_idle(30);
    world.queue_step(vec![ScriptedEvent::end(body, enemy)]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::begin(body, FixtureTag::sensor(EntityRef::Shard(21)))]);
    world.queue_idle(20);
    world.queue_step(vec![ScriptedEvent::begin(body, FixtureTag::sensor(EntityRef::Goal))]);
    world
}

/// Held buttons per tick: walk right, use the dash and double tap once.
fn demo_inputs() -> InputRecording {
    let right = DeviceState::BUTTON_RIGHT;
    let mut recording = InputRecording::new();
    for tick in 0..DEMO_TICKS {
        let buttons = match tick {
            30 => DeviceState::BUTTON_ABILITY,
            40 | 44 => right,
            41..=43 => 0,
            _ => right,
        };
        recording.record(tick, DeviceState::with_buttons(buttons));
    }
    recording
}

fn run(description: &LevelDescription, config: GameConfig, saves: &mut dyn SaveSink) -> Result<()> {
    info!("=== Running {} ===", description.name);

    let recording = demo_inputs();
    let mut world = demo_world();
    let mut session = Session::new(description, config.clone()).context("building level")?;

    // Replays start fresh, so an earlier save is only reported
    if let Some(save) = saves.load(&description.name)? {
        info!(
            "Found save: {} stars, completed {}, {} queued",
            save.num_stars,
            save.completed,
            save.queue().map(|q| q.len()).unwrap_or(0)
        );
    }

    let mut total_events = 0;
    for (t, device) in recording.replay() {
        let result = session.tick(device, &mut world, saves);
        total_events += result.events.len();

        for event in &result.events {
            match &event.data {
                GameEventData::FountainCollected { fountain, ability } => {
                    info!("Tick {}: fountain {} gave {:?}", t, fountain, ability);
                }
                GameEventData::ShardCollected { collected, total, .. } => {
                    info!("Tick {}: shard {}/{}", t, collected, total);
                }
                GameEventData::Respawned { checkpoint } => {
                    info!("Tick {}: respawned at {}", t, checkpoint);
                }
                GameEventData::LevelCompleted { serenity_left, stars } => {
                    info!("Tick {}: level complete, serenity {}, {} stars", t, serenity_left, stars);
                }
                _ => {}
            }
        }

        if matches!(result.phase, GamePhase::Won | GamePhase::Lost) {
            info!("Level ended at tick {} ({:?})", t, result.phase);
            break;
        }
    }

    let frame = session.frame();
    info!("=== Results ===");
    info!("Serenity: {:.1}/{:.1}", frame.serenity, frame.max_serenity);
    info!("Shards: {}/{}", frame.shards_collected, frame.shards_total);
    info!("Smoke puffs pending: {}", session.take_smoke_puffs().len());
    info!("Total events: {}", total_events);

    let hash = session.compute_hash();
    info!("Final State Hash: {}", hex::encode(hash));

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let mut scratch = MemorySaveSink::new();
    let (replayed, _) = replay_level(description, config, &recording, &mut demo_world(), &mut scratch)
        .context("replaying level")?;
    let replay_hash = replayed.compute_hash();
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
    } else {
        warn!("DETERMINISM FAILURE: Hashes differ!");
    }
    Ok(())
}
