//! Session Tick
//!
//! One fixed 60 Hz step of a level: input, ability countdowns, movement,
//! a single physics step driving the contact resolver, then the deferred
//! world commands and the post-step consumers (hazard flags, checkpoint
//! persistence, win, failure).
//!
//! Every timer is a tick count and every collection is a BTreeMap, so two
//! sessions fed the same inputs and contacts end in the same state hash.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::core::fixed::{
    fixed_mul, ms_to_ticks, to_float, Fixed, DASH_SPEED, FIXED_ONE, FLIGHT_VELOCITY,
    JUMP_VELOCITY, RUN_SPEED, TICK_DURATION,
};
use crate::core::hash::StateHash;
use crate::core::vec2::FixedVec2;
use crate::game::ability::AbilityController;
use crate::game::checkpoint::{respawn, CheckpointManager, RespawnOutcome};
use crate::game::contact::{ContactResolver, ContactState, SmokePuff};
use crate::game::entity::{Ability, EntityId, Hazard};
use crate::game::events::{Cue, GameEvent};
use crate::game::input::{DeviceState, Direction, InputController, InputRecording, Intents};
use crate::game::level::{GameConfig, LevelDescription, LevelError};
use crate::game::physics::{EntityRef, PhysicsWorld, WorldCommand};
use crate::game::save::{encode_queue, star_rating, LevelSave, SaveError, SaveSink};
use crate::game::state::{Facing, GamePhase, LevelState};

/// Ticks a dash burst keeps overriding horizontal speed (200 ms).
pub const DASH_BURST_TICKS: u32 = crate::TICK_RATE / 5;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Phase after the tick
    pub phase: GamePhase,
    /// Set when a failure was handled this tick
    pub respawn: Option<RespawnOutcome>,
    /// Whether the level was completed this tick
    pub completed: bool,
}

/// Read-only view for the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameView {
    pub tick: u32,
    pub phase: GamePhase,
    /// World position in physics units
    pub player_position: (f32, f32),
    pub facing: Facing,
    pub transparent: bool,
    pub hurt: bool,
    /// HUD serenity
    pub serenity: f32,
    pub max_serenity: f32,
    /// Running ability and its countdown in seconds
    pub active_ability: Option<Ability>,
    pub ability_time_left: f32,
    /// Queued abilities in activation order
    pub queued: Vec<(EntityId, Ability)>,
    pub shards_collected: u32,
    pub shards_total: u32,
    /// Shards still in the world
    pub active_shards: Vec<EntityId>,
    /// Signposts currently showing
    pub signposts: Vec<EntityId>,
    pub debug: bool,
    pub map_open: bool,
}

/// A level being played.
#[derive(Clone, Debug)]
pub struct Session {
    level: LevelState,
    initial: LevelState,
    config: GameConfig,
    abilities: AbilityController,
    input: InputController,
    contacts: ContactState,
    checkpoints: CheckpointManager,
    /// Moving platform displacement this tick
    displacements: BTreeMap<EntityId, FixedVec2>,
    dash: Option<(Direction, u32)>,
    spawned: bool,
    debug: bool,
    map_open: bool,
}

impl Session {
    /// Build a session for a level.
    pub fn new(description: &LevelDescription, config: GameConfig) -> Result<Self, LevelError> {
        let level = LevelState::from_description(description)?;
        info!(
            "Level {} loaded: {} fountains, {} platforms, {} shards",
            level.name,
            level.fountains.len(),
            level.obstacles.len(),
            level.shard_count()
        );

        Ok(Self {
            initial: level.clone(),
            level,
            input: InputController::new(&config),
            config,
            abilities: AbilityController::new(),
            contacts: ContactState::new(),
            checkpoints: CheckpointManager::new(),
            displacements: BTreeMap::new(),
            dash: None,
            spawned: false,
            debug: false,
            map_open: false,
        })
    }

    pub fn level(&self) -> &LevelState {
        &self.level
    }

    pub fn abilities(&self) -> &AbilityController {
        &self.abilities
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_map_open(&self) -> bool {
        self.map_open
    }

    /// Compute state hash for verification.
    pub fn compute_hash(&self) -> StateHash {
        self.level.compute_hash()
    }

    /// Drain queued smoke puffs for rendering.
    pub fn take_smoke_puffs(&mut self) -> Vec<SmokePuff> {
        self.contacts.take_smoke_puffs()
    }

    /// Run one simulation tick.
    ///
    /// Save failures are logged and never abort the tick.
    pub fn tick<W: PhysicsWorld + ?Sized>(
        &mut self,
        device: DeviceState,
        world: &mut W,
        saves: &mut dyn SaveSink,
    ) -> TickResult {
        let mut result = TickResult::default();

        if !self.spawned {
            self.spawn(world);
        }

        let intents = self.input.update(device);
        self.handle_toggles(&intents, world);

        if self.level.phase != GamePhase::Playing || self.map_open {
            result.phase = self.level.phase;
            result.events = self.level.take_events();
            return result;
        }

        // 0. Advance tick counter
        self.level.tick += 1;
        self.level.player.hurt = false;

        // 1. Ability activation and countdown
        self.update_abilities(&intents);

        // 2. Player movement
        self.apply_movement(&intents, world);

        // 3. Kinematic platforms and rock timers
        self.advance_bodies(world);

        // 4. Physics step
        self.contacts.begin_step(&mut self.level.player);
        {
            let mut resolver = ContactResolver::new(
                &mut self.level,
                &mut self.abilities,
                &mut self.contacts,
                &mut self.checkpoints,
                &self.config,
            );
            world.step(TICK_DURATION, &mut resolver);
        }

        // 5. Deferred world mutations
        self.apply_commands(world);
        self.carry_rider(world);
        self.sync_bodies(world);

        // 6. Hazard flags and drains
        self.process_hazards();

        // 7. Checkpoint persistence
        if let Some(checkpoint) = self.contacts.take_checkpoint() {
            debug!("Persisting checkpoint {}", checkpoint);
            self.persist(saves, false, 0);
        }

        // 8. Win
        if self.contacts.take_win() {
            self.complete_level(saves);
            result.completed = true;
        }

        // 9. Signposts
        let position = self.level.player.position;
        for post in self.level.signposts.values_mut() {
            post.update_visibility(position);
        }

        // 10. Failure
        if self.level.phase == GamePhase::Playing {
            result.respawn = self.check_failure(world);
        }

        result.phase = self.level.phase;
        result.events = self.level.take_events();
        result
    }

    /// Rebuild the level from its description.
    pub fn reset_level<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        let broken = self.level.broken_windows();
        let old_phase = self.level.phase;

        self.level = self.initial.clone();
        self.abilities.reset();
        self.input.reset();
        self.checkpoints.clear();
        self.contacts = ContactState::new();
        self.dash = None;

        for id in broken {
            world.apply(&WorldCommand::RestoreBody(EntityRef::Obstacle(id)));
        }
        self.spawn(world);

        info!("Level {} reset", self.level.name);
        if old_phase != GamePhase::Playing {
            self.level.push_event(GameEvent::phase_changed(0, old_phase, GamePhase::Playing));
        }
    }

    /// Restore queued abilities, serenity and the checkpoint tally from a
    /// stored record.
    pub fn resume_from_save(&mut self, save: &LevelSave) -> Result<(), SaveError> {
        let queue = save.queue()?;

        self.abilities.reset();
        for id in queue {
            match self.level.fountains.get_mut(&id) {
                Some(fountain) if fountain.ability.is_timed() => {
                    fountain.available = false;
                    self.abilities.enqueue(id, fountain.ability);
                }
                _ => debug!("Saved queue entry {} not in level, skipped", id),
            }
        }

        if save.serenity_left > 0 {
            self.level.player.set_serenity(save.serenity_left.saturating_mul(FIXED_ONE));
        }
        self.checkpoints.set_checkpoints_passed(save.checkpoints_passed);

        info!(
            "Resumed {} with {} queued abilities, serenity {}",
            self.level.name,
            self.abilities.queue().len(),
            save.serenity_left
        );
        Ok(())
    }

    /// Snapshot for rendering.
    pub fn frame(&self) -> FrameView {
        let player = &self.level.player;
        FrameView {
            tick: self.level.tick,
            phase: self.level.phase,
            player_position: player.position.to_floats(),
            facing: player.facing,
            transparent: player.transparent,
            hurt: player.hurt,
            serenity: to_float(player.serenity),
            max_serenity: to_float(player.max_serenity),
            active_ability: self.abilities.active().map(|a| a.ability),
            ability_time_left: self.abilities.time_left_secs(),
            queued: self.abilities.queue().iter().map(|q| (q.fountain, q.ability)).collect(),
            shards_collected: self.level.collected_shards.len() as u32,
            shards_total: self.level.shard_count(),
            active_shards: self.level.active_shards.clone(),
            signposts: self.level.signposts.values().filter(|s| s.showing).map(|s| s.id).collect(),
            debug: self.debug,
            map_open: self.map_open,
        }
    }

    // -------------------------------------------------------------------------
    // Tick stages
    // -------------------------------------------------------------------------

    /// Put the player and kinematic bodies where the level says.
    fn spawn<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        world.apply(&WorldCommand::TeleportPlayer(self.level.player.position));
        for obstacle in self.level.obstacles.values().filter(|o| o.is_moving()) {
            world.apply(&WorldCommand::MoveBody {
                entity: EntityRef::Obstacle(obstacle.id),
                position: obstacle.position,
            });
        }
        for rock in self.level.rocks.values() {
            world.apply(&WorldCommand::ResetRock {
                id: rock.id,
                position: rock.origin,
                velocity: rock.origin_velocity,
            });
        }
        self.spawned = true;
    }

    fn handle_toggles<W: PhysicsWorld + ?Sized>(&mut self, intents: &Intents, world: &mut W) {
        if intents.reset {
            self.reset_level(world);
        }
        if intents.debug_toggle {
            self.debug = !self.debug;
            debug!("Debug overlay {}", if self.debug { "on" } else { "off" });
        }
        if intents.map {
            self.map_open = !self.map_open;
        }
        if intents.pause {
            let new_phase = match self.level.phase {
                GamePhase::Playing => GamePhase::Paused,
                GamePhase::Paused => GamePhase::Playing,
                _ => return,
            };
            let old_phase = std::mem::replace(&mut self.level.phase, new_phase);
            let tick = self.level.tick;
            self.level.push_event(GameEvent::phase_changed(tick, old_phase, new_phase));
        }
    }

    fn update_abilities(&mut self, intents: &Intents) {
        let tick = self.level.tick;

        if intents.use_ability {
            if let Some(next) = self.abilities.queue().peek().copied() {
                let duration = self.config.duration_ms(next.ability);
                if self.abilities.use_ability(duration).is_some() {
                    self.level.push_event(GameEvent::ability_started(tick, next.fountain, next.ability));
                }
            }
        }
        self.apply_finished();

        self.abilities.tick();
        self.apply_finished();

        self.level.player.transparent = self.abilities.is_ability_active(Ability::Transparency);
    }

    /// Side effects of abilities that ended: flags off, fountain back.
    fn apply_finished(&mut self) {
        let tick = self.level.tick;
        for done in self.abilities.take_finished() {
            if let Some(fountain) = self.level.fountains.get_mut(&done.fountain) {
                fountain.available = true;
            }

            let player = &mut self.level.player;
            match done.ability {
                Ability::Dash => {
                    player.dashing = false;
                    self.dash = None;
                }
                Ability::Flight => player.flying = false,
                Ability::Transparency => player.transparent = false,
                Ability::Restore => {}
            }

            self.level.push_event(GameEvent::ability_finished(tick, done.fountain, done.ability, done.reason));
        }
    }

    fn apply_movement<W: PhysicsWorld + ?Sized>(&mut self, intents: &Intents, world: &mut W) {
        let player = &mut self.level.player;
        let mut velocity = FixedVec2::new(
            fixed_mul(intents.horizontal, RUN_SPEED),
            world.player_body().velocity.y,
        );

        if intents.horizontal < 0 {
            player.facing = Facing::Left;
        } else if intents.horizontal > 0 {
            player.facing = Facing::Right;
        }

        if intents.jump && player.grounded {
            velocity.y = JUMP_VELOCITY;
        }

        // Dash: a short horizontal burst per double tap
        if let Some(direction) = intents.dash.filter(|_| self.abilities.is_ability_active(Ability::Dash)) {
            self.dash = Some((direction, DASH_BURST_TICKS));
        }
        player.dashing = false;
        if let Some((direction, left)) = self.dash {
            velocity.x = fixed_mul(direction.sign(), DASH_SPEED);
            player.dashing = true;
            player.facing = match direction {
                Direction::Left => Facing::Left,
                Direction::Right => Facing::Right,
            };
            self.dash = (left > 1).then_some((direction, left - 1));
        }

        // Flight: lift on double tap or while holding jump in the air
        player.flying = false;
        if self.abilities.is_ability_active(Ability::Flight)
            && (intents.flight || (intents.jump_held && !player.grounded))
        {
            velocity.y = FLIGHT_VELOCITY;
            player.flying = true;
        }

        world.apply(&WorldCommand::SetPlayerVelocity(velocity));
    }

    fn advance_bodies<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        self.displacements.clear();
        for obstacle in self.level.obstacles.values_mut().filter(|o| o.is_moving() && !o.broken) {
            let displacement = obstacle.advance(TICK_DURATION);
            self.displacements.insert(obstacle.id, displacement);
            world.apply(&WorldCommand::MoveBody {
                entity: EntityRef::Obstacle(obstacle.id),
                position: obstacle.position,
            });
        }

        let reset_after = ms_to_ticks(self.config.rock_reset_ms);
        for rock in self.level.rocks.values_mut() {
            rock.elapsed_ticks += 1;
            if rock.elapsed_ticks >= reset_after {
                rock.reset();
                world.apply(&WorldCommand::ResetRock {
                    id: rock.id,
                    position: rock.origin,
                    velocity: rock.origin_velocity,
                });
            }
        }
    }

    /// Forward queued commands to the world, mirroring removals and rock
    /// resets into the level first.
    fn apply_commands<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        for command in self.contacts.take_commands() {
            match command {
                WorldCommand::RemoveBody(EntityRef::Obstacle(id)) => {
                    if let Some(obstacle) = self.level.obstacles.get_mut(&id) {
                        if !obstacle.broken {
                            obstacle.broken = true;
                            let tick = self.level.tick;
                            self.level.push_event(GameEvent::window_broken(tick, id));
                        }
                    }
                    self.contacts.forget_body(EntityRef::Obstacle(id), &mut self.level.player);
                }
                WorldCommand::ResetRock { id, .. } => {
                    if let Some(rock) = self.level.rocks.get_mut(&id) {
                        rock.reset();
                    }
                }
                _ => {}
            }
            world.apply(&command);
        }
    }

    fn carry_rider<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        let Some(id) = self.contacts.riding() else {
            return;
        };
        if let Some(&displacement) = self.displacements.get(&id) {
            if displacement != FixedVec2::ZERO {
                world.apply(&WorldCommand::TranslatePlayer(displacement));
            }
        }
    }

    fn sync_bodies<W: PhysicsWorld + ?Sized>(&mut self, world: &W) {
        if let Some(body) = world.body(EntityRef::Player) {
            self.level.player.position = body.position;
            self.level.player.velocity = body.velocity;
        }
        for rock in self.level.rocks.values_mut() {
            if let Some(body) = world.body(EntityRef::Rock(rock.id)) {
                rock.position = body.position;
                rock.velocity = body.velocity;
            }
        }
    }

    fn process_hazards(&mut self) {
        let tick = self.level.tick;

        if self.contacts.take_spike_collision() {
            self.level.player.hurt = true;
            self.level.push_event(GameEvent::cue(tick, Cue::Hurt));
        }

        // Enemy drain does not stack: the worst touching enemy applies
        let player = &self.level.player;
        let drain = self
            .contacts
            .touching_enemy_ids()
            .filter_map(|id| self.level.enemies.get(&id))
            .filter_map(|enemy| enemy.strike(player, &self.config))
            .map(|strike| strike.amount())
            .max();
        if let Some(amount) = drain {
            self.level.player.drain(amount);
            self.level.player.hurt = true;
        }

        let cooldown = ms_to_ticks(self.config.enemy_cue_cooldown_ms);
        if self.contacts.consume_monster_collision(cooldown) {
            self.level.push_event(GameEvent::cue(tick, Cue::Hurt));
        }

        let passive = self.level.serenity_drain;
        if passive > 0 {
            self.level.player.drain(passive);
        }
    }

    fn complete_level(&mut self, saves: &mut dyn SaveSink) {
        let tick = self.level.tick;
        let serenity = self.level.player.serenity;
        let stars = star_rating(serenity, &self.level.star_thresholds);
        let serenity_left = whole_units(serenity);

        self.level.push_event(GameEvent::cue(tick, Cue::StopMusic));
        self.level.push_event(GameEvent::cue(tick, Cue::Win));

        info!("Level {} completed: serenity {}, {} stars", self.level.name, serenity_left, stars);
        self.persist(saves, true, stars);

        self.level.push_event(GameEvent::level_completed(tick, serenity_left, stars));
        let old_phase = std::mem::replace(&mut self.level.phase, GamePhase::Won);
        self.level.push_event(GameEvent::phase_changed(tick, old_phase, GamePhase::Won));
    }

    fn check_failure<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) -> Option<RespawnOutcome> {
        let fell = self.level.player.position.y < self.level.floor;
        let depleted = self.level.player.check_depleted();
        if !fell && !depleted {
            return None;
        }

        debug!("Failure at tick {} (fell: {}, depleted: {})", self.level.tick, fell, depleted);
        let outcome = respawn(&mut self.level, &mut self.abilities, &mut self.contacts, &self.checkpoints);
        self.dash = None;
        self.apply_commands(world);
        self.sync_bodies(world);
        Some(outcome)
    }

    // -------------------------------------------------------------------------
    // Saves
    // -------------------------------------------------------------------------

    fn save_record(&self, completed: bool, stars: u8) -> Result<LevelSave, SaveError> {
        let mut save = LevelSave::new(&self.level.name, &self.level.path);
        save.completed = completed;
        save.num_stars = stars;
        save.checkpoints_passed = self.checkpoints.checkpoints_passed();
        save.serenity_left = whole_units(self.level.player.serenity);
        save.ability_queue = encode_queue(&self.abilities.queue().fountain_ids())?;
        Ok(save.stamped())
    }

    fn persist(&self, saves: &mut dyn SaveSink, completed: bool, stars: u8) {
        let previous = saves.load(&self.level.name).unwrap_or_else(|err| {
            warn!("Could not read save for {}: {}", self.level.name, err);
            None
        });

        let record = match self.save_record(completed, stars) {
            Ok(record) => record.merged_with(previous.as_ref()),
            Err(err) => {
                warn!("Could not build save for {}: {}", self.level.name, err);
                return;
            }
        };

        if let Err(err) = saves.store(record) {
            warn!("Could not store save for {}: {}", self.level.name, err);
        }
    }
}

/// Integer part of a non-negative fixed value.
fn whole_units(value: Fixed) -> i32 {
    value / FIXED_ONE
}

/// Replay a level from a recorded input stream.
///
/// Stops early once the level is won or lost. Returns the session and
/// every event produced.
pub fn replay_level<W: PhysicsWorld + ?Sized>(
    description: &LevelDescription,
    config: GameConfig,
    recording: &InputRecording,
    world: &mut W,
    saves: &mut dyn SaveSink,
) -> Result<(Session, Vec<GameEvent>), LevelError> {
    let mut session = Session::new(description, config)?;
    let mut all_events = Vec::new();

    for (_, device) in recording.replay() {
        let result = session.tick(device, world, saves);
        all_events.extend(result.events);

        if matches!(result.phase, GamePhase::Won | GamePhase::Lost) {
            break;
        }
    }

    Ok((session, all_events))
}

// =============================================================================
// TESTS
// =============================================================================
