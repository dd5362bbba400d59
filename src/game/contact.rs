//! Contact Resolution
//!
//! Interprets raw fixture-pair callbacks from the physics step as gameplay
//! outcomes: grounding, one-way platforms, hazard damage and knockback,
//! pickups, checkpoints and the win condition.
//!
//! Callbacks run inside `PhysicsWorld::step`, so nothing here mutates the
//! world directly. Body removals, impulses and teleports are queued as
//! [`WorldCommand`]s and one-shot flags are raised for the post-step
//! consumers in the session tick.

use std::collections::{BTreeSet, VecDeque};

use serde::{Serialize, Deserialize};
use tracing::{debug, info, trace, warn};

use crate::core::fixed::fixed_mul;
use crate::core::vec2::FixedVec2;
use crate::game::ability::AbilityController;
use crate::game::checkpoint::{CheckpointManager, CheckpointSnapshot};
use crate::game::entity::{Collectible, EntityId, Groundable, Hazard, OneWayPlatform};
use crate::game::events::{Cue, GameEvent};
use crate::game::level::GameConfig;
use crate::game::physics::{Contact, ContactListener, EntityRef, Fixture, FixtureRole, FixtureTag, WorldCommand};
use crate::game::state::{LevelState, Player};

/// Contact that could not be interpreted. The pair is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    #[error("fixture without user data")]
    MissingUserData,

    #[error("no level entity for {0:?}")]
    UnknownEntity(EntityRef),
}

/// Dust cloud left where a rock hit something.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokePuff {
    pub rock: EntityId,
    /// Where the rock was when it hit
    pub position: FixedVec2,
    /// Where the rock respawns
    pub origin: FixedVec2,
}

// =============================================================================
// CONTACT STATE
// =============================================================================

/// Contact bookkeeping that outlives a single step.
#[derive(Clone, Debug, Default)]
pub struct ContactState {
    ground: BTreeSet<FixtureTag>,
    spike_latched: BTreeSet<FixtureTag>,
    touching_enemies: BTreeSet<EntityId>,
    spike_collision: bool,
    monster_collision: bool,
    enemy_cue_cooldown: u32,
    riding: Option<EntityId>,
    win_pending: bool,
    checkpoint_pending: Option<EntityId>,
    commands: Vec<WorldCommand>,
    smoke: VecDeque<SmokePuff>,
}

impl ContactState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ground fixtures currently under the foot sensor.
    pub fn ground_count(&self) -> usize {
        self.ground.len()
    }

    /// Enemies currently overlapping the player.
    pub fn touching_enemies(&self) -> usize {
        self.touching_enemies.len()
    }

    /// Ids of the enemies currently overlapping the player.
    pub fn touching_enemy_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.touching_enemies.iter().copied()
    }

    /// Moving one-way platform carrying the player this step.
    pub fn riding(&self) -> Option<EntityId> {
        self.riding
    }

    /// Forget last step's rider and settle grounding from the foot contacts
    /// before stepping again.
    pub fn begin_step(&mut self, player: &mut Player) {
        self.riding = None;
        player.grounded = !self.ground.is_empty();
    }

    /// Consume the spike flag.
    pub fn take_spike_collision(&mut self) -> bool {
        std::mem::take(&mut self.spike_collision)
    }

    /// Consume the win flag.
    pub fn take_win(&mut self) -> bool {
        std::mem::take(&mut self.win_pending)
    }

    /// Consume the pending checkpoint persistence.
    pub fn take_checkpoint(&mut self) -> Option<EntityId> {
        self.checkpoint_pending.take()
    }

    /// Consume the monster flag and advance the shared cue cooldown.
    ///
    /// Returns true when the hurt cue should play this tick.
    pub fn consume_monster_collision(&mut self, cooldown_ticks: u32) -> bool {
        let raised = std::mem::take(&mut self.monster_collision) || !self.touching_enemies.is_empty();
        self.enemy_cue_cooldown = self.enemy_cue_cooldown.saturating_sub(1);
        if raised && self.enemy_cue_cooldown == 0 {
            self.enemy_cue_cooldown = cooldown_ticks;
            return true;
        }
        false
    }

    /// Drain the deferred world commands.
    pub fn take_commands(&mut self) -> Vec<WorldCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Queue a world command for after the step.
    pub fn defer(&mut self, command: WorldCommand) {
        self.commands.push(command);
    }

    /// Drain queued smoke puffs, oldest first.
    pub fn take_smoke_puffs(&mut self) -> Vec<SmokePuff> {
        self.smoke.drain(..).collect()
    }

    fn push_smoke(&mut self, puff: SmokePuff, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.smoke.len() >= capacity {
            self.smoke.pop_front();
        }
        self.smoke.push_back(puff);
    }

    /// Drop every ground fixture of a body that left the world.
    pub fn forget_body(&mut self, entity: EntityRef, player: &mut Player) {
        self.ground.retain(|t| t.entity != entity);
        self.spike_latched.retain(|t| t.entity != entity);
        player.grounded = !self.ground.is_empty();
    }

    /// Clear every latch and cooldown (respawn and level reset).
    pub fn clear_latches(&mut self, player: &mut Player) {
        self.ground.clear();
        self.spike_latched.clear();
        self.touching_enemies.clear();
        self.spike_collision = false;
        self.monster_collision = false;
        self.enemy_cue_cooldown = 0;
        self.riding = None;
        self.win_pending = false;
        player.grounded = false;
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// One side of a tagged contact.
#[derive(Clone, Copy, Debug)]
struct Side {
    tag: FixtureTag,
    position: FixedVec2,
}

impl Side {
    fn from_fixture(fixture: &Fixture) -> Result<Self, ContactError> {
        let tag = fixture.tag.ok_or(ContactError::MissingUserData)?;
        Ok(Self { tag, position: fixture.position })
    }
}

/// Split a contact into sides, player first when present.
fn sides(contact: &Contact) -> Result<(Side, Side), ContactError> {
    let a = Side::from_fixture(&contact.a)?;
    let b = Side::from_fixture(&contact.b)?;
    if b.tag.entity == EntityRef::Player {
        Ok((b, a))
    } else {
        Ok((a, b))
    }
}

/// Contact listener borrowing everything a step may touch.
pub struct ContactResolver<'a> {
    level: &'a mut LevelState,
    abilities: &'a mut AbilityController,
    contacts: &'a mut ContactState,
    checkpoints: &'a mut CheckpointManager,
    config: &'a GameConfig,
}

impl<'a> ContactResolver<'a> {
    pub fn new(
        level: &'a mut LevelState,
        abilities: &'a mut AbilityController,
        contacts: &'a mut ContactState,
        checkpoints: &'a mut CheckpointManager,
        config: &'a GameConfig,
    ) -> Self {
        Self { level, abilities, contacts, checkpoints, config }
    }

    /// Player state with the live body position from the contact.
    fn player_at(&self, position: FixedVec2) -> Player {
        let mut player = self.level.player.clone();
        player.position = position;
        player
    }

    fn on_begin(&mut self, contact: &Contact) -> Result<(), ContactError> {
        let (me, other) = sides(contact)?;

        match (me.tag.entity, me.tag.role, other.tag.entity) {
            (EntityRef::Player, FixtureRole::FootSensor, EntityRef::Obstacle(id)) => {
                self.land(other.tag, id, me.position)
            }
            (EntityRef::Player, FixtureRole::Body, EntityRef::Fountain(id)) => {
                self.touch_fountain(id, me.position)
            }
            (EntityRef::Player, FixtureRole::Body, EntityRef::Shard(id)) => self.touch_shard(id),
            (EntityRef::Player, FixtureRole::Body, EntityRef::Goal) => {
                self.touch_goal();
                Ok(())
            }
            (EntityRef::Player, FixtureRole::Body, EntityRef::Enemy(id)) => self.touch_enemy(id),
            (EntityRef::Player, FixtureRole::Body, EntityRef::Rock(id)) => {
                self.rock_hits_player(id, other.position, me.position)
            }
            (EntityRef::Rock(id), _, EntityRef::Obstacle(_)) => self.rock_hits_platform(id, me.position),
            (EntityRef::Obstacle(_), _, EntityRef::Rock(id)) => self.rock_hits_platform(id, other.position),
            _ => Ok(()),
        }
    }

    fn on_pre_solve(&mut self, contact: &mut Contact) -> Result<(), ContactError> {
        let (me, other) = sides(contact)?;

        match (me.tag.entity, me.tag.role, other.tag.entity) {
            (EntityRef::Player, FixtureRole::Body, EntityRef::Obstacle(id)) => {
                self.solve_platform(contact, other.tag, id, me.position)
            }
            _ => Ok(()),
        }
    }

    fn on_end(&mut self, contact: &Contact) -> Result<(), ContactError> {
        let (me, other) = sides(contact)?;

        match (me.tag.entity, me.tag.role, other.tag.entity) {
            (EntityRef::Player, FixtureRole::FootSensor, EntityRef::Obstacle(id)) => {
                self.contacts.ground.remove(&other.tag);
                let still_on = self.contacts.ground.iter().any(|t| t.entity == other.tag.entity);
                if let Some(obstacle) = self.level.obstacles.get_mut(&id) {
                    if !still_on {
                        obstacle.stood_on = false;
                    }
                }
                self.level.player.grounded = !self.contacts.ground.is_empty();
            }
            (EntityRef::Player, FixtureRole::Body, EntityRef::Obstacle(_)) => {
                self.contacts.spike_latched.remove(&other.tag);
            }
            (EntityRef::Player, FixtureRole::Body, EntityRef::Enemy(id)) => {
                self.contacts.touching_enemies.remove(&id);
            }
            _ => {}
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Platforms
    // -------------------------------------------------------------------------

    fn land(&mut self, fixture: FixtureTag, id: EntityId, player_position: FixedVec2) -> Result<(), ContactError> {
        let player = self.player_at(player_position);
        let obstacle = self
            .level
            .obstacles
            .get_mut(&id)
            .ok_or(ContactError::UnknownEntity(EntityRef::Obstacle(id)))?;

        if !obstacle.grounds(&player) {
            trace!("Foot sensor on platform {} without valid footing", id);
            return Ok(());
        }

        let before = obstacle.step_count;
        let breaks = obstacle.register_landing();
        let cracked = (obstacle.step_count != before).then_some(obstacle.step_count);

        self.contacts.ground.insert(fixture);
        self.level.player.grounded = true;

        if let Some(steps) = cracked {
            let tick = self.level.tick;
            self.level.push_event(GameEvent::window_cracked(tick, id, steps));
        }
        if breaks {
            debug!("Window {} breaks", id);
            self.contacts.defer(WorldCommand::RemoveBody(EntityRef::Obstacle(id)));
        }
        Ok(())
    }

    fn solve_platform(
        &mut self,
        contact: &mut Contact,
        fixture: FixtureTag,
        id: EntityId,
        player_position: FixedVec2,
    ) -> Result<(), ContactError> {
        let player = self.player_at(player_position);
        let obstacle = self
            .level
            .obstacles
            .get(&id)
            .ok_or(ContactError::UnknownEntity(EntityRef::Obstacle(id)))?;

        if !obstacle.allows_contact(&player) {
            contact.set_enabled(false);
            return Ok(());
        }

        if obstacle.one_way && obstacle.is_moving() {
            self.contacts.riding = Some(id);
        }

        let Some(strike) = obstacle.strike(&player, self.config) else {
            return Ok(());
        };

        contact.set_enabled(false);

        // One deduction per touch, however many fixtures of the spike overlap
        let touching = self.contacts.spike_latched.iter().any(|t| t.entity == fixture.entity);
        self.contacts.spike_latched.insert(fixture);
        if touching {
            return Ok(());
        }

        if let Some(direction) = strike.knockback {
            let impulse = direction.scale(self.config.knockback_impulse);
            self.contacts.defer(WorldCommand::ApplyPlayerImpulse(impulse));
        }

        let damage = strike.amount();
        self.contacts.ground.retain(|t| t.entity != fixture.entity);
        self.level.player.grounded = false;
        self.level.player.drain(damage);
        self.contacts.spike_collision = true;

        let tick = self.level.tick;
        self.level.push_event(GameEvent::spike_hit(tick, id, damage));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pickups
    // -------------------------------------------------------------------------

    fn touch_fountain(&mut self, id: EntityId, player_position: FixedVec2) -> Result<(), ContactError> {
        let fountain = self
            .level
            .fountains
            .get_mut(&id)
            .ok_or(ContactError::UnknownEntity(EntityRef::Fountain(id)))?;

        if !fountain.available {
            return Ok(());
        }
        if fountain.is_checkpoint() {
            self.touch_checkpoint(id, player_position);
            return Ok(());
        }

        fountain.collect();
        let ability = fountain.ability;
        let queued = self.abilities.add_ability(fountain).len();
        debug!("Fountain {} collected {:?} ({} queued)", id, ability, queued);

        let tick = self.level.tick;
        self.level.push_event(GameEvent::fountain_collected(tick, id, ability));
        self.level.push_event(GameEvent::cue(tick, Cue::Pickup));
        Ok(())
    }

    fn touch_checkpoint(&mut self, id: EntityId, player_position: FixedVec2) {
        if let Some(fountain) = self.level.fountains.get_mut(&id) {
            fountain.collect();
        }

        let restore = fixed_mul(self.config.checkpoint_restore_fraction, self.level.player.max_serenity);
        self.level.player.add_serenity(restore);

        let snapshot = CheckpointSnapshot::capture(id, player_position, self.level, self.abilities);
        info!("Checkpoint {} reached, snapshot {}", id, hex::encode(&snapshot.hash()[..4]));
        self.checkpoints.record(snapshot);
        self.contacts.checkpoint_pending = Some(id);

        let tick = self.level.tick;
        self.level.push_event(GameEvent::checkpoint_reached(tick, id));
        self.level.push_event(GameEvent::cue(tick, Cue::Checkpoint));
    }

    fn touch_shard(&mut self, id: EntityId) -> Result<(), ContactError> {
        let shard = self
            .level
            .shards
            .get_mut(&id)
            .ok_or(ContactError::UnknownEntity(EntityRef::Shard(id)))?;

        if !shard.collect() {
            return Ok(());
        }
        self.level.mark_shard_collected(id);

        let tick = self.level.tick;
        let collected = self.level.collected_shards.len() as u32;
        let total = self.level.shard_count();
        self.level.push_event(GameEvent::shard_collected(tick, id, collected, total));
        self.level.push_event(GameEvent::cue(tick, Cue::Shard));
        Ok(())
    }

    fn touch_goal(&mut self) {
        if self.level.all_shards_taken() {
            self.contacts.win_pending = true;
        } else {
            debug!(
                "Goal reached with {}/{} shards",
                self.level.collected_shards.len(),
                self.level.shard_count()
            );
        }
    }

    // -------------------------------------------------------------------------
    // Hazards
    // -------------------------------------------------------------------------

    fn touch_enemy(&mut self, id: EntityId) -> Result<(), ContactError> {
        if !self.level.enemies.contains_key(&id) {
            return Err(ContactError::UnknownEntity(EntityRef::Enemy(id)));
        }
        self.contacts.touching_enemies.insert(id);
        self.contacts.monster_collision = true;

        let tick = self.level.tick;
        self.level.push_event(GameEvent::enemy_contact(tick));
        Ok(())
    }

    fn rock_hits_player(&mut self, id: EntityId, rock_position: FixedVec2, player_position: FixedVec2) -> Result<(), ContactError> {
        let player = self.player_at(player_position);
        let rock = self
            .level
            .rocks
            .get_mut(&id)
            .ok_or(ContactError::UnknownEntity(EntityRef::Rock(id)))?;

        if !rock.disarm() {
            return Ok(());
        }
        let strike = rock.strike(&player, self.config);

        if let Some(strike) = strike {
            let damage = strike.amount();
            self.level.player.drain(damage);
            self.level.player.hurt = true;

            let tick = self.level.tick;
            self.level.push_event(GameEvent::rock_hit(tick, id, damage));
            self.level.push_event(GameEvent::cue(tick, Cue::Hurt));
        }

        self.rock_landed(id, rock_position);
        Ok(())
    }

    fn rock_hits_platform(&mut self, id: EntityId, rock_position: FixedVec2) -> Result<(), ContactError> {
        let rock = self
            .level
            .rocks
            .get_mut(&id)
            .ok_or(ContactError::UnknownEntity(EntityRef::Rock(id)))?;

        if rock.disarm() {
            self.rock_landed(id, rock_position);
        }
        Ok(())
    }

    /// Smoke puff plus deferred reset for a disarmed rock.
    fn rock_landed(&mut self, id: EntityId, position: FixedVec2) {
        let capacity = self.level.rocks.len();
        let Some(rock) = self.level.rocks.get(&id) else {
            return;
        };

        let puff = SmokePuff { rock: id, position, origin: rock.origin };
        let reset = WorldCommand::ResetRock { id, position: rock.origin, velocity: rock.origin_velocity };

        self.contacts.push_smoke(puff, capacity);
        self.contacts.defer(reset);
    }
}

impl ContactListener for ContactResolver<'_> {
    fn begin_contact(&mut self, contact: &Contact) {
        if let Err(err) = self.on_begin(contact) {
            warn!("Skipping begin_contact: {}", err);
        }
    }

    fn pre_solve(&mut self, contact: &mut Contact) {
        if let Err(err) = self.on_pre_solve(contact) {
            warn!("Skipping pre_solve: {}", err);
        }
    }

    fn end_contact(&mut self, contact: &Contact) {
        if let Err(err) = self.on_end(contact) {
            warn!("Skipping end_contact: {}", err);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
