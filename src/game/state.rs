//! Level & Player State
//!
//! Everything a level session mutates. Entity collections are BTreeMaps so
//! iteration (and therefore hashing and respawn order) is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Deserialize};

use crate::core::fixed::{fixed_clamp, to_fixed, Fixed, FIXED_HALF};
use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::core::vec2::FixedVec2;
use crate::game::entity::{
    Enemy, EntityId, Fountain, MoonShard, Obstacle, ObstacleKind, Patrol, Rock, Signpost,
};
use crate::game::events::GameEvent;
use crate::game::level::{point_to_vec2, LevelDescription, LevelError};

// =============================================================================
// PLAYER
// =============================================================================

/// Horizontal facing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

/// Player character state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Body centre (mirrored from physics after each step)
    pub position: FixedVec2,
    /// Body velocity (mirrored from physics after each step)
    pub velocity: FixedVec2,
    /// Foot sensor touching valid ground
    pub grounded: bool,
    /// Transparency ability running
    pub transparent: bool,
    /// Dash burst fired this tick
    pub dashing: bool,
    /// Flight lift applied this tick
    pub flying: bool,
    /// Serenity resource, always in `[0, max_serenity]`
    pub serenity: Fixed,
    /// Serenity pool size
    pub max_serenity: Fixed,
    /// Took damage this tick
    pub hurt: bool,
    /// Last horizontal direction moved
    pub facing: Facing,
    /// Latch for edge-triggered depletion
    pub depleted: bool,
}

impl Player {
    /// Create a player at full serenity.
    pub fn new(position: FixedVec2, max_serenity: Fixed) -> Self {
        Self {
            position,
            velocity: FixedVec2::ZERO,
            grounded: false,
            transparent: false,
            dashing: false,
            flying: false,
            serenity: max_serenity,
            max_serenity,
            hurt: false,
            facing: Facing::Right,
            depleted: false,
        }
    }

    /// Set serenity, clamped to the pool.
    #[inline]
    pub fn set_serenity(&mut self, value: Fixed) {
        self.serenity = fixed_clamp(value, 0, self.max_serenity);
    }

    /// Add (or with a negative delta, remove) serenity.
    #[inline]
    pub fn add_serenity(&mut self, delta: Fixed) {
        self.set_serenity(self.serenity.saturating_add(delta));
    }

    /// Remove serenity.
    #[inline]
    pub fn drain(&mut self, amount: Fixed) {
        self.add_serenity(amount.saturating_neg());
    }

    /// Update the depletion latch. Returns true on the tick serenity first
    /// reaches zero.
    pub fn check_depleted(&mut self) -> bool {
        let now = self.serenity <= 0;
        let edge = now && !self.depleted;
        self.depleted = now;
        edge
    }

    /// Hash this player's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_bool(self.grounded);
        hasher.update_bool(self.transparent);
        hasher.update_bool(self.dashing);
        hasher.update_bool(self.flying);
        hasher.update_fixed(self.serenity);
        hasher.update_bool(self.hurt);
        hasher.update_u8(self.facing as u8);
    }
}

// =============================================================================
// GAME PHASE
// =============================================================================

/// Session phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Active gameplay
    #[default]
    Playing,
    /// Simulation frozen
    Paused,
    /// Goal reached with every shard
    Won,
    /// Failed with no checkpoint to return to
    Lost,
}

// =============================================================================
// LEVEL STATE
// =============================================================================

/// Goal sensor box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub position: FixedVec2,
    pub half_extents: FixedVec2,
}

/// Complete mutable state of one level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LevelState {
    /// Level name (save key)
    pub name: String,
    /// Level file path
    pub path: String,
    /// Ticks simulated while playing
    pub tick: u32,
    pub phase: GamePhase,
    pub player: Player,
    pub entrance: FixedVec2,
    pub goal: Goal,
    /// Respawn below this Y
    pub floor: Fixed,
    /// Minimum serenity for three, two and one stars
    pub star_thresholds: [Fixed; 3],
    /// Passive serenity loss per tick
    pub serenity_drain: Fixed,

    pub fountains: BTreeMap<EntityId, Fountain>,
    pub obstacles: BTreeMap<EntityId, Obstacle>,
    pub shards: BTreeMap<EntityId, MoonShard>,
    pub rocks: BTreeMap<EntityId, Rock>,
    pub enemies: BTreeMap<EntityId, Enemy>,
    pub signposts: BTreeMap<EntityId, Signpost>,

    /// Shards still in the world, in level order
    pub active_shards: Vec<EntityId>,
    /// Shards picked up, in pickup order
    pub collected_shards: Vec<EntityId>,

    /// Events generated this tick (cleared each tick)
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
}

fn insert_unique<T>(
    map: &mut BTreeMap<EntityId, T>,
    kind: &'static str,
    id: EntityId,
    value: T,
) -> Result<(), LevelError> {
    if map.insert(id, value).is_some() {
        return Err(LevelError::DuplicateId { kind, id });
    }
    Ok(())
}

impl LevelState {
    /// Build and validate a level from its description.
    pub fn from_description(desc: &LevelDescription) -> Result<Self, LevelError> {
        let constants = &desc.constants;
        if constants.max_serenity <= 0.0 {
            return Err(LevelError::InvalidConstants(format!(
                "max_serenity must be positive, got {}",
                constants.max_serenity
            )));
        }
        if constants.star_thresholds.windows(2).any(|w| w[0] < w[1]) {
            return Err(LevelError::InvalidConstants(
                "star thresholds must be non-increasing".to_string(),
            ));
        }

        let max_serenity = to_fixed(constants.max_serenity as f64);
        let entrance = point_to_vec2(desc.entrance);

        let mut fountains = BTreeMap::new();
        for f in &desc.fountains {
            insert_unique(&mut fountains, "fountain", f.id, Fountain::new(f.id, point_to_vec2(f.position), f.ability))?;
        }

        let mut obstacles = BTreeMap::new();
        for p in &desc.platforms {
            let half = point_to_vec2(p.size).scale(FIXED_HALF);
            if half.x <= 0 || half.y <= 0 {
                return Err(LevelError::EmptyPlatform(p.id));
            }
            let mut obstacle = Obstacle::new(p.id, p.kind, point_to_vec2(p.position), half);
            if let Some(velocity) = p.velocity {
                let patrol = p.bounds.map(|[min, max]| Patrol { min: point_to_vec2(min), max: point_to_vec2(max) });
                obstacle = obstacle.with_motion(point_to_vec2(velocity), patrol);
            }
            if let (ObstacleKind::Spiked, Some(direction)) = (p.kind, p.direction) {
                obstacle = obstacle.with_hazard_direction(point_to_vec2(direction));
            }
            insert_unique(&mut obstacles, "platform", p.id, obstacle)?;
        }

        let mut shards = BTreeMap::new();
        for s in &desc.shards {
            insert_unique(&mut shards, "shard", s.id, MoonShard::new(s.id, point_to_vec2(s.position)))?;
        }

        let mut rocks = BTreeMap::new();
        for r in &desc.rocks {
            insert_unique(&mut rocks, "rock", r.id, Rock::new(r.id, point_to_vec2(r.position), point_to_vec2(r.velocity)))?;
        }

        let mut enemies = BTreeMap::new();
        for e in &desc.enemies {
            insert_unique(&mut enemies, "enemy", e.id, Enemy { id: e.id, kind: e.kind, position: point_to_vec2(e.position) })?;
        }

        let mut signposts = BTreeMap::new();
        for s in &desc.signposts {
            let post = Signpost { id: s.id, position: point_to_vec2(s.position), text: s.text.clone(), showing: false };
            insert_unique(&mut signposts, "signpost", s.id, post)?;
        }

        let active_shards = shards.keys().copied().collect();

        Ok(Self {
            name: desc.name.clone(),
            path: desc.path.clone(),
            tick: 0,
            phase: GamePhase::Playing,
            player: Player::new(entrance, max_serenity),
            entrance,
            goal: Goal {
                position: point_to_vec2(desc.goal.position),
                half_extents: point_to_vec2(desc.goal.size).scale(FIXED_HALF),
            },
            floor: to_fixed(constants.floor as f64),
            star_thresholds: constants.star_thresholds.map(|t| to_fixed(t as f64)),
            serenity_drain: to_fixed(constants.serenity_drain_per_second as f64 / crate::TICK_RATE as f64),
            fountains,
            obstacles,
            shards,
            rocks,
            enemies,
            signposts,
            active_shards,
            collected_shards: Vec::new(),
            pending_events: Vec::new(),
        })
    }

    /// Total number of shards in the level.
    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    /// Whether every shard has been taken.
    pub fn all_shards_taken(&self) -> bool {
        self.active_shards.is_empty()
    }

    /// Move a shard from the active list to the collected list.
    pub fn mark_shard_collected(&mut self, id: EntityId) {
        self.active_shards.retain(|&s| s != id);
        if !self.collected_shards.contains(&id) {
            self.collected_shards.push(id);
        }
    }

    /// Put every shard back and re-take the listed ones (respawn path).
    ///
    /// Returns ids that do not exist in this level.
    pub fn restore_shards(&mut self, collected: &[EntityId]) -> Vec<EntityId> {
        let mut unknown = Vec::new();
        for shard in self.shards.values_mut() {
            shard.taken = false;
        }
        self.active_shards = self.shards.keys().copied().collect();
        self.collected_shards.clear();

        for &id in collected {
            match self.shards.get_mut(&id) {
                Some(shard) => {
                    shard.taken = true;
                    self.mark_shard_collected(id);
                }
                None => unknown.push(id),
            }
        }
        unknown
    }

    /// Ids of windows currently removed from the world.
    pub fn broken_windows(&self) -> BTreeSet<EntityId> {
        self.obstacles.values().filter(|o| o.broken).map(|o| o.id).collect()
    }

    /// Compute state hash for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, &self.name, |hasher| {
            hasher.update_u8(self.phase as u8);
            self.player.hash_into(hasher);

            for fountain in self.fountains.values() {
                hasher.update_u32(fountain.id);
                hasher.update_bool(fountain.available);
            }

            for obstacle in self.obstacles.values() {
                hasher.update_u32(obstacle.id);
                hasher.update_vec2(obstacle.position);
                hasher.update_vec2(obstacle.velocity);
                hasher.update_u8(obstacle.step_count);
                hasher.update_bool(obstacle.stood_on);
                hasher.update_bool(obstacle.broken);
            }

            for &id in &self.collected_shards {
                hasher.update_u32(id);
            }

            for rock in self.rocks.values() {
                hasher.update_u32(rock.id);
                hasher.update_vec2(rock.position);
                hasher.update_bool(rock.collide);
                hasher.update_u32(rock.elapsed_ticks);
            }
        })
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push an event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::Ability;
    use crate::game::level::{FountainRecord, PlatformRecord, ShardRecord};

    fn description() -> LevelDescription {
        let mut desc = LevelDescription::empty("test");
        desc.fountains.push(FountainRecord { id: 1, position: [2.0, 0.0], ability: Ability::Dash });
        desc.platforms.push(PlatformRecord {
            id: 10,
            kind: ObstacleKind::Window,
            position: [0.0, -1.0],
            size: [4.0, 0.5],
            direction: None,
            velocity: None,
            bounds: None,
        });
        desc.shards.push(ShardRecord { id: 20, position: [5.0, 1.0] });
        desc.shards.push(ShardRecord { id: 21, position: [6.0, 1.0] });
        desc
    }

    #[test]
    fn test_serenity_clamped() {
        let mut p = Player::new(FixedVec2::ZERO, to_fixed(100.0));
        p.add_serenity(to_fixed(50.0));
        assert_eq!(p.serenity, to_fixed(100.0));
        p.drain(to_fixed(130.0));
        assert_eq!(p.serenity, 0);
    }

    #[test]
    fn test_depletion_edge_triggered() {
        let mut p = Player::new(FixedVec2::ZERO, to_fixed(10.0));
        assert!(!p.check_depleted());
        p.drain(to_fixed(10.0));
        assert!(p.check_depleted());
        assert!(!p.check_depleted(), "stays at zero: no second trigger");
        p.add_serenity(to_fixed(1.0));
        assert!(!p.check_depleted());
        p.drain(to_fixed(5.0));
        assert!(p.check_depleted());
    }

    #[test]
    fn test_from_description() {
        let level = LevelState::from_description(&description()).unwrap();
        assert_eq!(level.phase, GamePhase::Playing);
        assert_eq!(level.player.serenity, to_fixed(100.0));
        assert_eq!(level.active_shards, vec![20, 21]);
        assert!(level.obstacles[&10].breakable);
        assert_eq!(level.obstacles[&10].half_extents, FixedVec2::new(to_fixed(2.0), to_fixed(0.25)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut desc = description();
        desc.shards.push(ShardRecord { id: 20, position: [0.0, 0.0] });
        assert_eq!(
            LevelState::from_description(&desc).unwrap_err(),
            LevelError::DuplicateId { kind: "shard", id: 20 }
        );
    }

    #[test]
    fn test_bad_constants_rejected() {
        let mut desc = description();
        desc.constants.max_serenity = 0.0;
        assert!(matches!(LevelState::from_description(&desc), Err(LevelError::InvalidConstants(_))));

        let mut desc = description();
        desc.constants.star_thresholds = [10.0, 40.0, 75.0];
        assert!(matches!(LevelState::from_description(&desc), Err(LevelError::InvalidConstants(_))));
    }

    #[test]
    fn test_shard_bookkeeping() {
        let mut level = LevelState::from_description(&description()).unwrap();
        level.mark_shard_collected(21);
        assert_eq!(level.active_shards, vec![20]);
        assert!(!level.all_shards_taken());
        level.mark_shard_collected(20);
        assert!(level.all_shards_taken());
        assert_eq!(level.collected_shards, vec![21, 20]);

        let unknown = level.restore_shards(&[20, 99]);
        assert_eq!(unknown, vec![99]);
        assert_eq!(level.active_shards, vec![21]);
        assert_eq!(level.collected_shards, vec![20]);
        assert!(level.shards[&20].taken && !level.shards[&21].taken);
    }

    #[test]
    fn test_hash_tracks_state() {
        let a = LevelState::from_description(&description()).unwrap();
        let mut b = a.clone();
        assert_eq!(a.compute_hash(), b.compute_hash());

        b.player.serenity -= 1;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
