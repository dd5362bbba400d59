//! Checkpoints & Respawn
//!
//! Touching a checkpoint fountain captures a [`CheckpointSnapshot`] of
//! everything respawn has to put back. Depleting serenity or falling off
//! the level rewinds to the last snapshot; without one the level is lost.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::fixed::Fixed;
use crate::core::hash::{StateHash, StateHasher};
use crate::core::vec2::FixedVec2;
use crate::game::ability::AbilityController;
use crate::game::contact::ContactState;
use crate::game::entity::EntityId;
use crate::game::events::{Cue, GameEvent};
use crate::game::physics::{EntityRef, WorldCommand};
use crate::game::state::{GamePhase, LevelState};

// =============================================================================
// SNAPSHOT
// =============================================================================

/// State captured at the last checkpoint touch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// Checkpoint fountain
    pub fountain: EntityId,
    /// Player position at the touch
    pub position: FixedVec2,
    /// Serenity after the checkpoint restore
    pub serenity: Fixed,
    /// Queued abilities by fountain id, in dequeue order
    pub queue: Vec<EntityId>,
    /// Shards taken so far
    pub collected_shards: Vec<EntityId>,
    /// Non-zero window landing counters
    pub window_steps: BTreeMap<EntityId, u8>,
    /// Windows already removed
    pub broken_windows: BTreeSet<EntityId>,
}

impl CheckpointSnapshot {
    /// Capture the current level at checkpoint `fountain`.
    pub fn capture(
        fountain: EntityId,
        position: FixedVec2,
        level: &LevelState,
        abilities: &AbilityController,
    ) -> Self {
        let window_steps = level
            .obstacles
            .values()
            .filter(|o| o.breakable && o.step_count > 0)
            .map(|o| (o.id, o.step_count))
            .collect();

        Self {
            fountain,
            position,
            serenity: level.player.serenity,
            queue: abilities.queue().fountain_ids(),
            collected_shards: level.collected_shards.clone(),
            window_steps,
            broken_windows: level.broken_windows(),
        }
    }

    /// Fingerprint for logs and determinism checks.
    pub fn hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_snapshot();
        hasher.update_u32(self.fountain);
        hasher.update_vec2(self.position);
        hasher.update_fixed(self.serenity);
        hasher.update_u32(self.queue.len() as u32);
        for &id in &self.queue {
            hasher.update_u32(id);
        }
        hasher.update_u32(self.collected_shards.len() as u32);
        for &id in &self.collected_shards {
            hasher.update_u32(id);
        }
        for (&id, &steps) in &self.window_steps {
            hasher.update_u32(id);
            hasher.update_u8(steps);
        }
        for &id in &self.broken_windows {
            hasher.update_u32(id);
        }
        hasher.finalize()
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Holds the last snapshot and the checkpoint tally for the save record.
#[derive(Clone, Debug, Default)]
pub struct CheckpointManager {
    last: Option<CheckpointSnapshot>,
    visited: BTreeSet<EntityId>,
    passed: u32,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the snapshot.
    pub fn record(&mut self, snapshot: CheckpointSnapshot) {
        if self.visited.insert(snapshot.fountain) {
            self.passed += 1;
        }
        self.last = Some(snapshot);
    }

    /// Last snapshot, if any checkpoint was touched.
    pub fn last(&self) -> Option<&CheckpointSnapshot> {
        self.last.as_ref()
    }

    /// Distinct checkpoints touched.
    pub fn checkpoints_passed(&self) -> u32 {
        self.passed
    }

    /// Seed the tally from a save record.
    pub fn set_checkpoints_passed(&mut self, passed: u32) {
        self.passed = passed;
    }

    /// Forget everything (level reset).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// RESPAWN
// =============================================================================

/// Result of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RespawnOutcome {
    /// Rewound to this checkpoint
    Respawned { checkpoint: EntityId },
    /// No checkpoint: the level is lost
    Failed,
}

/// Rewind the level to the last checkpoint.
///
/// World mutations are queued on `contacts` for the caller to apply.
pub fn respawn(
    level: &mut LevelState,
    abilities: &mut AbilityController,
    contacts: &mut ContactState,
    manager: &CheckpointManager,
) -> RespawnOutcome {
    let tick = level.tick;
    level.player.hurt = true;
    level.push_event(GameEvent::cue(tick, Cue::Hurt));

    if let Some(snapshot) = manager.last() {
        level.player.set_serenity(snapshot.serenity);
    }
    for post in level.signposts.values_mut() {
        post.showing = false;
    }

    let Some(snapshot) = manager.last() else {
        info!("Level {} lost: no checkpoint", level.name);
        let old = level.phase;
        level.phase = GamePhase::Lost;
        level.push_event(GameEvent::phase_changed(tick, old, GamePhase::Lost));
        return RespawnOutcome::Failed;
    };

    // Abilities: everything back, then re-take the saved queue in order
    abilities.reset();
    for fountain in level.fountains.values_mut() {
        fountain.available = true;
    }
    for &id in &snapshot.queue {
        match level.fountains.get_mut(&id) {
            Some(fountain) if fountain.ability.is_timed() => {
                fountain.available = false;
                abilities.enqueue(id, fountain.ability);
            }
            _ => debug!("Snapshot queue entry {} not in level, skipped", id),
        }
    }
    if let Some(checkpoint) = level.fountains.get_mut(&snapshot.fountain) {
        checkpoint.available = false;
    }

    for id in level.restore_shards(&snapshot.collected_shards) {
        debug!("Snapshot shard {} not in level, skipped", id);
    }

    // Player
    let player = &mut level.player;
    player.position = snapshot.position;
    player.velocity = FixedVec2::ZERO;
    player.transparent = false;
    player.dashing = false;
    player.flying = false;
    player.depleted = false;
    contacts.defer(WorldCommand::TeleportPlayer(snapshot.position));

    // Windows
    for obstacle in level.obstacles.values_mut().filter(|o| o.breakable) {
        obstacle.step_count = snapshot.window_steps.get(&obstacle.id).copied().unwrap_or(0);
        obstacle.stood_on = false;

        let keep_broken = snapshot.broken_windows.contains(&obstacle.id);
        if obstacle.broken && !keep_broken {
            obstacle.broken = false;
            contacts.defer(WorldCommand::RestoreBody(EntityRef::Obstacle(obstacle.id)));
        } else if !obstacle.broken && keep_broken {
            obstacle.broken = true;
            contacts.defer(WorldCommand::RemoveBody(EntityRef::Obstacle(obstacle.id)));
        }
    }

    // Rocks
    for rock in level.rocks.values_mut() {
        rock.reset();
        contacts.defer(WorldCommand::ResetRock { id: rock.id, position: rock.origin, velocity: rock.origin_velocity });
    }

    contacts.clear_latches(&mut level.player);

    info!("Respawned at checkpoint {}", snapshot.fountain);
    level.push_event(GameEvent::respawned(tick, snapshot.fountain));
    RespawnOutcome::Respawned { checkpoint: snapshot.fountain }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;
    use crate::game::entity::{Ability, ObstacleKind};
    use crate::game::level::{FountainRecord, LevelDescription, PlatformRecord, RockRecord, ShardRecord, SignpostRecord};

    fn level() -> LevelState {
        let mut desc = LevelDescription::empty("respawn");
        desc.fountains = vec![
            FountainRecord { id: 1, position: [1.0, 0.0], ability: Ability::Dash },
            FountainRecord { id: 2, position: [2.0, 0.0], ability: Ability::Flight },
            FountainRecord { id: 3, position: [3.0, 0.0], ability: Ability::Transparency },
            FountainRecord { id: 9, position: [9.0, 0.0], ability: Ability::Restore },
        ];
        desc.platforms = vec![
            PlatformRecord { id: 50, kind: ObstacleKind::Window, position: [5.0, 0.0], size: [2.0, 0.5], direction: None, velocity: None, bounds: None },
            PlatformRecord { id: 51, kind: ObstacleKind::Window, position: [6.0, 0.0], size: [2.0, 0.5], direction: None, velocity: None, bounds: None },
            PlatformRecord { id: 52, kind: ObstacleKind::Window, position: [7.0, 0.0], size: [2.0, 0.5], direction: None, velocity: None, bounds: None },
        ];
        desc.shards = vec![ShardRecord { id: 20, position: [0.0, 0.0] }, ShardRecord { id: 21, position: [0.0, 0.0] }];
        desc.rocks = vec![RockRecord { id: 30, position: [4.0, 8.0], velocity: [0.0, 0.0] }];
        desc.signposts = vec![SignpostRecord { id: 40, position: [0.0, 0.0], text: "hi".into() }];
        LevelState::from_description(&desc).unwrap()
    }

    /// Dash and Flight queued, shard 20 taken, window 50 at two landings,
    /// window 51 broken, then the checkpoint at (9, 1) with serenity 60.
    fn checkpointed() -> (LevelState, AbilityController, ContactState, CheckpointManager) {
        let mut level = level();
        let mut abilities = AbilityController::new();
        let mut manager = CheckpointManager::new();

        for id in [1, 2] {
            let fountain = level.fountains.get_mut(&id).unwrap();
            fountain.available = false;
            abilities.add_ability(fountain);
        }
        level.shards.get_mut(&20).unwrap().taken = true;
        level.mark_shard_collected(20);
        level.obstacles.get_mut(&50).unwrap().step_count = 2;
        level.obstacles.get_mut(&51).unwrap().broken = true;
        level.fountains.get_mut(&9).unwrap().available = false;
        level.player.set_serenity(to_fixed(60.0));

        manager.record(CheckpointSnapshot::capture(9, FixedVec2::from_ints(9, 1), &level, &abilities));
        (level, abilities, ContactState::new(), manager)
    }

    #[test]
    fn test_capture() {
        let (_, _, _, manager) = checkpointed();
        let snap = manager.last().unwrap();
        assert_eq!(snap.queue, vec![1, 2]);
        assert_eq!(snap.collected_shards, vec![20]);
        assert_eq!(snap.window_steps, BTreeMap::from([(50, 2)]));
        assert_eq!(snap.broken_windows, BTreeSet::from([51]));
        assert_eq!(snap.serenity, to_fixed(60.0));
        assert_eq!(manager.checkpoints_passed(), 1);
        assert_eq!(snap.hash(), snap.clone().hash());
        let mut other = snap.clone();
        other.serenity -= 1;
        assert_ne!(snap.hash(), other.hash());
    }

    #[test]
    fn test_respawn_restores_snapshot() {
        let (mut level, mut abilities, mut contacts, manager) = checkpointed();

        // Progress after the checkpoint that must be undone
        abilities.use_ability(3000);
        let third = level.fountains.get_mut(&3).unwrap();
        third.available = false;
        abilities.add_ability(third);
        level.shards.get_mut(&21).unwrap().taken = true;
        level.mark_shard_collected(21);
        level.obstacles.get_mut(&50).unwrap().broken = true;
        level.obstacles.get_mut(&52).unwrap().step_count = 1;
        level.rocks.get_mut(&30).unwrap().collide = false;
        level.signposts.get_mut(&40).unwrap().showing = true;
        level.player.transparent = true;
        level.player.set_serenity(0);
        level.player.position = FixedVec2::from_ints(50, -30);

        let outcome = respawn(&mut level, &mut abilities, &mut contacts, &manager);
        assert_eq!(outcome, RespawnOutcome::Respawned { checkpoint: 9 });

        assert_eq!(level.player.serenity, to_fixed(60.0));
        assert_eq!(level.player.position, FixedVec2::from_ints(9, 1));
        assert_eq!(level.player.velocity, FixedVec2::ZERO);
        assert!(!level.player.transparent && level.player.hurt);

        assert!(!abilities.is_using_ability());
        assert_eq!(abilities.queue().fountain_ids(), vec![1, 2]);
        assert!(!level.fountains[&1].available && !level.fountains[&2].available);
        assert!(level.fountains[&3].available, "collected after the checkpoint");
        assert!(!level.fountains[&9].available);

        assert_eq!(level.collected_shards, vec![20]);
        assert!(!level.shards[&21].taken);

        assert_eq!(level.obstacles[&50].step_count, 2);
        assert!(!level.obstacles[&50].broken, "broken after the snapshot: restored");
        assert!(level.obstacles[&51].broken, "broken before: stays broken");
        assert_eq!(level.obstacles[&52].step_count, 0);

        assert!(level.rocks[&30].collide);
        assert!(!level.signposts[&40].showing);

        let commands = contacts.take_commands();
        assert!(commands.contains(&WorldCommand::TeleportPlayer(FixedVec2::from_ints(9, 1))));
        assert!(commands.contains(&WorldCommand::RestoreBody(EntityRef::Obstacle(50))));
        assert!(!commands.contains(&WorldCommand::RestoreBody(EntityRef::Obstacle(51))));

        let events = level.take_events();
        assert!(events.iter().any(|e| e.as_cue() == Some(Cue::Hurt)));
    }

    #[test]
    fn test_respawn_without_checkpoint_is_lost() {
        let mut level = level();
        let mut abilities = AbilityController::new();
        let mut contacts = ContactState::new();
        level.player.set_serenity(0);

        let outcome = respawn(&mut level, &mut abilities, &mut contacts, &CheckpointManager::new());
        assert_eq!(outcome, RespawnOutcome::Failed);
        assert_eq!(level.phase, GamePhase::Lost);
        assert!(contacts.take_commands().is_empty());
    }

    #[test]
    fn test_stale_snapshot_ids_skipped() {
        let (mut level, mut abilities, mut contacts, mut manager) = checkpointed();
        let mut snap = manager.last().unwrap().clone();
        snap.queue.push(777);
        snap.collected_shards.push(888);
        manager.record(snap);

        respawn(&mut level, &mut abilities, &mut contacts, &manager);
        assert_eq!(abilities.queue().fountain_ids(), vec![1, 2]);
        assert_eq!(level.collected_shards, vec![20]);
    }

    #[test]
    fn test_manager_tally() {
        let (level, abilities, _, mut manager) = checkpointed();
        manager.record(CheckpointSnapshot::capture(9, FixedVec2::ZERO, &level, &abilities));
        assert_eq!(manager.checkpoints_passed(), 1, "same checkpoint twice");
        manager.record(CheckpointSnapshot::capture(10, FixedVec2::ZERO, &level, &abilities));
        assert_eq!(manager.checkpoints_passed(), 2);
        assert_eq!(manager.last().unwrap().fountain, 10);

        manager.clear();
        assert!(manager.last().is_none());
        assert_eq!(manager.checkpoints_passed(), 0);
    }
}
