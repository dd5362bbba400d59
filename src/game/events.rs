//! Game Events
//!
//! Everything observable that happens during a tick: gameplay outcomes
//! for logs and replays, and audio cues for the presentation layer.

use serde::{Serialize, Deserialize};

use crate::game::ability::FinishReason;
use crate::game::entity::{Ability, EntityId};
use crate::game::state::GamePhase;

/// Sound cue for the audio collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cue {
    Pickup,
    Checkpoint,
    Shard,
    Hurt,
    Win,
    StopMusic,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Play a sound cue
    Cue(Cue),

    /// Ability fountain collected and queued
    FountainCollected { fountain: EntityId, ability: Ability },

    /// Checkpoint touched and snapshot taken
    CheckpointReached { fountain: EntityId },

    /// Ability activation started
    AbilityStarted { fountain: EntityId, ability: Ability },

    /// Ability activation finalized
    AbilityFinished { fountain: EntityId, ability: Ability, reason: FinishReason },

    /// Moon shard picked up
    ShardCollected { shard: EntityId, collected: u32, total: u32 },

    /// Spiked face touched
    SpikeHit { obstacle: EntityId, damage: i32 },

    /// Rock hit the player
    RockHit { rock: EntityId, damage: i32 },

    /// Enemy contact registered (cue debounced)
    EnemyContact,

    /// New landing on a window
    WindowCracked { window: EntityId, steps: u8 },

    /// Window removed from the world
    WindowBroken { window: EntityId },

    /// Player sent back to a checkpoint
    Respawned { checkpoint: EntityId },

    /// Phase changed
    PhaseChanged { old_phase: GamePhase, new_phase: GamePhase },

    /// Level finished
    LevelCompleted { serenity_left: i32, stars: u8 },
}

/// A game event stamped with its tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Create sound cue event.
    pub fn cue(tick: u32, cue: Cue) -> Self {
        Self::new(tick, GameEventData::Cue(cue))
    }

    /// Create fountain collected event.
    pub fn fountain_collected(tick: u32, fountain: EntityId, ability: Ability) -> Self {
        Self::new(tick, GameEventData::FountainCollected { fountain, ability })
    }

    /// Create checkpoint reached event.
    pub fn checkpoint_reached(tick: u32, fountain: EntityId) -> Self {
        Self::new(tick, GameEventData::CheckpointReached { fountain })
    }

    /// Create ability started event.
    pub fn ability_started(tick: u32, fountain: EntityId, ability: Ability) -> Self {
        Self::new(tick, GameEventData::AbilityStarted { fountain, ability })
    }

    /// Create ability finished event.
    pub fn ability_finished(tick: u32, fountain: EntityId, ability: Ability, reason: FinishReason) -> Self {
        Self::new(tick, GameEventData::AbilityFinished { fountain, ability, reason })
    }

    /// Create shard collected event.
    pub fn shard_collected(tick: u32, shard: EntityId, collected: u32, total: u32) -> Self {
        Self::new(tick, GameEventData::ShardCollected { shard, collected, total })
    }

    /// Create spike hit event.
    pub fn spike_hit(tick: u32, obstacle: EntityId, damage: i32) -> Self {
        Self::new(tick, GameEventData::SpikeHit { obstacle, damage })
    }

    /// Create rock hit event.
    pub fn rock_hit(tick: u32, rock: EntityId, damage: i32) -> Self {
        Self::new(tick, GameEventData::RockHit { rock, damage })
    }

    /// Create enemy contact event.
    pub fn enemy_contact(tick: u32) -> Self {
        Self::new(tick, GameEventData::EnemyContact)
    }

    /// Create window cracked event.
    pub fn window_cracked(tick: u32, window: EntityId, steps: u8) -> Self {
        Self::new(tick, GameEventData::WindowCracked { window, steps })
    }

    /// Create window broken event.
    pub fn window_broken(tick: u32, window: EntityId) -> Self {
        Self::new(tick, GameEventData::WindowBroken { window })
    }

    /// Create respawned event.
    pub fn respawned(tick: u32, checkpoint: EntityId) -> Self {
        Self::new(tick, GameEventData::Respawned { checkpoint })
    }

    /// Create phase changed event.
    pub fn phase_changed(tick: u32, old_phase: GamePhase, new_phase: GamePhase) -> Self {
        Self::new(tick, GameEventData::PhaseChanged { old_phase, new_phase })
    }

    /// Create level completed event.
    pub fn level_completed(tick: u32, serenity_left: i32, stars: u8) -> Self {
        Self::new(tick, GameEventData::LevelCompleted { serenity_left, stars })
    }

    /// The cue carried by this event, if it is one.
    pub fn as_cue(&self) -> Option<Cue> {
        match self.data {
            GameEventData::Cue(cue) => Some(cue),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_compare_by_data() {
        assert_ne!(GameEvent::cue(5, Cue::Pickup), GameEvent::cue(5, Cue::Hurt));
        assert_ne!(GameEvent::respawned(5, 1), GameEvent::respawned(5, 2));
        assert_ne!(GameEvent::cue(5, Cue::Win), GameEvent::cue(6, Cue::Win));
        assert_eq!(
            GameEvent::shard_collected(3, 9, 1, 3),
            GameEvent::new(3, GameEventData::ShardCollected { shard: 9, collected: 1, total: 3 })
        );
    }

    #[test]
    fn test_as_cue() {
        assert_eq!(GameEvent::cue(1, Cue::Win).as_cue(), Some(Cue::Win));
        assert_eq!(GameEvent::rock_hit(1, 2, 10).as_cue(), None);
    }
}
