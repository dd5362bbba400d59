//! Level Description & Tuning
//!
//! Typed records a level loader hands to the core, plus the gameplay
//! tuning constants. Positions in the records are plain floats (what a
//! level editor writes); they are converted to fixed-point once, when the
//! level state is built.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{to_fixed, Fixed};
use crate::core::vec2::FixedVec2;
use crate::game::entity::{Ability, EnemyKind, EntityId, ObstacleKind};

/// `[x, y]` in world units.
pub type Point = [f32; 2];

/// Convert an editor point to a fixed-point vector.
#[inline]
pub fn point_to_vec2(point: Point) -> FixedVec2 {
    FixedVec2::new(to_fixed(point[0] as f64), to_fixed(point[1] as f64))
}

// =============================================================================
// ERRORS
// =============================================================================

/// Level description rejected while building the level state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LevelError {
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: EntityId },

    #[error("invalid level constants: {0}")]
    InvalidConstants(String),

    #[error("platform {0} has a zero-sized body")]
    EmptyPlatform(EntityId),
}

// =============================================================================
// DESCRIPTION RECORDS
// =============================================================================

/// Fountain or checkpoint placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FountainRecord {
    pub id: EntityId,
    pub position: Point,
    pub ability: Ability,
}

/// Platform placement. Moving platforms carry a velocity and patrol box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub id: EntityId,
    pub kind: ObstacleKind,
    pub position: Point,
    /// Full width and height
    pub size: Point,
    /// Spiked face direction (defaults to up)
    #[serde(default)]
    pub direction: Option<Point>,
    /// Units per second
    #[serde(default)]
    pub velocity: Option<Point>,
    /// `[min, max]` corners of the patrol box
    #[serde(default)]
    pub bounds: Option<[Point; 2]>,
}

/// Falling rock spawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RockRecord {
    pub id: EntityId,
    pub position: Point,
    #[serde(default)]
    pub velocity: Point,
}

/// Enemy spawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyRecord {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub position: Point,
}

/// Moon shard placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub id: EntityId,
    pub position: Point,
}

/// Tutorial signpost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignpostRecord {
    pub id: EntityId,
    pub position: Point,
    pub text: String,
}

/// Goal sensor box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    pub position: Point,
    pub size: Point,
}

/// Per-level constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelConstants {
    /// Serenity pool size
    pub max_serenity: f32,
    /// Minimum serenity left for three, two and one stars
    pub star_thresholds: [f32; 3],
    /// Falling below this Y triggers a respawn
    pub floor: f32,
    /// Passive serenity loss per second
    #[serde(default)]
    pub serenity_drain_per_second: f32,
}

impl Default for LevelConstants {
    fn default() -> Self {
        Self {
            max_serenity: 100.0,
            star_thresholds: [75.0, 40.0, 10.0],
            floor: -20.0,
            serenity_drain_per_second: 0.0,
        }
    }
}

/// Everything the core needs to build a level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelDescription {
    /// Display and save key
    pub name: String,
    /// Level file path, echoed into the save record
    #[serde(default)]
    pub path: String,
    pub entrance: Point,
    pub goal: GoalRecord,
    #[serde(default)]
    pub fountains: Vec<FountainRecord>,
    #[serde(default)]
    pub platforms: Vec<PlatformRecord>,
    #[serde(default)]
    pub rocks: Vec<RockRecord>,
    #[serde(default)]
    pub enemies: Vec<EnemyRecord>,
    #[serde(default)]
    pub shards: Vec<ShardRecord>,
    #[serde(default)]
    pub signposts: Vec<SignpostRecord>,
    #[serde(default)]
    pub constants: LevelConstants,
}

impl LevelDescription {
    /// Empty level with a goal at the entrance. Used as a builder base.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("levels/{}.json", name),
            entrance: [0.0, 0.0],
            goal: GoalRecord { position: [0.0, 0.0], size: [1.0, 1.0] },
            fountains: Vec::new(),
            platforms: Vec::new(),
            rocks: Vec::new(),
            enemies: Vec::new(),
            shards: Vec::new(),
            signposts: Vec::new(),
            constants: LevelConstants::default(),
        }
    }
}

// =============================================================================
// GAME TUNING
// =============================================================================

/// Gameplay tuning shared by every level.
///
/// Fractions are Q16.16 and scale `max_serenity`; durations are
/// milliseconds and convert to ticks at the 60 Hz rate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub dash_duration_ms: u32,
    pub flight_duration_ms: u32,
    pub transparency_duration_ms: u32,

    /// Spike knockback impulse magnitude
    pub knockback_impulse: Fixed,
    /// Lump deduction per spike touch
    pub spike_damage_fraction: Fixed,
    /// Lump deduction per rock hit
    pub rock_damage_fraction: Fixed,
    /// Deduction per tick while touching any enemy
    pub enemy_drain_fraction: Fixed,
    /// Serenity restored by touching a checkpoint
    pub checkpoint_restore_fraction: Fixed,

    /// Hurt cue debounce shared by all enemies
    pub enemy_cue_cooldown_ms: u32,
    /// Rocks return to origin after this long
    pub rock_reset_ms: u32,

    pub double_tap_window_ms: u32,
    pub double_tap_cooldown_ms: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            dash_duration_ms: 3000,
            flight_duration_ms: 3000,
            transparency_duration_ms: 5000,
            knockback_impulse: to_fixed(8.0),
            spike_damage_fraction: to_fixed(0.2),
            rock_damage_fraction: to_fixed(0.1),
            enemy_drain_fraction: to_fixed(0.002),
            checkpoint_restore_fraction: to_fixed(0.25),
            enemy_cue_cooldown_ms: 400,
            rock_reset_ms: 4000,
            double_tap_window_ms: 500,
            double_tap_cooldown_ms: 1000,
        }
    }
}

impl GameConfig {
    /// Effect duration for a timed ability. Restore has none.
    pub fn duration_ms(&self, ability: Ability) -> u32 {
        match ability {
            Ability::Dash => self.dash_duration_ms,
            Ability::Flight => self.flight_duration_ms,
            Ability::Transparency => self.transparency_duration_ms,
            Ability::Restore => 0,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let config = GameConfig::default();
        assert_eq!(config.duration_ms(Ability::Dash), 3000);
        assert_eq!(config.duration_ms(Ability::Flight), 3000);
        assert_eq!(config.duration_ms(Ability::Transparency), 5000);
        assert_eq!(config.duration_ms(Ability::Restore), 0);
    }

    #[test]
    fn test_config_partial_override() {
        let config: GameConfig = serde_json::from_str(r#"{ "dash_duration_ms": 1500 }"#).unwrap();
        assert_eq!(config.dash_duration_ms, 1500);
        assert_eq!(config.rock_reset_ms, GameConfig::default().rock_reset_ms);
    }

    #[test]
    fn test_description_from_json() {
        let json = r#"{
            "name": "tutorial",
            "entrance": [1.0, 2.0],
            "goal": { "position": [30.0, 2.0], "size": [2.0, 2.0] },
            "fountains": [{ "id": 1, "position": [4.0, 1.0], "ability": "Dash" }],
            "platforms": [
                { "id": 10, "kind": "cloud", "position": [8.0, 0.0], "size": [4.0, 0.5],
                  "velocity": [1.0, 0.0], "bounds": [[6.0, 0.0], [10.0, 0.0]] }
            ],
            "shards": [{ "id": 20, "position": [12.0, 3.0] }]
        }"#;

        let desc: LevelDescription = serde_json::from_str(json).unwrap();
        assert_eq!(desc.name, "tutorial");
        assert_eq!(desc.fountains[0].ability, Ability::Dash);
        assert_eq!(desc.platforms[0].kind, ObstacleKind::Cloud);
        assert!(desc.platforms[0].direction.is_none());
        assert!(desc.rocks.is_empty());
        assert_eq!(desc.constants, LevelConstants::default());
    }

    #[test]
    fn test_point_conversion() {
        assert_eq!(point_to_vec2([1.5, -2.0]), FixedVec2::new(to_fixed(1.5), to_fixed(-2.0)));
    }
}
