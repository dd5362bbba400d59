//! World Entities
//!
//! Flat data records for everything the player can touch, plus the small
//! capability traits the contact resolver dispatches on. Platform variants
//! are a single [`Obstacle`] record with a `kind` tag and behaviour flags
//! rather than a type hierarchy.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, fixed_mul, FIXED_ONE};
use crate::core::vec2::FixedVec2;
use crate::game::level::GameConfig;
use crate::game::state::Player;

/// Stable identifier of a level entity (from the level description).
pub type EntityId = u32;

/// Number of distinct landings that break a window.
pub const WINDOW_BREAK_STEPS: u8 = 3;

// =============================================================================
// ABILITY
// =============================================================================

/// Ability granted by a fountain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Ability {
    /// Horizontal burst on a double-tapped direction
    Dash = 0,
    /// Upward lift on a double-tapped or held jump
    Flight = 1,
    /// Pass through hazards, stand on clouds
    Transparency = 2,
    /// Checkpoint marker. Never queued, never timed.
    Restore = 3,
}

impl Ability {
    /// Whether this ability can sit in the queue and run on a timer.
    #[inline]
    pub fn is_timed(self) -> bool {
        !matches!(self, Ability::Restore)
    }

    /// Get ability from index.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Ability::Dash),
            1 => Some(Ability::Flight),
            2 => Some(Ability::Transparency),
            3 => Some(Ability::Restore),
            _ => None,
        }
    }
}

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Something the player's foot sensor can stand on.
pub trait Groundable {
    /// Whether touching this with the foot sensor grounds the player right now.
    fn grounds(&self, player: &Player) -> bool;
}

/// Platform whose physical contact depends on the player's approach and abilities.
pub trait OneWayPlatform {
    /// Whether the contact should produce a collision response.
    fn allows_contact(&self, player: &Player) -> bool;
}

/// How a hazard takes serenity away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Damage {
    /// One deduction per discrete touch
    Lump(Fixed),
    /// Deducted every tick while touching
    Drain(Fixed),
}

/// Outcome of a hazard touching the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Strike {
    /// Serenity to remove (absolute amount, not a fraction)
    pub damage: Damage,
    /// Unit launch direction, if the hazard knocks the player back
    pub knockback: Option<FixedVec2>,
}

impl Strike {
    /// Serenity removed, whichever way it is applied.
    #[inline]
    pub fn amount(&self) -> Fixed {
        match self.damage {
            Damage::Lump(amount) | Damage::Drain(amount) => amount,
        }
    }
}

/// Something that hurts the player on contact.
pub trait Hazard {
    /// Evaluate a touch. `None` means the touch is harmless.
    fn strike(&self, player: &Player, config: &GameConfig) -> Option<Strike>;
}

/// Something the player picks up exactly once.
pub trait Collectible {
    /// Take the item. Returns false if it was already taken.
    fn collect(&mut self) -> bool;
}

// =============================================================================
// FOUNTAIN
// =============================================================================

/// Ability fountain or checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fountain {
    /// Stable id (referenced by save data and snapshots)
    pub id: EntityId,
    /// World position
    pub position: FixedVec2,
    /// Ability granted (Restore for checkpoints)
    pub ability: Ability,
    /// Can currently be collected
    pub available: bool,
}

impl Fountain {
    /// Create an available fountain.
    pub fn new(id: EntityId, position: FixedVec2, ability: Ability) -> Self {
        Self { id, position, ability, available: true }
    }

    /// Whether this fountain is a checkpoint.
    #[inline]
    pub fn is_checkpoint(&self) -> bool {
        self.ability == Ability::Restore
    }
}

impl Collectible for Fountain {
    fn collect(&mut self) -> bool {
        if !self.available {
            return false;
        }
        self.available = false;
        true
    }
}

// =============================================================================
// OBSTACLE (platforms of every kind)
// =============================================================================

/// Platform variant tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    /// Plain solid ground
    Solid,
    /// One-way platform usable only while transparent
    Cloud,
    /// Solid platform with a spiked face
    Spiked,
    /// Breakable platform
    Window,
}

/// Patrol rectangle for moving platforms. Velocity components flip when
/// the centre leaves the rectangle on that axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patrol {
    /// Lower-left corner
    pub min: FixedVec2,
    /// Upper-right corner
    pub max: FixedVec2,
}

/// Any platform in the level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Stable id
    pub id: EntityId,
    /// Variant tag
    pub kind: ObstacleKind,
    /// Centre position
    pub position: FixedVec2,
    /// Half width / half height
    pub half_extents: FixedVec2,
    /// Per-second velocity (moving platforms)
    pub velocity: FixedVec2,
    /// Patrol bounds (moving platforms)
    pub patrol: Option<Patrol>,
    /// Stand-on-top-only semantics
    pub one_way: bool,
    /// Breaks after repeated landings
    pub breakable: bool,
    /// Unit direction of the spiked face / launch direction
    pub hazard_direction: Option<FixedVec2>,
    /// Distinct landings so far (windows)
    pub step_count: u8,
    /// Foot sensor currently on this window
    pub stood_on: bool,
    /// Removed from the world
    pub broken: bool,
}

impl Obstacle {
    /// Create a static obstacle, deriving behaviour flags from its kind.
    pub fn new(id: EntityId, kind: ObstacleKind, position: FixedVec2, half_extents: FixedVec2) -> Self {
        Self {
            id,
            kind,
            position,
            half_extents,
            velocity: FixedVec2::ZERO,
            patrol: None,
            one_way: kind == ObstacleKind::Cloud,
            breakable: kind == ObstacleKind::Window,
            hazard_direction: (kind == ObstacleKind::Spiked).then_some(FixedVec2::UP),
            step_count: 0,
            stood_on: false,
            broken: false,
        }
    }

    /// Make this a moving platform.
    pub fn with_motion(mut self, velocity: FixedVec2, patrol: Option<Patrol>) -> Self {
        self.velocity = velocity;
        self.patrol = patrol;
        self
    }

    /// Override the spiked face direction (normalized).
    pub fn with_hazard_direction(mut self, direction: FixedVec2) -> Self {
        self.hazard_direction = Some(direction.normalize());
        self
    }

    /// Y coordinate of the top edge.
    #[inline]
    pub fn top(&self) -> Fixed {
        self.position.y.wrapping_add(self.half_extents.y)
    }

    /// Whether `x` lies within the horizontal span.
    #[inline]
    pub fn spans_x(&self, x: Fixed) -> bool {
        x >= self.position.x.wrapping_sub(self.half_extents.x)
            && x <= self.position.x.wrapping_add(self.half_extents.x)
    }

    /// Whether this platform moves.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.velocity != FixedVec2::ZERO
    }

    /// Advance a moving platform by one tick of `dt`.
    ///
    /// Returns the displacement applied this tick.
    pub fn advance(&mut self, dt: Fixed) -> FixedVec2 {
        if !self.is_moving() {
            return FixedVec2::ZERO;
        }

        if let Some(patrol) = self.patrol {
            if (self.position.x <= patrol.min.x && self.velocity.x < 0)
                || (self.position.x >= patrol.max.x && self.velocity.x > 0)
            {
                self.velocity.x = -self.velocity.x;
            }
            if (self.position.y <= patrol.min.y && self.velocity.y < 0)
                || (self.position.y >= patrol.max.y && self.velocity.y > 0)
            {
                self.velocity.y = -self.velocity.y;
            }
        }

        let displacement = self.velocity.scale(dt);
        self.position = self.position + displacement;
        displacement
    }

    /// Register a new landing on a window.
    ///
    /// Counts only when the foot sensor was not already on it. Returns true
    /// when this landing reaches the break threshold.
    pub fn register_landing(&mut self) -> bool {
        if !self.breakable || self.broken || self.stood_on {
            return false;
        }
        self.stood_on = true;
        self.step_count = self.step_count.saturating_add(1);
        self.step_count == WINDOW_BREAK_STEPS
    }
}

impl OneWayPlatform for Obstacle {
    fn allows_contact(&self, player: &Player) -> bool {
        if !self.one_way {
            return true;
        }
        player.transparent
            && player.position.y > self.top()
            && self.spans_x(player.position.x)
    }
}

impl Groundable for Obstacle {
    fn grounds(&self, player: &Player) -> bool {
        !self.broken && self.allows_contact(player)
    }
}

impl Hazard for Obstacle {
    fn strike(&self, player: &Player, config: &GameConfig) -> Option<Strike> {
        let direction = self.hazard_direction?;
        if player.transparent {
            return None;
        }

        // Only the spiked face hurts
        let approach = player.position - self.position;
        if approach.dot(direction) <= 0 {
            return None;
        }

        Some(Strike {
            damage: Damage::Lump(fixed_mul(config.spike_damage_fraction, player.max_serenity)),
            knockback: Some(direction),
        })
    }
}

// =============================================================================
// MOON SHARD
// =============================================================================

/// Collectible required for the win condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoonShard {
    /// Stable id
    pub id: EntityId,
    /// World position
    pub position: FixedVec2,
    /// Already picked up
    pub taken: bool,
}

impl MoonShard {
    /// Create an untaken shard.
    pub fn new(id: EntityId, position: FixedVec2) -> Self {
        Self { id, position, taken: false }
    }
}

impl Collectible for MoonShard {
    fn collect(&mut self) -> bool {
        if self.taken {
            return false;
        }
        self.taken = true;
        true
    }
}

// =============================================================================
// ROCK
// =============================================================================

/// Falling rock hazard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rock {
    /// Stable id
    pub id: EntityId,
    /// Spawn position
    pub origin: FixedVec2,
    /// Spawn velocity
    pub origin_velocity: FixedVec2,
    /// Last known position (synced from the physics body)
    pub position: FixedVec2,
    /// Last known velocity
    pub velocity: FixedVec2,
    /// Armed: the next touch counts
    pub collide: bool,
    /// Ticks since the last reset
    pub elapsed_ticks: u32,
}

impl Rock {
    /// Create an armed rock at its origin.
    pub fn new(id: EntityId, origin: FixedVec2, origin_velocity: FixedVec2) -> Self {
        Self {
            id,
            origin,
            origin_velocity,
            position: origin,
            velocity: origin_velocity,
            collide: true,
            elapsed_ticks: 0,
        }
    }

    /// Consume the debounce flag. Returns true if the rock was armed.
    #[inline]
    pub fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.collide, false)
    }

    /// Return to origin and re-arm.
    pub fn reset(&mut self) {
        self.position = self.origin;
        self.velocity = self.origin_velocity;
        self.collide = true;
        self.elapsed_ticks = 0;
    }
}

impl Hazard for Rock {
    fn strike(&self, player: &Player, config: &GameConfig) -> Option<Strike> {
        if player.transparent {
            return None;
        }
        Some(Strike {
            damage: Damage::Lump(fixed_mul(config.rock_damage_fraction, player.max_serenity)),
            knockback: None,
        })
    }
}

// =============================================================================
// ENEMY
// =============================================================================

/// Enemy variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    /// Walks along platforms
    Ground,
    /// Floats freely
    Flying,
}

/// Enemy hazard. Movement is driven outside the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Stable id
    pub id: EntityId,
    /// Variant
    pub kind: EnemyKind,
    /// World position
    pub position: FixedVec2,
}

impl Hazard for Enemy {
    fn strike(&self, player: &Player, config: &GameConfig) -> Option<Strike> {
        // Enemies grind serenity down while touching, transparency or not
        Some(Strike {
            damage: Damage::Drain(fixed_mul(config.enemy_drain_fraction, player.max_serenity)),
            knockback: None,
        })
    }
}

// =============================================================================
// SIGNPOST
// =============================================================================

/// Tutorial signpost shown while the player stands near it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signpost {
    /// Stable id
    pub id: EntityId,
    /// World position
    pub position: FixedVec2,
    /// Text shown by the presentation layer
    pub text: String,
    /// Currently visible
    pub showing: bool,
}

impl Signpost {
    /// Proximity half-extent on both axes.
    pub const RANGE: Fixed = FIXED_ONE;

    /// Recompute visibility from the player position.
    pub fn update_visibility(&mut self, player_position: FixedVec2) {
        self.showing = self.position.within_box(player_position, Self::RANGE);
    }
}

// =============================================================================
// TESTS
// =============================================================================
