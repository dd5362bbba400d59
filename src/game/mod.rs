//! Game Logic Module
//!
//! All gameplay simulation code. Deterministic given the same inputs and
//! physics contacts.
//!
//! ## Module Structure
//!
//! - `entity`: Level entities and their capability traits
//! - `level`: Level description records and gameplay tuning
//! - `state`: Player and level state
//! - `input`: Device sampling, intents, double-tap detection
//! - `ability`: Ability queue and the active-ability controller
//! - `physics`: Physics engine seam and a scripted stand-in engine
//! - `contact`: Contact callbacks turned into gameplay outcomes
//! - `checkpoint`: Checkpoint snapshots and respawn
//! - `save`: Save records and sinks
//! - `events`: Game events for audio, HUD and replay checks
//! - `tick`: Fixed-timestep level session

pub mod entity;
pub mod level;
pub mod state;
pub mod input;
pub mod ability;
pub mod physics;
pub mod contact;
pub mod checkpoint;
pub mod save;
pub mod events;
pub mod tick;

// Re-export key types
pub use ability::{AbilityController, AbilityQueue, FinishReason};
pub use checkpoint::{CheckpointManager, CheckpointSnapshot, RespawnOutcome};
pub use contact::{ContactError, ContactResolver, ContactState};
pub use entity::{Ability, EntityId};
pub use events::{Cue, GameEvent};
pub use input::{DeviceState, InputController, Intents};
pub use level::{GameConfig, LevelDescription, LevelError};
pub use physics::{ContactListener, PhysicsWorld, ScriptedWorld, WorldCommand};
pub use save::{LevelSave, SaveError, SaveSink};
pub use state::{GamePhase, LevelState, Player};
pub use tick::{FrameView, Session, TickResult};
