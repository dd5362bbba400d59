//! # Serenity Gameplay Core
//!
//! Deterministic collision and ability resolution for the Serenity 2D
//! platformer. The physics engine is a black box behind [`PhysicsWorld`];
//! this crate decides what its contacts mean.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SERENITY CORE                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Gameplay (deterministic)                  │
//! │  ├── entity.rs   - Fountains, platforms, hazards, shards     │
//! │  ├── level.rs    - Level records and tuning                  │
//! │  ├── state.rs    - Player and level state                    │
//! │  ├── input.rs    - Intents and double-tap detection          │
//! │  ├── ability.rs  - Ability queue and controller              │
//! │  ├── physics.rs  - Engine seam, scripted engine              │
//! │  ├── contact.rs  - Contact callbacks                         │
//! │  ├── checkpoint.rs - Snapshots and respawn                   │
//! │  ├── save.rs     - Save records and sinks                    │
//! │  ├── events.rs   - Cues and gameplay events                  │
//! │  └── tick.rs     - Fixed-timestep session                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - No floating-point arithmetic in gameplay logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies (save timestamps live in the sink path)
//! - All timers are tick counts
//!
//! Given identical inputs and contact callbacks, a session produces
//! **identical state hashes** on any platform.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use game::physics::PhysicsWorld;
pub use game::tick::{Session, TickResult};
pub use game::state::{GamePhase, LevelState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
