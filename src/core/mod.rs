//! Core deterministic primitives.
//!
//! Fixed-point scalars and vectors plus state hashing. Everything the
//! gameplay modules compute goes through these types so a session replays
//! identically on any platform.

pub mod fixed;
pub mod vec2;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use vec2::FixedVec2;
pub use hash::{compute_state_hash, StateHash, StateHasher};
