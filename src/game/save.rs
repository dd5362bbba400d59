//! Save Records
//!
//! The core hands a [`LevelSave`] to a [`SaveSink`] on checkpoint touches
//! and on level completion. The sink owns the storage format; two are
//! provided: in-memory (tests, demo) and one JSON file per level.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::fixed::Fixed;
use crate::game::entity::EntityId;

/// Errors from save sinks and the queue codec.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("save I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("save record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ability queue encoding failed: {0}")]
    Queue(String),

    #[error("ability queue is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

// =============================================================================
// RECORD
// =============================================================================

/// Persisted progress for one level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSave {
    /// Level name (save key)
    pub name: String,
    pub completed: bool,
    pub unlocked: bool,
    pub checkpoints_passed: u32,
    /// Whole serenity units left
    pub serenity_left: i32,
    /// Level file path
    pub path: String,
    /// Queued fountain ids, bincode then hex
    pub ability_queue: String,
    /// Best star rating so far
    pub num_stars: u8,
    /// When the record was written
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl LevelSave {
    /// Fresh record for an unlocked, unfinished level.
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            completed: false,
            unlocked: true,
            checkpoints_passed: 0,
            serenity_left: 0,
            path: path.to_string(),
            ability_queue: String::new(),
            num_stars: 0,
            saved_at: None,
        }
    }

    /// Keep completion and the best star rating from an earlier record.
    pub fn merged_with(mut self, previous: Option<&LevelSave>) -> Self {
        if let Some(prev) = previous {
            self.completed |= prev.completed;
            self.unlocked |= prev.unlocked;
            self.num_stars = self.num_stars.max(prev.num_stars);
        }
        self
    }

    /// Stamp with the current wall-clock time.
    pub fn stamped(mut self) -> Self {
        self.saved_at = Some(Utc::now());
        self
    }

    /// Decode the queued fountain ids.
    pub fn queue(&self) -> Result<Vec<EntityId>, SaveError> {
        decode_queue(&self.ability_queue)
    }
}

/// Stars earned for finishing with `serenity` left.
///
/// `thresholds` are the minimum serenity for three, two and one stars.
pub fn star_rating(serenity: Fixed, thresholds: &[Fixed; 3]) -> u8 {
    thresholds
        .iter()
        .position(|&t| serenity >= t)
        .map_or(0, |i| 3 - i as u8)
}

/// Encode queued fountain ids for the save record.
pub fn encode_queue(ids: &[EntityId]) -> Result<String, SaveError> {
    if ids.is_empty() {
        return Ok(String::new());
    }
    let bytes = bincode::serialize(ids).map_err(|e| SaveError::Queue(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Decode queued fountain ids from a save record.
pub fn decode_queue(encoded: &str) -> Result<Vec<EntityId>, SaveError> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    let bytes = hex::decode(encoded)?;
    bincode::deserialize(&bytes).map_err(|e| SaveError::Queue(e.to_string()))
}

// =============================================================================
// SINKS
// =============================================================================

/// Where level progress is persisted.
pub trait SaveSink {
    /// Stored record for `level`, if any.
    fn load(&self, level: &str) -> Result<Option<LevelSave>, SaveError>;

    /// Store (replace) the record for `save.name`.
    fn store(&mut self, save: LevelSave) -> Result<(), SaveError>;
}

/// Keeps records in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySaveSink {
    saves: BTreeMap<String, LevelSave>,
    writes: u32,
}

impl MemorySaveSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `store` calls so far.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Stored record, if any.
    pub fn get(&self, level: &str) -> Option<&LevelSave> {
        self.saves.get(level)
    }
}

impl SaveSink for MemorySaveSink {
    fn load(&self, level: &str) -> Result<Option<LevelSave>, SaveError> {
        Ok(self.saves.get(level).cloned())
    }

    fn store(&mut self, save: LevelSave) -> Result<(), SaveError> {
        self.writes += 1;
        self.saves.insert(save.name.clone(), save);
        Ok(())
    }
}

/// One pretty-printed JSON file per level under a directory.
#[derive(Clone, Debug)]
pub struct JsonFileSaveSink {
    dir: PathBuf,
}

impl JsonFileSaveSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn file_for(&self, level: &str) -> PathBuf {
        let stem: String = level
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", stem))
    }
}

impl SaveSink for JsonFileSaveSink {
    fn load(&self, level: &str) -> Result<Option<LevelSave>, SaveError> {
        let path = self.file_for(level);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn store(&mut self, save: LevelSave) -> Result<(), SaveError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(&save.name);
        fs::write(&path, serde_json::to_string_pretty(&save)?)?;
        debug!("Saved {} to {}", save.name, path.display());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
