// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Persists TrainableState snapshots keyed by (level, epoch).
//
// File naming convention:
//   models/
//     pynet_level_5_epoch_0.bin.gz    ← bincode, gzip-compressed
//     pynet_level_5_epoch_1.bin.gz
//     ...
//     train_config_level_5.json       ← run parameters
//
// A level-L run may warm-start from the last checkpoint of level
// L+1. Absent or undecodable files are ResourceUnavailable; the
// caller decides whether that is fatal.
//
// Reference: Rust Book §9 (Error Handling)

use std::{
    fs,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;
use crate::domain::state::TrainableState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointKey {
    pub level: Level,
    pub epoch: usize,
}

impl CheckpointKey {
    pub fn new(level: Level, epoch: usize) -> Self {
        Self { level, epoch }
    }

    pub fn file_name(&self) -> String {
        format!("pynet_level_{}_epoch_{}.bin.gz", self.level, self.epoch)
    }

    /// The checkpoint a level-`level` run starts from, if any.
    pub fn warm_start(level: Level, restore_epoch: usize) -> Option<Self> {
        level.coarser().map(|coarser| Self::new(coarser, restore_epoch))
    }
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> TrainResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| TrainError::io(format!("creating '{}'", dir.display()), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: CheckpointKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn save(&self, key: CheckpointKey, state: &TrainableState) -> TrainResult<PathBuf> {
        let path = self.path_for(key);
        write_state(&path, state)?;
        tracing::debug!(
            "Saved checkpoint '{}' ({} tensors, {} values)",
            path.display(),
            state.len(),
            state.numel()
        );
        Ok(path)
    }

    pub fn load(&self, key: CheckpointKey) -> TrainResult<TrainableState> {
        let path = self.path_for(key);
        let state = read_state(&path)?;
        tracing::info!("Loaded checkpoint '{}'", path.display());
        Ok(state)
    }

    /// Save the run parameters next to the checkpoints.
    pub fn save_config<C: Serialize>(&self, level: Level, cfg: &C) -> TrainResult<PathBuf> {
        let path = self.config_path(level);
        let json = serde_json::to_string_pretty(cfg)
            .map_err(|e| TrainError::io("serialising run config", e.into()))?;
        fs::write(&path, json)
            .map_err(|e| TrainError::io(format!("writing '{}'", path.display()), e))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(path)
    }

    pub fn load_config<C: DeserializeOwned>(&self, level: Level) -> TrainResult<C> {
        let path = self.config_path(level);
        let json = fs::read_to_string(&path).map_err(|e| TrainError::unavailable(&path, e))?;
        serde_json::from_str(&json).map_err(|e| TrainError::unavailable(&path, e))
    }

    fn config_path(&self, level: Level) -> PathBuf {
        self.dir.join(format!("train_config_level_{level}.json"))
    }
}

/// Gzip + bincode encode a state to `path`.
pub fn write_state(path: &Path, state: &TrainableState) -> TrainResult<()> {
    let action = || format!("writing checkpoint '{}'", path.display());
    let file = fs::File::create(path).map_err(|e| TrainError::io(action(), e))?;

    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    bincode::serialize_into(&mut encoder, state)
        .map_err(|e| TrainError::io(action(), std::io::Error::other(e)))?;
    let mut writer = encoder.finish().map_err(|e| TrainError::io(action(), e))?;
    writer.flush().map_err(|e| TrainError::io(action(), e))
}

/// Decode a state written by `write_state`.
pub fn read_state(path: &Path) -> TrainResult<TrainableState> {
    let file = fs::File::open(path).map_err(|e| TrainError::unavailable(path, e))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    bincode::deserialize_from(decoder).map_err(|e| TrainError::unavailable(path, e))
}
