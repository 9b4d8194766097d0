//! Persistence of grid artifacts.
//!
//! Epistemic foundation:
//! - K_i: One artifact per (target, design), named `{target}_{design}.json`
//! - K_i: Writes are atomic (backup, write temp, rename)
//! - B_i: An artifact may not exist yet → Option
//! - I^B: Crash during write → the backup file holds the previous state

use crate::grid::{artifact_name, SimulationGrid};
use crate::models::{DesignType, GridConfig, Prior, Result, SimError, TargetParameter};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Reads and writes grid artifacts in one directory.
///
/// The coordinator is the only writer.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager, creating `dir` if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| SimError::io("creating checkpoint dir", e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `(target, design)`.
    pub fn path_for(&self, target: TargetParameter, design: DesignType) -> PathBuf {
        self.dir.join(format!("{}.json", artifact_name(target, design)))
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.backup.json"))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.tmp.json"))
    }

    pub fn exists(&self, target: TargetParameter, design: DesignType) -> bool {
        self.path_for(target, design).exists()
    }

    /// Save a grid (atomic write).
    pub fn save(&self, grid: &SimulationGrid) -> Result<()> {
        let name = grid.name();
        let path = self.dir.join(format!("{name}.json"));

        // Backup existing artifact
        if path.exists() {
            fs::copy(&path, self.backup_path(&name))
                .map_err(|e| SimError::io("backing up checkpoint", e))?;
        }

        // Write to temp file
        let temp_path = self.temp_path(&name);
        let file =
            File::create(&temp_path).map_err(|e| SimError::io("creating temp checkpoint", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, grid)
            .map_err(|e| SimError::Internal(format!("Serializing checkpoint: {e}")))?;
        writer
            .flush()
            .map_err(|e| SimError::io("flushing temp checkpoint", e))?;
        drop(writer);

        // Atomic rename
        fs::rename(&temp_path, &path).map_err(|e| SimError::io("renaming checkpoint", e))?;

        debug!(artifact = %name, completed = grid.completed(), "Checkpoint saved");
        Ok(())
    }

    /// Load an artifact by path.
    pub fn load_path(path: &Path) -> Result<SimulationGrid> {
        let file = File::open(path).map_err(|e| SimError::io("opening checkpoint", e))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| {
            SimError::ParseError(format!("Invalid checkpoint {}: {e}", path.display()))
        })
    }

    /// Load the artifact for `(target, design)`, if there is one.
    pub fn load(
        &self,
        target: TargetParameter,
        design: DesignType,
    ) -> Result<Option<SimulationGrid>> {
        let path = self.path_for(target, design);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_path(&path).map(Some)
    }

    /// Resume the stored grid for `(target, design)` or start a new one.
    ///
    /// A stored grid over different axes is rejected; a sweep never mixes
    /// designs in one artifact.
    pub fn init_or_resume(
        &self,
        grid: &GridConfig,
        prior: &Prior,
        target: TargetParameter,
        design: DesignType,
        seed: u64,
    ) -> Result<SimulationGrid> {
        if let Some(stored) = self.load(target, design)? {
            if !stored.matches_axes(&grid.participants, &grid.trials) {
                return Err(SimError::InvalidInput(format!(
                    "checkpoint {} covers P={:?} T={:?} but the configuration asks for P={:?} T={:?}",
                    self.path_for(target, design).display(),
                    stored.participants,
                    stored.trials,
                    grid.participants,
                    grid.trials
                )));
            }
            if stored.cells.iter().any(|c| &c.prior != prior) {
                warn!(artifact = %stored.name(), "Stored prior differs from the configuration; keeping the stored prior");
            }
            info!(
                artifact = %stored.name(),
                completed = stored.completed(),
                remaining = stored.remaining(grid.repetitions),
                "Resuming from checkpoint"
            );
            return Ok(stored);
        }

        let fresh = SimulationGrid::new(
            &grid.participants,
            &grid.trials,
            target,
            design,
            prior,
            seed,
        );
        self.save(&fresh)?;
        info!(artifact = %fresh.name(), cells = fresh.len(), "Created new checkpoint");
        Ok(fresh)
    }

    /// Every artifact in the directory, sorted by path.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.dir.join("*.json");
        let pattern_str = pattern.to_string_lossy();

        let mut paths: Vec<PathBuf> = glob::glob(&pattern_str)
            .map_err(|e| SimError::Internal(format!("Invalid glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .filter(|p| {
                let name = p.to_string_lossy();
                !name.ends_with(".backup.json") && !name.ends_with(".tmp.json")
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}
