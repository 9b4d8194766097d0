//! Design grids: every (participants, trials) cell for one target and design.
//!
//! A [`SimulationGrid`] is also the checkpoint artifact; the
//! [`GridRunner`] fans its cells out over a worker pool.

mod runner;

pub use runner::{GridRunner, SweepSummary};

use crate::models::{DesignType, Prior, Result, SimError, TargetParameter};
use crate::simulation::SimulationCell;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// Seed of the chunk of `cell` starting at `first_repetition`.
///
/// SplitMix64 finalizer over the master seed and the chunk coordinates, so
/// a resumed sweep draws exactly what an uninterrupted one would have.
pub fn chunk_seed(master: u64, cell: usize, first_repetition: usize) -> u64 {
    let mut state = master;
    for word in [cell as u64, first_repetition as u64] {
        state = splitmix64(state ^ splitmix64(word));
    }
    state
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Cells over participant counts × trial counts, stored row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationGrid {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Master seed every chunk seed is derived from
    pub seed: u64,
    pub target: TargetParameter,
    pub design: DesignType,
    pub participants: Vec<usize>,
    pub trials: Vec<usize>,
    pub cells: Vec<SimulationCell>,
}

impl SimulationGrid {
    pub fn new(
        participants: &[usize],
        trials: &[usize],
        target: TargetParameter,
        design: DesignType,
        prior: &Prior,
        seed: u64,
    ) -> Self {
        let now = Utc::now();
        let cells = participants
            .iter()
            .flat_map(|&p| {
                trials
                    .iter()
                    .map(move |&t| SimulationCell::new(p, t, prior.clone(), target, design))
            })
            .collect();
        Self {
            run_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            seed,
            target,
            design,
            participants: participants.to_vec(),
            trials: trials.to_vec(),
            cells,
        }
    }

    /// Artifact name, `{target}_{design}`.
    pub fn name(&self) -> String {
        artifact_name(self.target, self.design)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major index of `(p_index, t_index)`.
    pub fn index_of(&self, p_index: usize, t_index: usize) -> Option<usize> {
        (p_index < self.participants.len() && t_index < self.trials.len())
            .then(|| p_index * self.trials.len() + t_index)
    }

    /// `(p_index, t_index)` of a row-major index.
    pub fn position(&self, index: usize) -> Option<(usize, usize)> {
        let cols = self.trials.len();
        (cols > 0 && index < self.cells.len()).then(|| (index / cols, index % cols))
    }

    pub fn cell(&self, p_index: usize, t_index: usize) -> Option<&SimulationCell> {
        self.index_of(p_index, t_index).and_then(|i| self.cells.get(i))
    }

    pub fn cell_mut(&mut self, p_index: usize, t_index: usize) -> Option<&mut SimulationCell> {
        let index = self.index_of(p_index, t_index)?;
        self.cells.get_mut(index)
    }

    /// Replace the cell at `index` with the copy a worker returned.
    pub fn replace(&mut self, index: usize, cell: SimulationCell) -> Result<()> {
        let len = self.cells.len();
        let slot = self.cells.get_mut(index).ok_or_else(|| {
            SimError::Internal(format!("cell index {index} outside a grid of {len}"))
        })?;
        *slot = cell;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the grid was built over exactly these axes.
    pub fn matches_axes(&self, participants: &[usize], trials: &[usize]) -> bool {
        self.participants == participants && self.trials == trials
    }

    /// Repetitions still missing for every cell to reach `repetitions`.
    pub fn remaining(&self, repetitions: usize) -> usize {
        self.cells
            .iter()
            .map(|c| repetitions.saturating_sub(c.completed()))
            .sum()
    }

    pub fn completed(&self) -> usize {
        self.cells.iter().map(SimulationCell::completed).sum()
    }

    pub fn failures(&self) -> usize {
        self.cells.iter().map(|c| c.failure_count).sum()
    }

    /// Participants × trials table of one value per cell.
    pub fn table(&self, title: &str, value: impl Fn(&SimulationCell) -> f64) -> String {
        let mut out = String::new();
        let _ = write!(out, "{title:>8} |");
        for t in &self.trials {
            let _ = write!(out, " {:>10}", format!("T={t}"));
        }
        out.push('\n');
        out.push_str(&"-".repeat(10 + 11 * self.trials.len()));
        for (row, p) in self.participants.iter().enumerate() {
            let _ = write!(out, "\n{:>8} |", format!("P={p}"));
            for col in 0..self.trials.len() {
                match self.cell(row, col) {
                    Some(cell) => {
                        let _ = write!(out, " {:>10.4}", value(cell));
                    }
                    None => {
                        let _ = write!(out, " {:>10}", "-");
                    }
                }
            }
        }
        out
    }
}

/// Artifact name of a grid, `{target}_{design}`.
pub fn artifact_name(target: TargetParameter, design: DesignType) -> String {
    format!("{target}_{design}")
}
