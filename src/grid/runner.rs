//! Fan-out of grid cells over the worker pool.
//!
//! Each cell advances in chunks of `checkpoint_every` repetitions. At most
//! one chunk per cell is in flight, so a cell's repetitions stay in call
//! order, and the grid keeps the pre-dispatch copy of every cell until its
//! worker hands back the advanced one.

use super::{chunk_seed, SimulationGrid};
use crate::checkpoint::CheckpointManager;
use crate::models::{GridConfig, Result, SimError, WorkerConfig};
use crate::pool::{CellTask, TaskOutcome, WorkerPool};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What one sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub tasks: usize,
    pub repetitions: usize,
    pub failures: usize,
    /// Cells given up on after repeated worker panics
    pub abandoned: Vec<usize>,
    pub elapsed_secs: f64,
}

/// Drives a [`SimulationGrid`] to the requested repetition count.
pub struct GridRunner {
    pool: WorkerPool,
    repetitions: usize,
    chunk: usize,
    max_task_retries: u32,
}

impl GridRunner {
    pub fn new(pool: WorkerPool, grid: &GridConfig, workers: &WorkerConfig) -> Self {
        Self {
            pool,
            repetitions: grid.repetitions,
            chunk: grid.checkpoint_every.max(1),
            max_task_retries: workers.max_task_retries,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Next chunk of cell `index`, or `None` once it has every repetition.
    fn next_task(&self, grid: &SimulationGrid, index: usize) -> Option<CellTask> {
        let cell = grid.cells.get(index)?;
        let done = cell.completed();
        let remaining = self.repetitions.saturating_sub(done);
        (remaining > 0).then(|| CellTask {
            index,
            cell: cell.clone(),
            repetitions: remaining.min(self.chunk),
            seed: chunk_seed(grid.seed, index, done),
        })
    }

    fn dispatch(&self, tasks: &mut JoinSet<Result<TaskOutcome>>, task: CellTask) {
        let pool = self.pool.clone();
        debug!(cell = task.index, repetitions = task.repetitions, "Dispatching chunk");
        tasks.spawn(async move { pool.execute(task).await });
    }

    /// Run every cell of `grid` up to the configured repetitions.
    ///
    /// The checkpoint, when given, is rewritten after every completed task.
    /// Only a failed run (invalid prior, broken invariant) or a checkpoint
    /// write error aborts the sweep.
    pub async fn run(
        &self,
        grid: &mut SimulationGrid,
        checkpoint: Option<&CheckpointManager>,
    ) -> Result<SweepSummary> {
        let start = Instant::now();
        let mut summary = SweepSummary::default();
        let mut panics = vec![0u32; grid.len()];
        let mut tasks = JoinSet::new();

        info!(
            grid = %grid.name(),
            cells = grid.len(),
            remaining = grid.remaining(self.repetitions),
            workers = self.pool.size(),
            estimator = self.pool.estimator_name(),
            "Starting sweep"
        );

        for index in 0..grid.len() {
            if let Some(task) = self.next_task(grid, index) {
                self.dispatch(&mut tasks, task);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| SimError::Internal(format!("Coordinator task failed: {e}")))??;

            match outcome {
                TaskOutcome::Completed {
                    index,
                    cell,
                    report,
                    elapsed_secs,
                } => {
                    summary.tasks += 1;
                    summary.repetitions += report.repetitions;
                    summary.failures += report.failures.len();
                    debug!(
                        cell = index,
                        repetitions = report.repetitions,
                        failures = report.failures.len(),
                        elapsed_secs = elapsed_secs,
                        "Chunk complete"
                    );
                    grid.replace(index, cell)?;
                    if let Some(manager) = checkpoint {
                        manager.save(grid)?;
                    }
                    if let Some(task) = self.next_task(grid, index) {
                        self.dispatch(&mut tasks, task);
                    }
                }
                TaskOutcome::Panicked { index, message } => {
                    panics[index] += 1;
                    if panics[index] <= self.max_task_retries {
                        warn!(cell = index, attempt = panics[index], error = %message, "Retrying chunk after worker panic");
                        if let Some(task) = self.next_task(grid, index) {
                            self.dispatch(&mut tasks, task);
                        }
                    } else {
                        warn!(cell = index, error = %message, "Abandoning cell for this sweep");
                        summary.abandoned.push(index);
                    }
                }
                TaskOutcome::Failed { index, error } => {
                    warn!(cell = index, error = %error, "Cell run failed, stopping sweep");
                    tasks.shutdown().await;
                    return Err(error);
                }
            }
        }

        summary.abandoned.sort_unstable();
        summary.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            grid = %grid.name(),
            tasks = summary.tasks,
            repetitions = summary.repetitions,
            failures = summary.failures,
            abandoned = summary.abandoned.len(),
            elapsed_secs = format!("{:.1}", summary.elapsed_secs),
            "Sweep complete"
        );
        Ok(summary)
    }
}
