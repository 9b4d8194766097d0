//! Worker pool for cell tasks.
//!
//! Epistemic foundation:
//! - K_i: A task owns its cell, its RNG stream and its engine invocations
//! - K_i: At most `size` tasks run at once; each runs on a blocking thread
//! - B_i: A run may abort on an invalid prior → TaskOutcome::Failed
//! - I^B: A worker may panic → TaskOutcome::Panicked, the cell is lost with it

use crate::diffusion::ResponseTimeGenerator;
use crate::estimation::Estimator;
use crate::models::{Result, SimError};
use crate::simulation::{RunReport, SimulationCell};
use indicatif::ProgressBar;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Run `repetitions` more repetitions of one cell from `seed`.
#[derive(Debug, Clone)]
pub struct CellTask {
    /// Row-major position of the cell in its grid
    pub index: usize,
    pub cell: SimulationCell,
    pub repetitions: usize,
    pub seed: u64,
}

/// How a dispatched task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task ran to completion and returns its cell
    Completed {
        index: usize,
        cell: SimulationCell,
        report: RunReport,
        elapsed_secs: f64,
    },
    /// The run aborted with an error (invalid prior, broken invariant)
    Failed { index: usize, error: SimError },
    /// The worker panicked; the task's copy of the cell is gone
    Panicked { index: usize, message: String },
}

impl TaskOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Completed { index, .. }
            | Self::Failed { index, .. }
            | Self::Panicked { index, .. } => *index,
        }
    }
}

/// Fixed-size pool executing cell tasks on blocking threads.
///
/// Cheap to clone; clones share the semaphore, collaborators and counters.
#[derive(Clone)]
pub struct WorkerPool {
    generator: Arc<dyn ResponseTimeGenerator>,
    estimator: Arc<dyn Estimator>,
    /// Pool size (max concurrent tasks)
    pool_size: usize,
    semaphore: Arc<Semaphore>,
    /// Failed repetitions across every task of this pool
    failures: Arc<AtomicUsize>,
    progress: Option<ProgressBar>,
}

impl WorkerPool {
    pub fn new(
        generator: Arc<dyn ResponseTimeGenerator>,
        estimator: Arc<dyn Estimator>,
        pool_size: usize,
    ) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            generator,
            estimator,
            pool_size,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            failures: Arc::new(AtomicUsize::new(0)),
            progress: None,
        }
    }

    /// Tick `progress` once per repetition; its message shows the failure count.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn size(&self) -> usize {
        self.pool_size
    }

    pub fn estimator_name(&self) -> &str {
        self.estimator.name()
    }

    /// Failed repetitions recorded by this pool so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Execute one task once a slot is free.
    ///
    /// B_i(run completes) → TaskOutcome::Completed
    /// I^B(worker panics) → TaskOutcome::Panicked
    pub async fn execute(&self, task: CellTask) -> Result<TaskOutcome> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SimError::Internal("Semaphore closed".to_string()))?;

        let index = task.index;
        let generator = Arc::clone(&self.generator);
        let estimator = Arc::clone(&self.estimator);
        let failures = Arc::clone(&self.failures);
        let progress = self.progress.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let CellTask {
                index,
                mut cell,
                repetitions,
                seed,
            } = task;
            let start = Instant::now();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let mut on_repetition = |repetition: &crate::simulation::Repetition| {
                let failed = if repetition.estimate.is_none() {
                    failures.fetch_add(1, Ordering::Relaxed) + 1
                } else {
                    failures.load(Ordering::Relaxed)
                };
                if let Some(pb) = &progress {
                    pb.inc(1);
                    if failed > 0 {
                        pb.set_message(format!("(Discarding {failed})"));
                    }
                }
            };

            let result = cell.run_with(
                repetitions,
                generator.as_ref(),
                estimator.as_ref(),
                &mut rng,
                &mut on_repetition,
            );
            match result {
                Ok(report) => TaskOutcome::Completed {
                    index,
                    cell,
                    report,
                    elapsed_secs: start.elapsed().as_secs_f64(),
                },
                Err(error) => TaskOutcome::Failed { index, error },
            }
        });

        match handle.await {
            Ok(outcome) => {
                debug!(cell = index, "Task finished");
                Ok(outcome)
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!(cell = index, error = %message, "Task panicked");
                Ok(TaskOutcome::Panicked { index, message })
            }
            Err(e) => Err(SimError::Internal(format!("Task for cell {index} cancelled: {e}"))),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::WienerGenerator;
    use crate::estimation::{Estimation, EstimationFailure, EzEstimator};
    use crate::models::{DesignType, Prior, TargetParameter, TrialDataset};
    use rand::RngCore;

    struct Exploding;

    impl Estimator for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn estimate(
            &self,
            _data: &TrialDataset,
            _prior: &Prior,
            _target: TargetParameter,
            _rng: &mut dyn RngCore,
        ) -> std::result::Result<Estimation, EstimationFailure> {
            panic!("engine bindings corrupted");
        }
    }

    fn task(seed: u64) -> CellTask {
        CellTask {
            index: 3,
            cell: SimulationCell::new(
                8,
                20,
                Prior::default(),
                TargetParameter::Drift,
                DesignType::Ttest,
            ),
            repetitions: 4,
            seed,
        }
    }

    #[tokio::test]
    async fn test_completed_task_returns_cell() {
        let pool = WorkerPool::new(Arc::new(WienerGenerator::new()), Arc::new(EzEstimator::new()), 2);
        let outcome = pool.execute(task(1)).await.unwrap();
        match outcome {
            TaskOutcome::Completed { index, cell, report, .. } => {
                assert_eq!(index, 3);
                assert_eq!(cell.completed(), 4);
                assert_eq!(report.repetitions, 4);
                assert_eq!(pool.failures(), cell.failure_count);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_results() {
        let pool = WorkerPool::new(Arc::new(WienerGenerator::new()), Arc::new(EzEstimator::new()), 2);
        let (a, b) = tokio::join!(pool.execute(task(42)), pool.execute(task(42)));
        match (a.unwrap(), b.unwrap()) {
            (TaskOutcome::Completed { cell: a, .. }, TaskOutcome::Completed { cell: b, .. }) => {
                assert_eq!(a.results, b.results);
            }
            other => panic!("unexpected outcomes {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let pool = WorkerPool::new(Arc::new(WienerGenerator::new()), Arc::new(Exploding), 1);
        let outcome = pool.execute(task(7)).await.unwrap();
        assert_eq!(outcome.index(), 3);
        match outcome {
            TaskOutcome::Panicked { message, .. } => {
                assert!(message.contains("engine bindings corrupted"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        // the pool still accepts work
        let pool = WorkerPool::new(Arc::new(WienerGenerator::new()), Arc::new(EzEstimator::new()), 1);
        assert!(matches!(
            pool.execute(task(8)).await.unwrap(),
            TaskOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_prior_fails_task() {
        let pool = WorkerPool::new(Arc::new(WienerGenerator::new()), Arc::new(EzEstimator::new()), 1);
        let mut bad = task(9);
        bad.cell.prior.nondt_sdev_upper = 0.0;
        assert!(matches!(
            pool.execute(bad).await.unwrap(),
            TaskOutcome::Failed { index: 3, .. }
        ));
    }
}
