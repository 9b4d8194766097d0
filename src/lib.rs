//! ezbhddm - Parameter-recovery simulations for the hierarchical EZ diffusion model.
//!
//! ## Architecture
//!
//! A sweep runs every cell of a design grid (participant counts × trials
//! per participant) for one covariate target and design type:
//! - **Simulation cell**: draw truth from the prior → simulate trials →
//!   estimate → score, repeated and aggregated
//! - **Worker pool**: executes cell tasks on blocking threads, one RNG
//!   stream per task
//! - **Grid runner**: dispatches chunks of repetitions and checkpoints
//!   the grid after each one
//!
//! ## Estimators
//!
//! - **JAGS**: hierarchical Bayesian fit through the JAGS binary, with posterior draws
//! - **EZ**: closed-form inversion per participant, point estimates only
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Engine uncertainties (retry, timeout, discard)

pub mod checkpoint;
pub mod diffusion;
pub mod estimation;
pub mod grid;
pub mod models;
pub mod pool;
pub mod simulation;

// Re-exports for convenience
pub use checkpoint::CheckpointManager;
pub use diffusion::{ResponseTimeGenerator, WienerGenerator};
pub use estimation::{Estimator, EzEstimator, JagsEngine};
pub use grid::{GridRunner, SimulationGrid};
pub use models::{Config, ParameterSet, Prior, Result, SimError};
pub use pool::WorkerPool;
pub use simulation::{ReportStyle, SimulationCell};
