//! Estimation: recovering a parameter set from a synthetic dataset.
//!
//! An [`Estimator`] either returns a point estimate (and optionally the
//! posterior it was reduced from) or an [`EstimationFailure`] carrying enough
//! diagnostics to reproduce the failing fit. Estimation failures are data,
//! not errors: the simulation records them and keeps going.

mod adapter;
mod ez;
mod jags;
mod model_spec;
mod posterior;

pub use adapter::{ChainInits, EstimationAdapter, EstimationEngine, NamedDraws};
pub use ez::EzEstimator;
pub use jags::JagsEngine;
pub use model_spec::ModelSpec;
pub use posterior::Posterior;

use crate::models::{
    DataSummary, EngineConfig, EngineKind, ParameterSet, Prior, SummaryData, TargetParameter,
    TrialDataset,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Successful fit.
#[derive(Debug, Clone)]
pub struct Estimation {
    pub estimate: ParameterSet,
    /// Full posterior draws, when the estimator samples one
    pub posterior: Option<Posterior>,
}

/// Why a repetition produced no estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine failed to compile, initialize or sample
    Engine,
    /// Too few usable participants to fit
    InsufficientData,
    /// The ground truth could not be simulated (e.g. non-positive bound)
    InvalidTruth,
    /// The generator never produced a correct response
    DegenerateData,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Engine => "engine failure",
            Self::InsufficientData => "insufficient data",
            Self::InvalidTruth => "invalid ground truth",
            Self::DegenerateData => "degenerate data",
        };
        f.write_str(label)
    }
}

/// The data an engine was given when it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub summary: DataSummary,
    pub data: SummaryData,
    /// Captured engine output, if any
    pub engine_output: Option<String>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        writeln!(
            f,
            "Engine data ({} of {} participants):",
            self.data.len(),
            self.data.total_participants
        )?;
        writeln!(f, "  nTrials = {:?}", self.data.n_trials)?;
        writeln!(f, "  meanRT  = {:?}", self.data.mean_rt)?;
        writeln!(f, "  varRT   = {:?}", self.data.var_rt)?;
        writeln!(f, "  correct = {:?}", self.data.correct)?;
        write!(f, "  X       = {:?}", self.data.x)?;
        if let Some(output) = &self.engine_output {
            write!(f, "\nEngine output:\n{output}")?;
        }
        Ok(())
    }
}

/// A repetition that produced no estimate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EstimationFailure {
    pub kind: FailureKind,
    pub message: String,
    pub diagnostics: Option<Box<Diagnostics>>,
}

impl EstimationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(Box::new(diagnostics));
        self
    }
}

/// Recovers parameters from a simulated dataset.
///
/// Implementations never panic on bad data; every data-dependent problem
/// is an [`EstimationFailure`].
pub trait Estimator: Send + Sync {
    fn name(&self) -> &str;

    fn estimate(
        &self,
        data: &TrialDataset,
        prior: &Prior,
        target: TargetParameter,
        rng: &mut dyn RngCore,
    ) -> Result<Estimation, EstimationFailure>;
}

/// Build the configured estimator.
pub fn from_config(config: &EngineConfig) -> Arc<dyn Estimator> {
    match config.kind {
        EngineKind::Jags => Arc::new(EstimationAdapter::new(
            JagsEngine::from_config(config),
            config.max_attempts,
        )),
        EngineKind::Ez => Arc::new(EzEstimator::new()),
    }
}
