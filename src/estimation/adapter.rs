//! Adapter between the simulation and an external estimation engine.
//!
//! The adapter owns everything engine-independent: summarizing the data,
//! building the model specification, drawing initial values, retrying
//! retryable failures, and reshaping draws into a [`Posterior`].

use super::{
    Diagnostics, Estimation, EstimationFailure, Estimator, FailureKind, ModelSpec, Posterior,
};
use crate::models::{EngineError, Prior, SummaryData, TargetParameter, TrialDataset};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Posterior draws keyed by node name (`"bound_mean"`, `"drift[4]"`),
/// pooled over chains.
pub type NamedDraws = BTreeMap<String, Vec<f64>>;

/// Initial values for one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainInits {
    /// One starting drift per retained participant
    pub drift: Vec<f64>,
    /// Seed for the engine's own RNG
    pub rng_seed: u32,
}

impl ChainInits {
    /// Drift inits ~ Normal(0, 0.1), one set per chain.
    pub fn draw(chains: u32, participants: usize, rng: &mut dyn RngCore) -> Vec<Self> {
        let mut inits = Vec::with_capacity(chains as usize);
        for _ in 0..chains {
            let drift = (0..participants)
                .map(|_| 0.1 * rng.sample::<f64, _>(StandardNormal))
                .collect();
            let rng_seed = rng.gen_range(1..=u32::MAX / 2);
            inits.push(ChainInits { drift, rng_seed });
        }
        inits
    }
}

/// A process or library that samples the posterior of a model specification.
pub trait EstimationEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Number of chains the engine runs; one [`ChainInits`] is passed per chain.
    fn chains(&self) -> u32;

    fn fit(
        &self,
        model: &ModelSpec,
        data: &SummaryData,
        inits: &[ChainInits],
    ) -> Result<NamedDraws, EngineError>;
}

/// [`Estimator`] backed by an [`EstimationEngine`].
pub struct EstimationAdapter<E> {
    engine: E,
    max_attempts: u32,
}

impl<E: EstimationEngine> EstimationAdapter<E> {
    pub fn new(engine: E, max_attempts: u32) -> Self {
        Self {
            engine,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Fit with fresh initial values per attempt.
    ///
    /// B_i(engine converges) → Result
    /// I^B(bad initial values) → retry
    fn fit_with_retry(
        &self,
        model: &ModelSpec,
        data: &SummaryData,
        rng: &mut dyn RngCore,
    ) -> Result<NamedDraws, EngineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let inits = ChainInits::draw(self.engine.chains(), data.len(), rng);
            match self.engine.fit(model, data, &inits) {
                Ok(draws) => return Ok(draws),
                Err(e) if !e.is_retryable() || attempt >= self.max_attempts => {
                    if attempt == 1 {
                        return Err(e);
                    }
                    return Err(EngineError::MaxAttemptsExceeded {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        engine = self.engine.name(),
                        attempt = attempt,
                        error = %e,
                        "Retrying fit with fresh initial values"
                    );
                }
            }
        }
    }
}

impl<E: EstimationEngine> Estimator for EstimationAdapter<E> {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn estimate(
        &self,
        data: &TrialDataset,
        prior: &Prior,
        target: TargetParameter,
        rng: &mut dyn RngCore,
    ) -> Result<Estimation, EstimationFailure> {
        let summary = data.summarize();
        let engine_data = summary.engine_data();

        if engine_data.is_empty() {
            return Err(EstimationFailure::new(
                FailureKind::InsufficientData,
                "no participant has two or more correct trials",
            )
            .with_diagnostics(Diagnostics {
                summary,
                data: engine_data,
                engine_output: None,
            }));
        }

        let model = ModelSpec::new(prior, target);
        let result = self
            .fit_with_retry(&model, &engine_data, rng)
            .and_then(|draws| Posterior::from_draws(&draws, &engine_data));

        match result {
            Ok(posterior) => Ok(Estimation {
                estimate: posterior.point_estimate(),
                posterior: Some(posterior),
            }),
            Err(e) => {
                debug!(engine = self.engine.name(), error = %e, "Fit failed");
                let engine_output = match &e {
                    EngineError::Compile { message } | EngineError::Runtime { message } => {
                        Some(message.clone())
                    }
                    _ => None,
                };
                Err(
                    EstimationFailure::new(FailureKind::Engine, e.to_string()).with_diagnostics(
                        Diagnostics {
                            summary,
                            data: engine_data,
                            engine_output,
                        },
                    ),
                )
            }
        }
    }
}
