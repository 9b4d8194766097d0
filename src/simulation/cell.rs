//! A single design point and its accumulated repetitions.

use super::{CalibrationReport, Quantile, ScalarRecovery, Statistics};
use crate::diffusion::ResponseTimeGenerator;
use crate::estimation::{Estimation, EstimationFailure, Estimator, FailureKind};
use crate::models::{
    DesignType, GeneratorError, ParameterSet, Prior, Result, Scalar, SimError, TargetParameter,
    TrialDataset,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Why a repetition has no estimate, as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&EstimationFailure> for FailureRecord {
    fn from(failure: &EstimationFailure) -> Self {
        Self {
            kind: failure.kind,
            message: failure.message.clone(),
        }
    }
}

/// One recorded repetition. Appended whether or not estimation succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repetition {
    pub index: usize,
    pub truth: ParameterSet,
    pub estimate: Option<ParameterSet>,
    pub quantile: Option<Quantile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

/// A failed repetition with everything the estimator reported.
#[derive(Debug, Clone)]
pub struct RepetitionFailure {
    pub index: usize,
    pub failure: EstimationFailure,
}

/// What one call to [`SimulationCell::run`] did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub repetitions: usize,
    pub failures: Vec<RepetitionFailure>,
}

/// Layout of [`SimulationCell::report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportStyle {
    /// One line: design, median wall time, ME and MAE
    Short,
    #[default]
    Long,
}

impl FromStr for ReportStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            other => Err(format!("unknown report style '{other}' (expected short or long)")),
        }
    }
}

/// One combination of participant count and trials per participant.
///
/// Accumulation state is owned here and only mutated by [`run`](Self::run)
/// (or the staged methods it is built from). Invariants after every
/// repetition: `results.len() == wall_times.len()`, and `failure_count`
/// equals the number of results without an estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationCell {
    pub participants: usize,
    pub trials: usize,
    pub prior: Prior,
    pub covariate: Vec<f64>,
    pub target: TargetParameter,
    pub design: DesignType,

    pub results: Vec<Repetition>,
    pub statistics: Statistics,
    /// Seconds spent in estimation, one per result
    pub wall_times: Vec<f64>,
    pub failure_count: usize,
    /// Indices of repetitions without an estimate
    pub discards: Vec<usize>,

    #[serde(skip)]
    truth: Option<ParameterSet>,
    #[serde(skip)]
    data: Option<TrialDataset>,
}

impl SimulationCell {
    pub fn new(
        participants: usize,
        trials: usize,
        prior: Prior,
        target: TargetParameter,
        design: DesignType,
    ) -> Self {
        Self {
            participants,
            trials,
            prior,
            covariate: design.covariate(participants),
            target,
            design,
            results: Vec::new(),
            statistics: Statistics::default(),
            wall_times: Vec::new(),
            failure_count: 0,
            discards: Vec::new(),
            truth: None,
            data: None,
        }
    }

    /// Repetitions recorded so far.
    pub fn completed(&self) -> usize {
        self.results.len()
    }

    /// Draw a fresh ground truth. Invalidates any sampled data.
    pub fn sample_parameters(&mut self, rng: &mut dyn RngCore) -> Result<&ParameterSet> {
        let truth = ParameterSet::sample(&self.prior, self.target, &self.covariate, rng)?;
        self.data = None;
        Ok(self.truth.insert(truth))
    }

    /// Simulate trial data from the current ground truth.
    pub fn sample_data<G: ResponseTimeGenerator + ?Sized>(
        &mut self,
        generator: &G,
        rng: &mut dyn RngCore,
    ) -> Result<&TrialDataset> {
        let truth = self.truth.as_ref().ok_or_else(|| {
            SimError::Precondition(
                "a parameter set must be drawn before sampling data".to_string(),
            )
        })?;
        let data = TrialDataset::sample(truth, self.trials, &self.covariate, generator, rng)?;
        Ok(self.data.insert(data))
    }

    /// Fit the current dataset.
    pub fn estimate(
        &self,
        estimator: &dyn Estimator,
        rng: &mut dyn RngCore,
    ) -> Result<std::result::Result<Estimation, EstimationFailure>> {
        let data = self.data.as_ref().ok_or_else(|| {
            SimError::Precondition("data must be sampled before estimation".to_string())
        })?;
        Ok(estimator.estimate(data, &self.prior, self.target, rng))
    }

    /// Run `repetitions` more repetitions, appending to the history.
    pub fn run(
        &mut self,
        repetitions: usize,
        generator: &dyn ResponseTimeGenerator,
        estimator: &dyn Estimator,
        rng: &mut dyn RngCore,
    ) -> Result<RunReport> {
        self.run_with(repetitions, generator, estimator, rng, &mut |_| {})
    }

    /// [`run`](Self::run), calling `on_repetition` after each append.
    ///
    /// Only an invalid prior or a broken invariant aborts; estimation and
    /// simulation failures are recorded and returned in the report.
    pub fn run_with(
        &mut self,
        repetitions: usize,
        generator: &dyn ResponseTimeGenerator,
        estimator: &dyn Estimator,
        rng: &mut dyn RngCore,
        on_repetition: &mut dyn FnMut(&Repetition),
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        for _ in 0..repetitions {
            let index = self.results.len();
            self.sample_parameters(rng)?;

            let sampled = self.sample_data(generator, rng).map(|_| ());
            let (outcome, wall_time) = match sampled {
                Ok(()) => {
                    let start = Instant::now();
                    let outcome = self.estimate(estimator, rng)?;
                    (outcome, start.elapsed().as_secs_f64())
                }
                Err(SimError::Generator(e)) => (Err(simulation_failure(e)), 0.0),
                Err(e) => return Err(e),
            };

            let truth = self.truth.take().ok_or_else(|| {
                SimError::Internal("ground truth vanished during a repetition".to_string())
            })?;
            self.data = None;

            let repetition = match outcome {
                Ok(estimation) => Repetition {
                    index,
                    quantile: Quantile::compute(estimation.posterior.as_ref(), &truth),
                    estimate: Some(estimation.estimate),
                    truth,
                    failure: None,
                },
                Err(failure) => {
                    self.failure_count += 1;
                    self.discards.push(index);
                    let record = FailureRecord::from(&failure);
                    report.failures.push(RepetitionFailure { index, failure });
                    Repetition {
                        index,
                        truth,
                        estimate: None,
                        quantile: None,
                        failure: Some(record),
                    }
                }
            };

            self.wall_times.push(wall_time);
            self.results.push(repetition);
            self.recompute_statistics();
            report.repetitions += 1;

            if let Some(last) = self.results.last() {
                on_repetition(last);
            }
        }

        Ok(report)
    }

    fn recompute_statistics(&mut self) {
        self.statistics = Statistics::from_errors(self.results.iter().filter_map(|r| {
            r.estimate
                .as_ref()
                .map(|e| r.truth.betaweight - e.betaweight)
        }));
    }

    /// Median seconds per estimation; NaN before any repetition.
    pub fn median_wall_time(&self) -> f64 {
        if self.wall_times.is_empty() {
            return f64::NAN;
        }
        let mut sorted = self.wall_times.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Error statistics of every group-level scalar.
    pub fn recovery(&self) -> Vec<ScalarRecovery> {
        Scalar::ALL
            .into_iter()
            .map(|scalar| ScalarRecovery {
                scalar,
                statistics: Statistics::from_errors(self.results.iter().filter_map(|r| {
                    r.estimate
                        .as_ref()
                        .map(|e| r.truth.scalar(scalar) - e.scalar(scalar))
                })),
            })
            .collect()
    }

    /// Calibration of every group-level scalar over repetitions with a quantile.
    pub fn calibration(&self) -> Vec<CalibrationReport> {
        Scalar::ALL
            .into_iter()
            .map(|scalar| {
                let quantiles: Vec<f64> = self
                    .results
                    .iter()
                    .filter_map(|r| r.quantile.as_ref().map(|q| q.get(scalar)))
                    .collect();
                CalibrationReport::from_quantiles(scalar, &quantiles)
            })
            .collect()
    }

    pub fn report(&self, style: ReportStyle) -> String {
        let s = &self.statistics;
        let walltime = self.median_wall_time();
        match style {
            ReportStyle::Short => format!(
                "Sim(P={}, T={}, {:.2}s): ME = {:.6}, MAE = {:.6}",
                self.participants, self.trials, walltime, s.mean_error, s.mae
            ),
            ReportStyle::Long => [
                "  Simulation results".to_string(),
                "  ------------------".to_string(),
                format!("  Participants{:>6}", self.participants),
                format!("  Trials      {:>6}", self.trials),
                format!("  Criterion   '{}'", self.target),
                format!("  Design      '{}'", self.design),
                format!("  Walltime    {walltime:6.2}s"),
                format!("  Failures    {:>6} of {}", self.failure_count, self.results.len()),
                String::new(),
                format!("  ME   = {:.6}", s.mean_error),
                format!("  MSE  = {:.6}", s.mse),
                format!("  RMSE = {:.6}", s.rmse),
                format!("  MAE  = {:.6}", s.mae),
            ]
            .join("\n"),
        }
    }
}

impl fmt::Display for SimulationCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report(ReportStyle::Short))
    }
}

fn simulation_failure(error: GeneratorError) -> EstimationFailure {
    let kind = match error {
        GeneratorError::InvalidParameters { .. } => FailureKind::InvalidTruth,
        GeneratorError::NoCorrectResponses { .. } => FailureKind::DegenerateData,
    };
    EstimationFailure::new(kind, error.to_string())
}
