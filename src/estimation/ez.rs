//! Closed-form EZ estimator.
//!
//! Inverts the EZ equations per participant, then summarizes the
//! per-participant estimates at the group level. The covariate weight is the
//! least-squares slope of the target parameter on the covariate. No engine,
//! no posterior.

use super::{Estimation, EstimationFailure, Estimator, FailureKind};
use crate::diffusion::mean_decision_time;
use crate::models::{ParameterSet, ParticipantSummary, Prior, TargetParameter, TrialDataset};
use rand::RngCore;

/// EZ point estimator, unit noise.
#[derive(Debug, Clone, Default)]
pub struct EzEstimator;

impl EzEstimator {
    pub fn new() -> Self {
        Self
    }

    /// `(bound, drift, nondt)` for one participant, or `None` when the
    /// statistics admit no finite solution.
    pub fn invert(row: &ParticipantSummary) -> Option<(f64, f64, f64)> {
        let (mean_rt, var_rt) = (row.mean_rt?, row.var_rt?);
        if row.trial_count == 0 || var_rt <= 0.0 {
            return None;
        }

        let n = row.trial_count as f64;
        let pc = match row.accuracy() {
            p if p >= 1.0 => 1.0 - 1.0 / (2.0 * n),
            p if p <= 0.0 => 1.0 / (2.0 * n),
            p if p == 0.5 => 0.5 + 1.0 / (2.0 * n),
            p => p,
        };

        let logit = (pc / (1.0 - pc)).ln();
        let x = logit * (logit * pc * pc - logit * pc + pc - 0.5) / var_rt;
        let drift = (pc - 0.5).signum() * x.powf(0.25);
        let bound = logit / drift;
        let nondt = mean_rt - mean_decision_time(bound, drift);

        let solved = (bound, drift, nondt);
        (bound.is_finite() && drift.is_finite() && nondt.is_finite() && bound > 0.0)
            .then_some(solved)
    }
}

struct Fit {
    intercept: f64,
    slope: f64,
    residual_sd: f64,
}

/// Ordinary least squares of `y` on `x`. Needs two distinct covariate values.
fn least_squares(x: &[f64], y: &[f64]) -> Option<Fit> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let nf = n as f64;
    let mx = x.iter().sum::<f64>() / nf;
    let my = y.iter().sum::<f64>() / nf;
    let sxx: f64 = x.iter().map(|xi| (xi - mx).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = x.iter().zip(y).map(|(xi, yi)| (xi - mx) * (yi - my)).sum();
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let rss: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - intercept - slope * xi).powi(2))
        .sum();
    let residual_sd = if n > 2 { (rss / (nf - 2.0)).sqrt() } else { 0.0 };
    Some(Fit {
        intercept,
        slope,
        residual_sd,
    })
}

fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sd = if values.len() > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    (mean, sd)
}

impl Estimator for EzEstimator {
    fn name(&self) -> &str {
        "ez"
    }

    fn estimate(
        &self,
        data: &TrialDataset,
        _prior: &Prior,
        target: TargetParameter,
        _rng: &mut dyn RngCore,
    ) -> Result<Estimation, EstimationFailure> {
        let summary = data.summarize();
        let participants = summary.participants();

        let mut estimate = ParameterSet {
            betaweight: f64::NAN,
            bound_mean: f64::NAN,
            bound_sdev: f64::NAN,
            drift_mean: f64::NAN,
            drift_sdev: f64::NAN,
            nondt_mean: f64::NAN,
            nondt_sdev: f64::NAN,
            bound: vec![None; participants],
            drift: vec![None; participants],
            nondt: vec![None; participants],
        };

        let mut covariate = Vec::new();
        let mut columns: [Vec<f64>; 3] = Default::default();
        for row in summary.retained() {
            let Some((bound, drift, nondt)) = Self::invert(row) else {
                continue;
            };
            estimate.bound[row.participant] = Some(bound);
            estimate.drift[row.participant] = Some(drift);
            estimate.nondt[row.participant] = Some(nondt);
            covariate.push(row.covariate);
            columns[0].push(bound);
            columns[1].push(drift);
            columns[2].push(nondt);
        }

        if covariate.len() < 2 {
            return Err(EstimationFailure::new(
                FailureKind::InsufficientData,
                format!(
                    "{} of {participants} participants have a finite EZ solution",
                    covariate.len()
                ),
            ));
        }

        let params = [TargetParameter::Bound, TargetParameter::Drift, TargetParameter::Nondt];
        for (param, values) in params.into_iter().zip(&columns) {
            let (mean, sdev) = if param == target {
                let fit = least_squares(&covariate, values).ok_or_else(|| {
                    EstimationFailure::new(
                        FailureKind::InsufficientData,
                        "covariate is constant over the usable participants",
                    )
                })?;
                estimate.betaweight = fit.slope;
                (fit.intercept, fit.residual_sd)
            } else {
                mean_and_sd(values)
            };
            match param {
                TargetParameter::Bound => (estimate.bound_mean, estimate.bound_sdev) = (mean, sdev),
                TargetParameter::Drift => (estimate.drift_mean, estimate.drift_sdev) = (mean, sdev),
                TargetParameter::Nondt => (estimate.nondt_mean, estimate.nondt_sdev) = (mean, sdev),
            }
        }

        Ok(Estimation {
            estimate,
            posterior: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::Moments;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn row_from_moments(bound: f64, drift: f64, nondt: f64, trials: usize) -> ParticipantSummary {
        let m = Moments::predict(bound, drift, nondt);
        ParticipantSummary {
            participant: 0,
            trial_count: trials,
            correct_count: (m.accuracy * trials as f64).round() as usize,
            mean_rt: Some(m.mean_rt),
            var_rt: Some(m.rt_variance),
            covariate: 0.0,
        }
    }

    #[test]
    fn test_inversion_recovers_exact_moments() {
        // accuracy 0.8 exactly: bound * drift = ln 4
        let (bound, drift) = (2.0, 4f64.ln() / 2.0);
        let row = row_from_moments(bound, drift, 0.3, 1000);
        assert_eq!(row.correct_count, 800);

        let (a, v, t) = EzEstimator::invert(&row).unwrap();
        assert!((a - bound).abs() < 1e-9, "bound {a}");
        assert!((v - drift).abs() < 1e-9, "drift {v}");
        assert!((t - 0.3).abs() < 1e-9, "nondt {t}");
    }

    #[test]
    fn test_edge_accuracy_is_corrected() {
        let perfect = ParticipantSummary {
            participant: 0,
            trial_count: 20,
            correct_count: 20,
            mean_rt: Some(0.5),
            var_rt: Some(0.02),
            covariate: 0.0,
        };
        let (a, v, _) = EzEstimator::invert(&perfect).unwrap();
        assert!(a.is_finite() && v > 0.0);

        let chance = ParticipantSummary {
            correct_count: 10,
            ..perfect.clone()
        };
        let (a, v, _) = EzEstimator::invert(&chance).unwrap();
        assert!(a.is_finite() && v > 0.0);

        let flat = ParticipantSummary {
            var_rt: Some(0.0),
            ..perfect
        };
        assert!(EzEstimator::invert(&flat).is_none());
    }

    #[test]
    fn test_least_squares_slope() {
        let fit = least_squares(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!(fit.residual_sd.abs() < 1e-9);
        assert!(least_squares(&[1.0, 1.0], &[0.0, 2.0]).is_none());
    }

    #[test]
    fn test_betaweight_recovered_from_group_difference() {
        // Two groups whose drifts differ by exactly 0.5, built from exact moments.
        let trials = 1000;
        let bound = 2.0;
        let nondt = 0.3;
        let drift0 = 4f64.ln() / 2.0;
        let drift1 = drift0 + 0.5;
        let mut participant = Vec::new();
        let mut response_time = Vec::new();
        let mut correct = Vec::new();
        for p in 0..4 {
            let drift = if p % 2 == 0 { drift0 } else { drift1 };
            let m = Moments::predict(bound, drift, nondt);
            let n_correct = (m.accuracy * trials as f64).round() as usize;
            // two-point RTs around the mean with the predicted variance
            let half = n_correct / 2;
            let sd = m.rt_variance.sqrt();
            for i in 0..trials {
                participant.push(p);
                let is_correct = i < n_correct;
                correct.push(is_correct);
                let rt = if !is_correct {
                    1.0
                } else if i < half {
                    m.mean_rt - sd
                } else {
                    m.mean_rt + sd
                };
                response_time.push(rt);
            }
        }
        let data = TrialDataset {
            participant,
            response_time,
            correct,
            trials_per_participant: trials,
            covariate: vec![0.0, 1.0, 0.0, 1.0],
        };

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let estimation = EzEstimator::new()
            .estimate(&data, &Prior::default(), TargetParameter::Drift, &mut rng)
            .unwrap();
        let estimate = estimation.estimate;
        assert!(estimation.posterior.is_none());
        // correct counts are rounded, so recovery is close but not exact
        assert!((estimate.betaweight - 0.5).abs() < 0.05, "betaweight {}", estimate.betaweight);
        assert!((estimate.drift_mean - drift0).abs() < 0.05);
        assert!((estimate.bound_mean - bound).abs() < 0.05);
        assert_eq!(estimate.missing_participants(), 0);
    }

    #[test]
    fn test_too_few_participants_fail() {
        let data = TrialDataset {
            participant: vec![0, 0, 0],
            response_time: vec![0.4, 0.5, 0.6],
            correct: vec![true, true, false],
            trials_per_participant: 3,
            covariate: vec![0.0],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let failure = EzEstimator::new()
            .estimate(&data, &Prior::default(), TargetParameter::Bound, &mut rng)
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::InsufficientData);
    }
}
