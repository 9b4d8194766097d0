//! Calibration quantiles and their uniformity check.
//!
//! For a well-calibrated inference procedure the fraction of posterior draws
//! below the ground truth is uniform on (0, 1) across repetitions.

use crate::estimation::Posterior;
use crate::models::{ParameterSet, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of histogram bins in a [`CalibrationReport`].
pub const HISTOGRAM_BINS: usize = 10;

/// Fraction of `draws` strictly less than `truth`; `None` without draws.
pub fn quantile_of(draws: &[f64], truth: f64) -> Option<f64> {
    if draws.is_empty() {
        return None;
    }
    let below = draws.iter().filter(|&&d| d < truth).count();
    Some(below as f64 / draws.len() as f64)
}

/// Calibration quantile of every group-level scalar for one repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantile {
    pub betaweight: f64,
    pub bound_mean: f64,
    pub drift_mean: f64,
    pub nondt_mean: f64,
    pub bound_sdev: f64,
    pub drift_sdev: f64,
    pub nondt_sdev: f64,
}

impl Quantile {
    /// `None` when there is no posterior or a scalar has no draws.
    pub fn compute(posterior: Option<&Posterior>, truth: &ParameterSet) -> Option<Self> {
        let posterior = posterior?;
        let q = |which: Scalar| quantile_of(posterior.scalar_draws(which), truth.scalar(which));
        Some(Self {
            betaweight: q(Scalar::Betaweight)?,
            bound_mean: q(Scalar::BoundMean)?,
            drift_mean: q(Scalar::DriftMean)?,
            nondt_mean: q(Scalar::NondtMean)?,
            bound_sdev: q(Scalar::BoundSdev)?,
            drift_sdev: q(Scalar::DriftSdev)?,
            nondt_sdev: q(Scalar::NondtSdev)?,
        })
    }

    pub fn get(&self, which: Scalar) -> f64 {
        match which {
            Scalar::Betaweight => self.betaweight,
            Scalar::BoundMean => self.bound_mean,
            Scalar::DriftMean => self.drift_mean,
            Scalar::NondtMean => self.nondt_mean,
            Scalar::BoundSdev => self.bound_sdev,
            Scalar::DriftSdev => self.drift_sdev,
            Scalar::NondtSdev => self.nondt_sdev,
        }
    }
}

/// Uniformity summary of one scalar's quantiles.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub scalar: Scalar,
    pub count: usize,
    pub histogram: [usize; HISTOGRAM_BINS],
    /// Kolmogorov–Smirnov distance to U(0, 1)
    pub ks_statistic: f64,
    /// Asymptotic p-value of `ks_statistic`
    pub p_value: f64,
}

impl CalibrationReport {
    pub fn from_quantiles(scalar: Scalar, quantiles: &[f64]) -> Self {
        let mut histogram = [0usize; HISTOGRAM_BINS];
        for &q in quantiles {
            let bin = ((q * HISTOGRAM_BINS as f64) as usize).min(HISTOGRAM_BINS - 1);
            histogram[bin] += 1;
        }
        let (ks_statistic, p_value) = ks_uniform(quantiles);
        Self {
            scalar,
            count: quantiles.len(),
            histogram,
            ks_statistic,
            p_value,
        }
    }

    /// Whether uniformity is not rejected at level `alpha`.
    pub fn is_calibrated(&self, alpha: f64) -> bool {
        self.count > 0 && self.p_value >= alpha
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bars: Vec<String> = self.histogram.iter().map(|c| c.to_string()).collect();
        write!(
            f,
            "{:<11} n={:<5} D={:.4} p={:.4} [{}]",
            self.scalar.name(),
            self.count,
            self.ks_statistic,
            self.p_value,
            bars.join(" ")
        )
    }
}

/// One-sample Kolmogorov–Smirnov test against U(0, 1).
///
/// Returns `(D, p)`; `(NaN, NaN)` for an empty sample.
pub fn ks_uniform(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let d = sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let x = x.clamp(0.0, 1.0);
            let above = (i + 1) as f64 / n - x;
            let below = x - i as f64 / n;
            above.max(below)
        })
        .fold(0.0f64, f64::max);

    let sqrt_n = n.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    (d, kolmogorov_q(lambda))
}

/// Complementary Kolmogorov distribution `Q(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0f64;
    for k in 1..=100 {
        let kf = k as f64;
        let term = fac * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 0.001 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        previous = term.abs();
    }
    // no convergence: λ is tiny and the fit is perfect
    1.0
}
