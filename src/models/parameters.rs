//! Parameter sets: ground truth drawn from the prior, or estimates recovered from data.

use super::float::nan_as_null;
use super::{Prior, Result, SimError, TargetParameter};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// Group-level scalar of a [`ParameterSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Betaweight,
    BoundMean,
    DriftMean,
    NondtMean,
    BoundSdev,
    DriftSdev,
    NondtSdev,
}

impl Scalar {
    pub const ALL: [Scalar; 7] = [
        Self::Betaweight,
        Self::BoundMean,
        Self::DriftMean,
        Self::NondtMean,
        Self::BoundSdev,
        Self::DriftSdev,
        Self::NondtSdev,
    ];

    /// Name used in model specifications and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Betaweight => "betaweight",
            Self::BoundMean => "bound_mean",
            Self::DriftMean => "drift_mean",
            Self::NondtMean => "nondt_mean",
            Self::BoundSdev => "bound_sdev",
            Self::DriftSdev => "drift_sdev",
            Self::NondtSdev => "nondt_sdev",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A full set of latent parameters for one simulated experiment.
///
/// Per-participant entries are `None` when a participant was dropped from
/// estimation. Equality is exact on every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(with = "nan_as_null")]
    pub betaweight: f64,

    #[serde(with = "nan_as_null")]
    pub bound_mean: f64,
    #[serde(with = "nan_as_null")]
    pub bound_sdev: f64,
    #[serde(with = "nan_as_null")]
    pub drift_mean: f64,
    #[serde(with = "nan_as_null")]
    pub drift_sdev: f64,
    #[serde(with = "nan_as_null")]
    pub nondt_mean: f64,
    #[serde(with = "nan_as_null")]
    pub nondt_sdev: f64,

    pub bound: Vec<Option<f64>>,
    pub drift: Vec<Option<f64>>,
    pub nondt: Vec<Option<f64>>,
}

impl ParameterSet {
    /// Draw a ground-truth parameter set from the prior.
    ///
    /// The covariate offset `betaweight * covariate[i]` is applied to the
    /// target parameter's mean only. Per-participant draws are NOT truncated.
    pub fn sample<R: Rng + ?Sized>(
        prior: &Prior,
        target: TargetParameter,
        covariate: &[f64],
        rng: &mut R,
    ) -> Result<Self> {
        prior.validate()?;
        let betaweight = normal(prior.betaweight_mean, prior.betaweight_sdev)?.sample(rng);
        let bound_mean = normal(prior.bound_mean_mean, prior.bound_mean_sdev)?.sample(rng);
        let drift_mean = normal(prior.drift_mean_mean, prior.drift_mean_sdev)?.sample(rng);
        let nondt_mean = normal(prior.nondt_mean_mean, prior.nondt_mean_sdev)?.sample(rng);
        let bound_sdev = rng.gen_range(prior.bound_sdev_lower..prior.bound_sdev_upper);
        let drift_sdev = rng.gen_range(prior.drift_sdev_lower..prior.drift_sdev_upper);
        let nondt_sdev = rng.gen_range(prior.nondt_sdev_lower..prior.nondt_sdev_upper);

        let mut draw = |param: TargetParameter, mean: f64, sdev: f64| -> Result<Vec<Option<f64>>> {
            let weight = if param == target { betaweight } else { 0.0 };
            let mut values = Vec::with_capacity(covariate.len());
            for x in covariate {
                values.push(Some(normal(mean + weight * x, sdev)?.sample(&mut *rng)));
            }
            Ok(values)
        };

        let bound = draw(TargetParameter::Bound, bound_mean, bound_sdev)?;
        let drift = draw(TargetParameter::Drift, drift_mean, drift_sdev)?;
        let nondt = draw(TargetParameter::Nondt, nondt_mean, nondt_sdev)?;

        Ok(Self {
            betaweight,
            bound_mean,
            bound_sdev,
            drift_mean,
            drift_sdev,
            nondt_mean,
            nondt_sdev,
            bound,
            drift,
            nondt,
        })
    }

    /// Number of participants covered by this set.
    pub fn participants(&self) -> usize {
        self.bound.len().max(self.drift.len()).max(self.nondt.len())
    }

    /// Value of a group-level scalar.
    pub fn scalar(&self, which: Scalar) -> f64 {
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

    /// Per-participant sequence of one latent parameter.
    pub fn participant_values(&self, which: TargetParameter) -> &[Option<f64>] {
        match which {
            TargetParameter::Bound => &self.bound,
            TargetParameter::Drift => &self.drift,
            TargetParameter::Nondt => &self.nondt,
        }
    }

    /// `(bound, drift, nondt)` for participant `index`, if all three are present.
    pub fn participant(&self, index: usize) -> Option<(f64, f64, f64)> {
        let bound = (*self.bound.get(index)?)?;
        let drift = (*self.drift.get(index)?)?;
        let nondt = (*self.nondt.get(index)?)?;
        Some((bound, drift, nondt))
    }

    /// Count of participants with at least one missing entry.
    pub fn missing_participants(&self) -> usize {
        (0..self.participants())
            .filter(|&i| self.participant(i).is_none())
            .count()
    }
}

fn normal(mean: f64, sdev: f64) -> Result<Normal<f64>> {
    Normal::new(mean, sdev)
        .map_err(|e| SimError::InvalidPrior(format!("normal({mean}, {sdev}): {e}")))
}

/// Element-wise difference; a missing entry on either side stays missing.
/// Sequences of unequal length are padded with missing entries.
fn sub_values(lhs: &[Option<f64>], rhs: &[Option<f64>]) -> Vec<Option<f64>> {
    let len = lhs.len().max(rhs.len());
    (0..len)
        .map(|i| match (lhs.get(i).copied().flatten(), rhs.get(i).copied().flatten()) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        })
        .collect()
}

impl Sub for &ParameterSet {
    type Output = ParameterSet;

    fn sub(self, other: &ParameterSet) -> ParameterSet {
        ParameterSet {
            betaweight: self.betaweight - other.betaweight,
            bound_mean: self.bound_mean - other.bound_mean,
            bound_sdev: self.bound_sdev - other.bound_sdev,
            drift_mean: self.drift_mean - other.drift_mean,
            drift_sdev: self.drift_sdev - other.drift_sdev,
            nondt_mean: self.nondt_mean - other.nondt_mean,
            nondt_sdev: self.nondt_sdev - other.nondt_sdev,
            bound: sub_values(&self.bound, &other.bound),
            drift: sub_values(&self.drift, &other.drift),
            nondt: sub_values(&self.nondt, &other.nondt),
        }
    }
}

impl Sub for ParameterSet {
    type Output = ParameterSet;

    fn sub(self, other: ParameterSet) -> ParameterSet {
        &self - &other
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seq = |values: &[Option<f64>]| {
            values
                .iter()
                .map(|v| v.map_or_else(|| "NA".to_string(), |v| format!("{v:.4}")))
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(f, "Parameter set:")?;
        writeln!(f, "  Betaweight:              {:.4}", self.betaweight)?;
        writeln!(f, "  Bound Mean:              {:.4}", self.bound_mean)?;
        writeln!(f, "  Bound Std Dev:           {:.4}", self.bound_sdev)?;
        writeln!(f, "  Drift Mean:              {:.4}", self.drift_mean)?;
        writeln!(f, "  Drift Std Dev:           {:.4}", self.drift_sdev)?;
        writeln!(f, "  Non-decision Time Mean:  {:.4}", self.nondt_mean)?;
        writeln!(f, "  Non-decision Time Std:   {:.4}", self.nondt_sdev)?;
        writeln!(f, "  Bound:                   [{}]", seq(&self.bound))?;
        writeln!(f, "  Drift:                   [{}]", seq(&self.drift))?;
        write!(f, "  Non-decision Time:       [{}]", seq(&self.nondt))
    }
}
