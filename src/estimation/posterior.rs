//! Fixed-shape posterior draws.

use super::NamedDraws;
use crate::models::{EngineError, ParameterSet, Scalar, SummaryData, TargetParameter};

const SCALARS: usize = Scalar::ALL.len();

/// Posterior draws for every parameter of the hierarchical model.
///
/// Per-participant draws are `None` for participants excluded from the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    scalars: [Vec<f64>; SCALARS],
    bound: Vec<Option<Vec<f64>>>,
    drift: Vec<Option<Vec<f64>>>,
    nondt: Vec<Option<Vec<f64>>>,
}

fn scalar_index(which: Scalar) -> usize {
    Scalar::ALL
        .iter()
        .position(|&s| s == which)
        .unwrap_or_default()
}

impl Posterior {
    /// Reshape named engine draws (`"betaweight"`, `"bound[3]"`, ...).
    ///
    /// Array element `k` (1-based) belongs to `data.participants[k - 1]`.
    pub fn from_draws(draws: &NamedDraws, data: &SummaryData) -> Result<Self, EngineError> {
        let take = |name: &str| -> Result<Vec<f64>, EngineError> {
            match draws.get(name) {
                Some(values) if !values.is_empty() => Ok(values.clone()),
                _ => Err(EngineError::MissingMonitor(name.to_string())),
            }
        };

        let mut scalars: [Vec<f64>; SCALARS] = Default::default();
        for (slot, which) in scalars.iter_mut().zip(Scalar::ALL) {
            *slot = take(which.name())?;
        }

        let mut arrays = [
            vec![None; data.total_participants],
            vec![None; data.total_participants],
            vec![None; data.total_participants],
        ];
        let params = [TargetParameter::Bound, TargetParameter::Drift, TargetParameter::Nondt];
        for (row, &participant) in data.participants.iter().enumerate() {
            for (array, param) in arrays.iter_mut().zip(params) {
                let values = take(&format!("{param}[{}]", row + 1))?;
                if let Some(slot) = array.get_mut(participant) {
                    *slot = Some(values);
                }
            }
        }
        let [bound, drift, nondt] = arrays;

        Ok(Self {
            scalars,
            bound,
            drift,
            nondt,
        })
    }

    pub fn scalar_draws(&self, which: Scalar) -> &[f64] {
        &self.scalars[scalar_index(which)]
    }

    pub fn participant_draws(&self, which: TargetParameter, index: usize) -> Option<&[f64]> {
        let array = match which {
            TargetParameter::Bound => &self.bound,
            TargetParameter::Drift => &self.drift,
            TargetParameter::Nondt => &self.nondt,
        };
        array.get(index)?.as_deref()
    }

    /// Posterior means; excluded participants stay missing.
    pub fn point_estimate(&self) -> ParameterSet {
        let reduce = |array: &[Option<Vec<f64>>]| -> Vec<Option<f64>> {
            array.iter().map(|d| d.as_deref().map(mean)).collect()
        };
        let s = |which| mean(self.scalar_draws(which));
        ParameterSet {
            betaweight: s(Scalar::Betaweight),
            bound_mean: s(Scalar::BoundMean),
            bound_sdev: s(Scalar::BoundSdev),
            drift_mean: s(Scalar::DriftMean),
            drift_sdev: s(Scalar::DriftSdev),
            nondt_mean: s(Scalar::NondtMean),
            nondt_sdev: s(Scalar::NondtSdev),
            bound: reduce(&self.bound),
            drift: reduce(&self.drift),
            nondt: reduce(&self.nondt),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draws_for(retained: usize) -> NamedDraws {
        let mut draws = NamedDraws::new();
        for (i, which) in Scalar::ALL.iter().enumerate() {
            draws.insert(which.name().to_string(), vec![i as f64, i as f64 + 2.0]);
        }
        for k in 1..=retained {
            draws.insert(format!("bound[{k}]"), vec![k as f64; 4]);
            draws.insert(format!("drift[{k}]"), vec![-(k as f64); 4]);
            draws.insert(format!("nondt[{k}]"), vec![0.1 * k as f64; 4]);
        }
        draws
    }

    fn data(participants: Vec<usize>, total: usize) -> SummaryData {
        SummaryData {
            participants,
            total_participants: total,
            ..SummaryData::default()
        }
    }

    #[test]
    fn test_excluded_participants_stay_missing() {
        let posterior = Posterior::from_draws(&draws_for(2), &data(vec![0, 2], 3)).unwrap();
        let estimate = posterior.point_estimate();

        assert_eq!(estimate.bound, vec![Some(1.0), None, Some(2.0)]);
        assert_eq!(estimate.drift, vec![Some(-1.0), None, Some(-2.0)]);
        assert_eq!(estimate.participants(), 3);
        assert!(posterior.participant_draws(TargetParameter::Nondt, 1).is_none());
        assert_eq!(
            posterior.participant_draws(TargetParameter::Nondt, 2).map(<[f64]>::len),
            Some(4)
        );
    }

    #[test]
    fn test_scalars_reduce_to_means() {
        let posterior = Posterior::from_draws(&draws_for(1), &data(vec![0], 1)).unwrap();
        let estimate = posterior.point_estimate();
        assert_eq!(estimate.betaweight, 1.0);
        assert_eq!(estimate.nondt_sdev, 7.0);
        assert_eq!(posterior.scalar_draws(Scalar::DriftMean), &[2.0, 4.0]);
    }

    #[test]
    fn test_missing_monitor_is_reported() {
        let mut draws = draws_for(2);
        draws.remove("drift[2]");
        let err = Posterior::from_draws(&draws, &data(vec![0, 1], 2)).unwrap_err();
        assert!(matches!(err, EngineError::MissingMonitor(name) if name == "drift[2]"));
    }
}
