//! Prior hyperparameters for the hierarchical diffusion model.

use super::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prior distributions over the group-level parameters and the covariate weight.
///
/// Means and the covariate weight are normal; group spreads are uniform on
/// `[lower, upper)`. Created once per design and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prior {
    pub betaweight_mean: f64,
    pub betaweight_sdev: f64,
    pub bound_mean_mean: f64,
    pub bound_mean_sdev: f64,
    pub drift_mean_mean: f64,
    pub drift_mean_sdev: f64,
    pub nondt_mean_mean: f64,
    pub nondt_mean_sdev: f64,
    pub bound_sdev_lower: f64,
    pub bound_sdev_upper: f64,
    pub drift_sdev_lower: f64,
    pub drift_sdev_upper: f64,
    pub nondt_sdev_lower: f64,
    pub nondt_sdev_upper: f64,
}

impl Default for Prior {
    fn default() -> Self {
        Self {
            betaweight_mean: 0.0,
            betaweight_sdev: 1.0,
            bound_mean_mean: 1.50,
            bound_mean_sdev: 0.20,
            drift_mean_mean: 0.00,
            drift_mean_sdev: 0.50,
            nondt_mean_mean: 0.30,
            nondt_mean_sdev: 0.06,
            bound_sdev_lower: 0.10,
            bound_sdev_upper: 0.40,
            drift_sdev_lower: 0.20,
            drift_sdev_upper: 0.40,
            nondt_sdev_lower: 0.05,
            nondt_sdev_upper: 0.25,
        }
    }
}

impl Prior {
    /// Check that every spread is positive and every uniform range is non-empty.
    pub fn validate(&self) -> Result<()> {
        let spreads = [
            ("betaweight_sdev", self.betaweight_sdev),
            ("bound_mean_sdev", self.bound_mean_sdev),
            ("drift_mean_sdev", self.drift_mean_sdev),
            ("nondt_mean_sdev", self.nondt_mean_sdev),
            ("bound_sdev_lower", self.bound_sdev_lower),
            ("drift_sdev_lower", self.drift_sdev_lower),
            ("nondt_sdev_lower", self.nondt_sdev_lower),
        ];
        for (name, value) in spreads {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidPrior(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }

        let ranges = [
            ("bound_sdev", self.bound_sdev_lower, self.bound_sdev_upper),
            ("drift_sdev", self.drift_sdev_lower, self.drift_sdev_upper),
            ("nondt_sdev", self.nondt_sdev_lower, self.nondt_sdev_upper),
        ];
        for (name, lower, upper) in ranges {
            if !(upper.is_finite() && lower < upper) {
                return Err(SimError::InvalidPrior(format!(
                    "{name} requires lower < upper, got [{lower}, {upper}]"
                )));
            }
        }

        let means = [
            ("betaweight_mean", self.betaweight_mean),
            ("bound_mean_mean", self.bound_mean_mean),
            ("drift_mean_mean", self.drift_mean_mean),
            ("nondt_mean_mean", self.nondt_mean_mean),
        ];
        for (name, value) in means {
            if !value.is_finite() {
                return Err(SimError::InvalidPrior(format!("{name} must be finite")));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prior:")?;
        writeln!(f, "  Betaweight Mean:             {}", self.betaweight_mean)?;
        writeln!(f, "  Betaweight Std Dev:          {}", self.betaweight_sdev)?;
        writeln!(f, "  Bound Mean Mean:             {}", self.bound_mean_mean)?;
        writeln!(f, "  Bound Mean Std Dev:          {}", self.bound_mean_sdev)?;
        writeln!(f, "  Drift Mean Mean:             {}", self.drift_mean_mean)?;
        writeln!(f, "  Drift Mean Std Dev:          {}", self.drift_mean_sdev)?;
        writeln!(f, "  Non-decision Time Mean Mean: {}", self.nondt_mean_mean)?;
        writeln!(f, "  Non-decision Time Mean Std:  {}", self.nondt_mean_sdev)?;
        writeln!(
            f,
            "  Bound Std Dev Range:         [{}, {})",
            self.bound_sdev_lower, self.bound_sdev_upper
        )?;
        writeln!(
            f,
            "  Drift Std Dev Range:         [{}, {})",
            self.drift_sdev_lower, self.drift_sdev_upper
        )?;
        write!(
            f,
            "  Non-decision Std Dev Range:  [{}, {})",
            self.nondt_sdev_lower, self.nondt_sdev_upper
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prior_is_valid() {
        assert!(Prior::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let prior = Prior {
            drift_sdev_lower: 0.5,
            drift_sdev_upper: 0.4,
            ..Prior::default()
        };
        assert!(matches!(prior.validate(), Err(SimError::InvalidPrior(_))));
    }

    #[test]
    fn test_nonpositive_spread_rejected() {
        let prior = Prior {
            bound_mean_sdev: 0.0,
            ..Prior::default()
        };
        assert!(matches!(prior.validate(), Err(SimError::InvalidPrior(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let prior: Prior = toml::from_str("betaweight_sdev = 0.5").unwrap();
        assert_eq!(prior.betaweight_sdev, 0.5);
        assert_eq!(prior.bound_mean_mean, 1.5);
    }
}
