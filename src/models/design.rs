//! Design labels: which parameter carries the covariate, and how the covariate is laid out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The latent parameter whose group mean is offset by `betaweight * X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetParameter {
    Bound,
    Drift,
    Nondt,
}

impl TargetParameter {
    pub const ALL: [TargetParameter; 3] = [Self::Drift, Self::Nondt, Self::Bound];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bound => "bound",
            Self::Drift => "drift",
            Self::Nondt => "nondt",
        }
    }
}

impl fmt::Display for TargetParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetParameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bound" => Ok(Self::Bound),
            "drift" => Ok(Self::Drift),
            "nondt" => Ok(Self::Nondt),
            other => Err(format!(
                "unknown target parameter '{other}' (expected bound, drift or nondt)"
            )),
        }
    }
}

/// Layout of the per-participant covariate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignType {
    /// Two alternating groups: `X[i] = i mod 2`.
    Ttest,
    /// Evenly spaced predictor: `X[i] = i / P`.
    Linreg,
}

impl DesignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ttest => "ttest",
            Self::Linreg => "linreg",
        }
    }

    /// Covariate vector for `participants` participants.
    pub fn covariate(&self, participants: usize) -> Vec<f64> {
        match self {
            Self::Ttest => (0..participants).map(|i| (i % 2) as f64).collect(),
            Self::Linreg => (0..participants)
                .map(|i| i as f64 / participants as f64)
                .collect(),
        }
    }
}

impl fmt::Display for DesignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ttest" => Ok(Self::Ttest),
            "linreg" => Ok(Self::Linreg),
            other => Err(format!(
                "unknown design type '{other}' (expected ttest or linreg)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttest_covariate_alternates() {
        assert_eq!(DesignType::Ttest.covariate(5), vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_linreg_covariate_is_evenly_spaced() {
        assert_eq!(DesignType::Linreg.covariate(4), vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("Drift".parse::<TargetParameter>(), Ok(TargetParameter::Drift));
        assert_eq!("linreg".parse::<DesignType>(), Ok(DesignType::Linreg));
        assert!("rate".parse::<TargetParameter>().is_err());
    }
}
