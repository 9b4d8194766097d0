//! Cross-repetition error statistics.

use crate::models::float::nan_as_null;
use crate::models::Scalar;
use serde::{Deserialize, Serialize};

/// Bias and error of one scalar over every repetition that has both a
/// truth and an estimate. NaN when there are none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(with = "nan_as_null")]
    pub mean_error: f64,
    #[serde(with = "nan_as_null")]
    pub mse: f64,
    #[serde(with = "nan_as_null")]
    pub rmse: f64,
    #[serde(with = "nan_as_null")]
    pub mae: f64,
    /// Number of errors the statistics are computed from
    #[serde(default)]
    pub count: usize,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            mean_error: f64::NAN,
            mse: f64::NAN,
            rmse: f64::NAN,
            mae: f64::NAN,
            count: 0,
        }
    }
}

impl Statistics {
    /// Statistics of `truth - estimate` errors.
    pub fn from_errors(errors: impl IntoIterator<Item = f64>) -> Self {
        let (mut sum, mut sum_sq, mut sum_abs, mut count) = (0.0, 0.0, 0.0, 0usize);
        for e in errors {
            sum += e;
            sum_sq += e * e;
            sum_abs += e.abs();
            count += 1;
        }
        if count == 0 {
            return Self::default();
        }
        let n = count as f64;
        let mse = sum_sq / n;
        Self {
            mean_error: sum / n,
            mse,
            rmse: mse.sqrt(),
            mae: sum_abs / n,
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Recovery of one group-level scalar, for report tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarRecovery {
    pub scalar: Scalar,
    pub statistics: Statistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_errors() {
        let stats = Statistics::from_errors([1.0, -1.0, 2.0, -2.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_error, 0.0);
        assert_eq!(stats.mse, 2.5);
        assert!((stats.rmse - 2.5f64.sqrt()).abs() < 1e-15);
        assert_eq!(stats.mae, 1.5);
    }

    #[test]
    fn test_no_errors_is_nan() {
        let stats = Statistics::from_errors(std::iter::empty());
        assert!(stats.is_empty());
        assert!(stats.mean_error.is_nan());
        assert!(stats.rmse.is_nan());
    }

    #[test]
    fn test_nan_statistics_survive_json() {
        let json = serde_json::to_string(&Statistics::default()).unwrap();
        assert!(json.contains("\"mean_error\":null"));
        let back: Statistics = serde_json::from_str(&json).unwrap();
        assert!(back.mse.is_nan());
        assert_eq!(back.count, 0);
    }
}
