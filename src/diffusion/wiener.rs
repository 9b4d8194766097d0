//! Wiener first-passage time sampler.
//!
//! Random-walk over inscribed intervals: from the current position the walk
//! jumps to one edge of the largest interval that fits between the
//! boundaries. The exit time of that interval is drawn by rejection from its
//! series representation and the exit side from its closed-form probability.
//! With an unbiased start the first interval already touches both boundaries,
//! so every trial finishes in a single step.

use crate::models::GeneratorError;
use rand::{Rng, RngCore};
use std::f64::consts::PI;

/// Trial-level output of one generator call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trials {
    pub response_time: Vec<f64>,
    pub correct: Vec<bool>,
}

impl Trials {
    pub fn len(&self) -> usize {
        self.response_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.response_time.is_empty()
    }

    pub fn correct_count(&self) -> usize {
        self.correct.iter().filter(|&&c| c).count()
    }
}

/// Source of synthetic diffusion trials.
///
/// With `nondt >= 0`, `correct[i]` is true iff the upper boundary was
/// reached. Response times are never negative.
pub trait ResponseTimeGenerator: Send + Sync {
    fn simulate(
        &self,
        bound: f64,
        drift: f64,
        nondt: f64,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Trials, GeneratorError>;
}

/// Exact sampler for the unbiased two-boundary Wiener process.
#[derive(Debug, Clone)]
pub struct WienerGenerator {
    /// Starting point as a proportion of the boundary separation.
    bias: f64,
}

impl Default for WienerGenerator {
    fn default() -> Self {
        Self { bias: 0.5 }
    }
}

/// Parameters are rescaled by this factor so the walk runs with noise 0.1.
const SCALE: f64 = 10.0;
/// Diffusion coefficient `s² / 2` for `s = 0.1`.
const DIFFUSION: f64 = 0.005;
/// Series truncation and boundary-hit tolerance.
const EPSILON: f64 = 1e-15;

impl WienerGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One first-passage draw: `(decision_time, hit_upper)`.
    fn draw_one(&self, bound: f64, drift: f64, rng: &mut dyn RngCore) -> (f64, bool) {
        let a = bound / SCALE;
        let v = drift / SCALE;
        let z = a * self.bias;
        let upper = a - z;
        let lower = -z;

        let mut position = 0.0;
        let mut time = 0.0;
        let mut radius = upper.abs().min(lower.abs());

        loop {
            let (lambda, f, prob) = if v == 0.0 {
                (0.25 * DIFFUSION * PI * PI / (radius * radius), 1.0, 0.5)
            } else {
                let ratio = DIFFUSION * PI / (radius * v);
                let lambda = 0.25 * v * v / DIFFUSION + 0.25 * DIFFUSION * PI * PI / (radius * radius);
                let f = ratio * ratio / (1.0 + ratio * ratio);
                let prob = 1.0 / (1.0 + (-radius * v / DIFFUSION).exp());
                (lambda, f, prob)
            };
            let direction = if rng.gen::<f64>() < prob { 1.0 } else { -1.0 };

            let s1 = loop {
                let s1 = 0.00001 + 0.99998 * rng.gen::<f64>();
                let s2 = 0.00001 + 0.99998 * rng.gen::<f64>();
                let l = 1.0 + s1.powf(-f) * exit_time_series(s1, f);
                if s2 <= l {
                    break s1;
                }
            };

            time += s1.ln().abs() / lambda;
            let next = position + direction * radius;

            if next + EPSILON > upper {
                return (time, true);
            }
            if next - EPSILON < lower {
                return (time, false);
            }
            position = next;
            radius = (upper - position).abs().min((lower - position).abs());
        }
    }
}

/// Alternating series of the interval exit-time density, summed until the
/// terms fall below [`EPSILON`].
fn exit_time_series(s1: f64, f: f64) -> f64 {
    let mut total = 0.0;
    let mut k: u32 = 0;
    loop {
        k += 1;
        let tt = f64::from(2 * k + 1);
        let sign = if k % 2 == 1 { -1.0 } else { 1.0 };
        let term = tt * sign * s1.powf(f * tt * tt);
        total += term;
        if term.abs() <= EPSILON {
            return total;
        }
    }
}

impl ResponseTimeGenerator for WienerGenerator {
    fn simulate(
        &self,
        bound: f64,
        drift: f64,
        nondt: f64,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Trials, GeneratorError> {
        let valid = bound.is_finite() && bound > 0.0 && drift.is_finite() && nondt.is_finite();
        if !valid || n == 0 {
            return Err(GeneratorError::InvalidParameters {
                bound,
                drift,
                nondt,
                n,
            });
        }

        let mut trials = Trials {
            response_time: Vec::with_capacity(n),
            correct: Vec::with_capacity(n),
        };
        for _ in 0..n {
            let (decision_time, upper) = self.draw_one(bound, drift, rng);
            // signed coding: upper is positive. A negative nondt can flip the sign.
            let total = decision_time + nondt;
            let signed = if upper { total } else { -total };
            trials.response_time.push(signed.abs());
            trials.correct.push(signed > 0.0);
        }
        Ok(trials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::forward::Moments;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mean_var(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let generator = WienerGenerator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(generator.simulate(0.0, 1.0, 0.3, 10, &mut rng).is_err());
        assert!(generator.simulate(-1.0, 1.0, 0.3, 10, &mut rng).is_err());
        assert!(generator.simulate(1.5, f64::NAN, 0.3, 10, &mut rng).is_err());
        assert!(generator.simulate(1.5, 1.0, 0.3, 0, &mut rng).is_err());
    }

    #[test]
    fn test_negative_nondt_flips_coding() {
        let generator = WienerGenerator::new();
        let shifted = generator
            .simulate(1.0, 0.5, 5.0, 200, &mut ChaCha8Rng::seed_from_u64(2))
            .unwrap();
        let flipped = generator
            .simulate(1.0, 0.5, -5.0, 200, &mut ChaCha8Rng::seed_from_u64(2))
            .unwrap();
        assert_eq!(flipped.len(), 200);
        assert_eq!(flipped.correct.len(), 200);

        // same decision times t: |t + 5| + |t - 5| = 10 while t < 5
        for i in 0..200 {
            assert!(flipped.response_time[i] > 0.0);
            assert!((shifted.response_time[i] + flipped.response_time[i] - 10.0).abs() < 1e-9);
            assert_eq!(flipped.correct[i], !shifted.correct[i]);
        }
    }

    #[test]
    fn test_moments_match_forward_model() {
        let generator = WienerGenerator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (bound, drift, nondt) = (1.5, 1.0, 0.3);
        let trials = generator.simulate(bound, drift, nondt, 20_000, &mut rng).unwrap();

        let predicted = Moments::predict(bound, drift, nondt);
        let accuracy = trials.correct_count() as f64 / trials.len() as f64;
        assert!((accuracy - predicted.accuracy).abs() < 0.02, "accuracy {accuracy}");

        let correct_rts: Vec<f64> = trials
            .response_time
            .iter()
            .zip(&trials.correct)
            .filter(|&(_, &c)| c)
            .map(|(&rt, _)| rt)
            .collect();
        let (mean, var) = mean_var(&correct_rts);
        assert!(
            (mean - predicted.mean_rt).abs() < 0.05 * predicted.mean_rt,
            "mean {mean} vs {}",
            predicted.mean_rt
        );
        assert!(
            (var - predicted.rt_variance).abs() < 0.1 * predicted.rt_variance,
            "variance {var} vs {}",
            predicted.rt_variance
        );
    }

    #[test]
    fn test_zero_drift_is_balanced() {
        let generator = WienerGenerator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let trials = generator.simulate(1.2, 0.0, 0.2, 10_000, &mut rng).unwrap();
        let accuracy = trials.correct_count() as f64 / trials.len() as f64;
        assert!((accuracy - 0.5).abs() < 0.03);
    }

    #[test]
    fn test_seeded_runs_reproduce() {
        let generator = WienerGenerator::new();
        let a = generator
            .simulate(1.5, 0.4, 0.3, 50, &mut ChaCha8Rng::seed_from_u64(9))
            .unwrap();
        let b = generator
            .simulate(1.5, 0.4, 0.3, 50, &mut ChaCha8Rng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }
}
