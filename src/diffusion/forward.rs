//! Closed-form EZ diffusion equations.
//!
//! Unit-noise convention (s = 1), unbiased starting point. These are the same
//! expressions written into the estimation engine's model specification by
//! [`crate::estimation::ModelSpec`]; keep the two in step.

/// Below this |bound * drift| the exact expressions lose precision to
/// cancellation and the zero-drift limits are used instead.
const SMALL_PRODUCT: f64 = 1e-3;

/// Predicted summary statistics of correct responses for one participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    /// Probability of reaching the upper (correct) boundary.
    pub accuracy: f64,
    /// Mean response time, decision time plus `nondt`.
    pub mean_rt: f64,
    /// Response-time variance (`nondt` does not contribute).
    pub rt_variance: f64,
}

impl Moments {
    pub fn predict(bound: f64, drift: f64, nondt: f64) -> Self {
        Self {
            accuracy: accuracy_probability(bound, drift),
            mean_rt: predicted_mean_rt(bound, drift, nondt),
            rt_variance: predicted_rt_variance(bound, drift),
        }
    }
}

/// `1 / (1 + exp(-bound * drift))`.
pub fn accuracy_probability(bound: f64, drift: f64) -> f64 {
    1.0 / (1.0 + (-bound * drift).exp())
}

/// Mean first-passage (decision) time.
pub fn mean_decision_time(bound: f64, drift: f64) -> f64 {
    let product = bound * drift;
    if product.abs() < SMALL_PRODUCT {
        // tanh(x)/x ≈ 1 - x²/3 with x = bound*drift/2
        return bound * bound / 4.0 * (1.0 - product * product / 12.0);
    }
    let ey = (-product).exp();
    (bound / (2.0 * drift)) * (1.0 - ey) / (1.0 + ey)
}

/// Predicted mean response time: decision time plus `nondt`.
pub fn predicted_mean_rt(bound: f64, drift: f64, nondt: f64) -> f64 {
    mean_decision_time(bound, drift) + nondt
}

/// Predicted response-time variance, the reciprocal of the model's RT precision.
pub fn predicted_rt_variance(bound: f64, drift: f64) -> f64 {
    let product = bound * drift;
    if product.abs() < SMALL_PRODUCT {
        return bound.powi(4) / 24.0;
    }
    let ey = (-product).exp();
    let numerator = 1.0 - 2.0 * product * ey - ey * ey;
    (bound / (2.0 * drift.powi(3))) * numerator / (ey + 1.0).powi(2)
}

/// RT precision as written in the model specification: `1 / variance`.
pub fn predicted_rt_precision(bound: f64, drift: f64) -> f64 {
    1.0 / predicted_rt_variance(bound, drift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-12)
    }

    #[test]
    fn test_accuracy_symmetry() {
        assert_eq!(accuracy_probability(1.5, 0.0), 0.5);
        let up = accuracy_probability(1.5, 0.8);
        let down = accuracy_probability(1.5, -0.8);
        assert!((up + down - 1.0).abs() < 1e-12);
        assert!(up > 0.5);
    }

    #[test]
    fn test_known_values() {
        // bound = 2, drift = 1: ey = e^-2
        let ey = (-2.0f64).exp();
        let mdt = (1.0 - ey) / (1.0 + ey);
        assert!(close(mean_decision_time(2.0, 1.0), mdt, 1e-12));
        let var = (1.0 - 4.0 * ey - ey * ey) / (ey + 1.0).powi(2);
        assert!(close(predicted_rt_variance(2.0, 1.0), var, 1e-12));
        assert!(close(predicted_mean_rt(2.0, 1.0, 0.3), mdt + 0.3, 1e-12));
    }

    #[test]
    fn test_zero_drift_limits_are_finite() {
        let mdt = mean_decision_time(1.5, 0.0);
        let var = predicted_rt_variance(1.5, 0.0);
        assert!(close(mdt, 1.5f64.powi(2) / 4.0, 1e-12));
        assert!(close(var, 1.5f64.powi(4) / 24.0, 1e-12));
        assert!(predicted_rt_precision(1.5, 0.0).is_finite());
    }

    #[test]
    fn test_limits_are_continuous() {
        for &bound in &[0.5, 1.5, 2.5] {
            let eps = SMALL_PRODUCT / bound;
            let inside = predicted_rt_variance(bound, eps * 0.999);
            let outside = predicted_rt_variance(bound, eps * 1.001);
            assert!(close(inside, outside, 1e-4), "variance jump at bound {bound}");

            let inside = mean_decision_time(bound, eps * 0.999);
            let outside = mean_decision_time(bound, eps * 1.001);
            assert!(close(inside, outside, 1e-6), "mean jump at bound {bound}");
        }
    }

    #[test]
    fn test_moments_even_in_drift() {
        let pos = Moments::predict(1.2, 0.7, 0.25);
        let neg = Moments::predict(1.2, -0.7, 0.25);
        assert!(close(pos.mean_rt, neg.mean_rt, 1e-12));
        assert!(close(pos.rt_variance, neg.rt_variance, 1e-12));
        assert!(close(pos.accuracy, 1.0 - neg.accuracy, 1e-12));
    }
}
