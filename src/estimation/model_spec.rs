//! Textual model specification for the hierarchical EZ diffusion model.
//!
//! The forward equations embedded here are the ones in
//! [`crate::diffusion::forward`]: `Pc`, `MDT`/`MRT` and `PRT`, the reciprocal
//! of the predicted RT variance.

use crate::models::{Prior, Scalar, TargetParameter};
use std::fmt;

/// Group-level mean truncation, shared by the per-participant draws.
const BOUND_TRUNCATION: &str = "T( 0.10, 3.00)";
const DRIFT_TRUNCATION: &str = "T(-3.00, 3.00)";
const NONDT_TRUNCATION: &str = "T( 0.05,)";

/// A model specification bound to one prior and one covariate target.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    prior: Prior,
    target: TargetParameter,
}

impl ModelSpec {
    pub fn new(prior: &Prior, target: TargetParameter) -> Self {
        Self {
            prior: prior.clone(),
            target,
        }
    }

    pub fn target(&self) -> TargetParameter {
        self.target
    }

    /// Nodes to monitor: every group scalar plus the per-participant arrays.
    pub fn monitors() -> Vec<&'static str> {
        Scalar::ALL
            .iter()
            .map(Scalar::name)
            .chain(TargetParameter::ALL.iter().map(TargetParameter::as_str))
            .collect()
    }

    fn participant_mean(&self, param: TargetParameter) -> String {
        if param == self.target {
            format!("{param}_mean + betaweight * X[p]")
        } else {
            format!("{param}_mean")
        }
    }

    /// Render the model block.
    pub fn text(&self) -> String {
        let p = &self.prior;
        format!(
            r#"model {{
    # Priors for the hierarchical diffusion model parameters
    betaweight ~ dnorm({bw_mean}, {bw_prec})
    bound_mean ~ dnorm({b_mean}, {b_prec}) {bt}
    drift_mean ~ dnorm({d_mean}, {d_prec}) {dt}
    nondt_mean ~ dnorm({n_mean}, {n_prec}) {nt}
    bound_sdev ~ dunif({b_lo}, {b_hi})
    drift_sdev ~ dunif({d_lo}, {d_hi})
    nondt_sdev ~ dunif({n_lo}, {n_hi})

    for (p in 1:length(meanRT)) {{
        bound[p] ~ dnorm({bound_mu}, pow(bound_sdev, -2)) {bt}
        drift[p] ~ dnorm({drift_mu}, pow(drift_sdev, -2)) {dt}
        nondt[p] ~ dnorm({nondt_mu}, pow(nondt_sdev, -2)) {nt}

        # Forward equations from EZ diffusion
        ey[p]  = exp(-bound[p] * drift[p])
        Pc[p]  = 1 / (1 + ey[p])
        PRT[p] = 2 * pow(drift[p], 3) / bound[p] * pow(ey[p] + 1, 2) / (2 * -bound[p] * drift[p] * ey[p] - ey[p] * ey[p] + 1)
        MDT[p] = (bound[p] / (2 * drift[p])) * (1 - ey[p]) / (1 + ey[p])
        MRT[p] = MDT[p] + nondt[p]

        # Likelihood of the sufficient statistics
        correct[p] ~ dbin(Pc[p], nTrials[p])
        varRT[p]   ~ dnorm(1 / PRT[p], 0.5 * (correct[p] - 1) * PRT[p] * PRT[p])
        meanRT[p]  ~ dnorm(MRT[p], PRT[p] * correct[p])
    }}
}}
"#,
            bw_mean = p.betaweight_mean,
            bw_prec = p.betaweight_sdev.powi(-2),
            b_mean = p.bound_mean_mean,
            b_prec = p.bound_mean_sdev.powi(-2),
            d_mean = p.drift_mean_mean,
            d_prec = p.drift_mean_sdev.powi(-2),
            n_mean = p.nondt_mean_mean,
            n_prec = p.nondt_mean_sdev.powi(-2),
            b_lo = p.bound_sdev_lower,
            b_hi = p.bound_sdev_upper,
            d_lo = p.drift_sdev_lower,
            d_hi = p.drift_sdev_upper,
            n_lo = p.nondt_sdev_lower,
            n_hi = p.nondt_sdev_upper,
            bt = BOUND_TRUNCATION,
            dt = DRIFT_TRUNCATION,
            nt = NONDT_TRUNCATION,
            bound_mu = self.participant_mean(TargetParameter::Bound),
            drift_mu = self.participant_mean(TargetParameter::Drift),
            nondt_mu = self.participant_mean(TargetParameter::Nondt),
        )
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
