//! Diffusion model: closed-form forward equations and a trial generator.

pub mod forward;
pub mod wiener;

pub use forward::{
    accuracy_probability, mean_decision_time, predicted_mean_rt, predicted_rt_precision,
    predicted_rt_variance, Moments,
};
pub use wiener::{ResponseTimeGenerator, Trials, WienerGenerator};
