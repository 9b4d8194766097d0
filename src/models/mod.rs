//! Core data models for ezbhddm.
//!
//! Priors and parameter sets, synthetic datasets and their summaries,
//! design labels, configuration, and the error taxonomy.

mod config;
mod dataset;
mod design;
mod error;
pub mod float;
mod parameters;
mod prior;

pub use config::*;
pub use dataset::*;
pub use design::*;
pub use error::*;
pub use parameters::*;
pub use prior::*;
