//! Repetition loop of a single design point and its aggregates.

mod calibration;
mod cell;
mod statistics;

pub use calibration::{ks_uniform, quantile_of, CalibrationReport, Quantile, HISTOGRAM_BINS};
pub use cell::{
    FailureRecord, Repetition, RepetitionFailure, ReportStyle, RunReport, SimulationCell,
};
pub use statistics::{ScalarRecovery, Statistics};
