//! Checkpoint module for resumable sweeps.
//!
//! Provides:
//! - `CheckpointManager`: persistence, resume and listing of grid artifacts

mod manager;

pub use manager::*;
