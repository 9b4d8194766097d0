//! Pool module - workers that run cell tasks.

mod worker;

pub use worker::*;
