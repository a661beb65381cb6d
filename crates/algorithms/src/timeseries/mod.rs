//! Per-pixel time-series models
//!
//! - **harmonic**: OLS fit of constant, linear trend and one annual harmonic

mod harmonic;

pub use harmonic::{fit_harmonic, HarmonicParams, HarmonicTarget, HARMONIC_BANDS};
