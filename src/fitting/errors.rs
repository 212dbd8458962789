/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Error types for the fitting module

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A global calibration curve shared by all peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalCurve {
    /// `energy = offset + slope * channel`
    Energy,
    /// `fwhm = offset + slope * sqrt(energy)`
    Fwhm,
}

impl fmt::Display for GlobalCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalCurve::Energy => write!(f, "energy calibration"),
            GlobalCurve::Fwhm => write!(f, "FWHM calibration"),
        }
    }
}

/// Errors that can occur during peak fitting
///
/// Solver non-convergence is not an error; it is reported through the
/// status of the returned fit state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot optimize the {curve}: {anchors} peak(s) use it, at least 2 are needed")]
    InsufficientConstraints { curve: GlobalCurve, anchors: usize },
}

/// Result type for fitting operations
pub type Result<T> = std::result::Result<T, FitError>;
