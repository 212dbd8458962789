/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Error types for the spectrum module

use crate::utils::UtilsError;
use thiserror::Error;

/// Errors that can occur while handling spectra, calibrations and ROIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient points: need at least {needed}, found {found}")]
    InsufficientPoints { needed: usize, found: usize },

    #[error("Math error: {0}")]
    Math(#[from] UtilsError),
}

/// Result type for spectrum operations
pub type Result<T> = std::result::Result<T, SpectrumError>;
