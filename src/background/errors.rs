/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Error types for the background module

use crate::utils::UtilsError;
use thiserror::Error;

/// Errors that can occur during background estimation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackgroundError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Math error: {0}")]
    Math(#[from] UtilsError),
}

/// Result type for background operations
pub type Result<T> = std::result::Result<T, BackgroundError>;
