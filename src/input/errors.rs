/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Error types for reading and writing analysis inputs

use crate::fitting::FitError;
use std::io;
use thiserror::Error;

/// Errors that can occur while reading or writing input files
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Invalid input format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid peak: {0}")]
    Peak(#[from] FitError),
}

impl InputError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        InputError::ParseError {
            line,
            message: message.into(),
        }
    }
}

/// Result type for input operations
pub type Result<T> = std::result::Result<T, InputError>;
