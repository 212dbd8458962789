/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Reading and writing analysis inputs
//!
//! This module handles the three kinds of files the command line tool works
//! with: JSON job files, peak-list text files and plain counts files.

pub mod config;
pub mod errors;
pub mod peaks;
pub mod spectrum;

pub use config::{AnalysisConfig, FitOptions};
pub use errors::{InputError, Result};
pub use peaks::{format_peaks, parse_peak_line, parse_peaks, read_peaks, write_peaks, PeakList};
pub use spectrum::{parse_spectrum, read_spectrum, write_spectrum};
