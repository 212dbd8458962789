/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! JSON job configuration
//!
//! A job file bundles everything needed to analyse one spectrum:
//!
//! ```json
//! {
//!   "spectrum": "detector1.txt",
//!   "peaks": "calibration.pks",
//!   "calibration": { "offset": 0.0, "slope": 0.01 },
//!   "background": { "bottom_width": 2.0, "compress": 4 },
//!   "fit": { "chi_exponent": 0.5, "max_iterations": 50 }
//! }
//! ```
//!
//! Relative paths are resolved against the directory of the job file.

use super::errors::{InputError, Result};
use crate::background::BackgroundParameters;
use crate::fitting::{CalibrationMode, FitState};
use crate::spectrum::{Calibration, RegionOfInterest};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Solver settings and initial global curves for a peak fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub energy_flag: CalibrationMode,
    pub fwhm_flag: CalibrationMode,
    pub fwhm_offset: f64,
    pub fwhm_slope: f64,
    pub chi_exponent: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Number of channels to fit, 0 for the whole spectrum
    pub n_channels: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        let state = FitState::default();
        Self {
            energy_flag: state.energy_flag,
            fwhm_flag: state.fwhm_flag,
            fwhm_offset: state.fwhm_offset,
            fwhm_slope: state.fwhm_slope,
            chi_exponent: state.chi_exponent,
            max_iterations: state.max_iterations,
            tolerance: state.tolerance,
            n_channels: state.n_channels,
        }
    }
}

impl FitOptions {
    /// Initial fit state for a spectrum with the given calibration
    pub fn to_state(&self, calibration: &Calibration) -> FitState {
        FitState {
            energy_flag: self.energy_flag,
            fwhm_flag: self.fwhm_flag,
            fwhm_offset: self.fwhm_offset,
            fwhm_slope: self.fwhm_slope,
            chi_exponent: self.chi_exponent,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ..FitState::from_calibration(calibration, self.n_channels)
        }
    }
}

/// Analysis job read from a JSON file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Counts file
    pub spectrum: PathBuf,
    /// Peak-list file
    pub peaks: Option<PathBuf>,
    pub calibration: Calibration,
    /// Overrides any background parameters in the peak-list file
    pub background: Option<BackgroundParameters>,
    pub fit: FitOptions,
    /// Regions of interest for energy calibration
    pub rois: Vec<RegionOfInterest>,
}

impl AnalysisConfig {
    /// Read a job file and resolve its relative paths
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config: AnalysisConfig = serde_json::from_str(&text)?;
        if config.spectrum.as_os_str().is_empty() {
            return Err(InputError::InvalidFormat(format!(
                "{} does not name a spectrum file",
                path.display()
            )));
        }
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Write the job as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Make relative paths relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.spectrum.is_relative() {
            self.spectrum = base.join(&self.spectrum);
        }
        if let Some(peaks) = self.peaks.as_mut() {
            if peaks.is_relative() {
                *peaks = base.join(&*peaks);
            }
        }
    }
}
