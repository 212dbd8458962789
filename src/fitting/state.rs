/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Global fit parameters and results

use super::peak::FittedPeak;
use super::solver::{FitStatus, SolverOptions};
use crate::spectrum::Calibration;
use log::warn;
use serde::{Deserialize, Serialize};

/// Whether a global calibration curve is optimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationMode {
    Fixed,
    #[default]
    Optimize,
}

/// Global state of a peak fit
///
/// Holds the calibration curves and solver knobs going in, and the fitted
/// curves, per-peak results and solver diagnostics coming out. A state is
/// created for each fit and returned to the caller when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitState {
    /// Energy of channel 0
    pub energy_offset: f64,
    /// Energy per channel
    pub energy_slope: f64,
    /// Constant term of the FWHM curve
    pub fwhm_offset: f64,
    /// Coefficient of `sqrt(energy)` in the FWHM curve
    pub fwhm_slope: f64,
    pub energy_flag: CalibrationMode,
    pub fwhm_flag: CalibrationMode,
    /// Observations are weighted by `1 / observed^chi_exponent`
    pub chi_exponent: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Number of channels to fit, 0 for the whole spectrum
    pub n_channels: usize,

    /// Per-peak fitted values
    pub peaks: Vec<FittedPeak>,
    pub n_iterations: usize,
    pub n_evaluations: usize,
    pub chi_square: f64,
    pub status: FitStatus,
    pub err_string: String,
}

impl Default for FitState {
    fn default() -> Self {
        Self {
            energy_offset: 0.0,
            energy_slope: 1.0,
            fwhm_offset: 0.15,
            fwhm_slope: 0.0,
            energy_flag: CalibrationMode::Optimize,
            fwhm_flag: CalibrationMode::Optimize,
            chi_exponent: 0.0,
            max_iterations: 20,
            tolerance: 1e-4,
            n_channels: 0,
            peaks: Vec::new(),
            n_iterations: 0,
            n_evaluations: 0,
            chi_square: 0.0,
            status: FitStatus::NotRun,
            err_string: String::new(),
        }
    }
}

impl FitState {
    /// Initial state seeded from a spectrum calibration
    ///
    /// The peak model uses a linear energy scale, so a quadratic term in the
    /// calibration is dropped.
    pub fn from_calibration(calibration: &Calibration, n_channels: usize) -> Self {
        if calibration.quad != 0.0 {
            warn!(
                "Ignoring quadratic calibration term {} in peak fit",
                calibration.quad
            );
        }
        Self {
            energy_offset: calibration.offset,
            energy_slope: calibration.slope,
            n_channels,
            ..Self::default()
        }
    }

    /// The energy calibration described by this state
    pub fn calibration(&self) -> Calibration {
        Calibration::new(self.energy_offset, self.energy_slope, 0.0)
    }

    /// FWHM of the global detector curve at an energy
    pub fn fwhm_at(&self, energy: f64) -> f64 {
        self.fwhm_offset + self.fwhm_slope * energy.max(0.0).sqrt()
    }

    /// Fractional channel of an energy
    pub fn energy_to_channel(&self, energy: f64) -> f64 {
        (energy - self.energy_offset) / self.energy_slope
    }

    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let state = FitState::default();
        assert_eq!(state.max_iterations, 20);
        assert_relative_eq!(state.tolerance, 1e-4);
        assert_relative_eq!(state.fwhm_offset, 0.15);
        assert_eq!(state.chi_exponent, 0.0);
        assert_eq!(state.status, FitStatus::NotRun);
    }

    #[test]
    fn test_from_calibration() {
        let cal = Calibration::new(0.02, 0.01, 0.0);
        let state = FitState::from_calibration(&cal, 2048);
        assert_eq!(state.energy_offset, 0.02);
        assert_eq!(state.energy_slope, 0.01);
        assert_eq!(state.n_channels, 2048);
        assert_relative_eq!(state.energy_to_channel(1.02), 100.0, epsilon = 1e-9);
        assert_eq!(state.calibration().offset, 0.02);
        assert_relative_eq!(state.calibration().channel_to_energy(100.0), 1.02);
    }

    #[test]
    fn test_fwhm_curve() {
        let state = FitState {
            fwhm_offset: 0.1,
            fwhm_slope: 0.02,
            ..FitState::default()
        };
        assert_relative_eq!(state.fwhm_at(4.0), 0.14);
        assert_relative_eq!(state.fwhm_at(-1.0), 0.1);
    }
}
