/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Gaussian peak fitting
//!
//! This module fits background-subtracted MCA spectra with a sum of Gaussian
//! peaks, optionally refining the global energy and FWHM calibration curves at
//! the same time.

pub mod errors;
pub mod fitter;
pub mod model;
pub mod peak;
pub mod solver;
pub mod state;

pub use errors::{FitError, GlobalCurve, Result};
pub use fitter::{fit_detectors, fit_peaks, fit_peaks_with, FitReport, PeakFit};
pub use model::{chi_weights, gaussian_spectrum, GaussianModel};
pub use peak::{AmplitudeLink, EnergyMode, FittedPeak, FwhmMode, PeakDescriptor};
pub use solver::{
    FitStatus, LeastSquaresSolver, LevenbergMarquardt, ParameterConstraint, SolverOptions,
    SolverOutcome,
};
pub use state::{CalibrationMode, FitState};
