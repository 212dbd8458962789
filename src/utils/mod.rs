/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Utility functions for MCA spectral analysis
//!
//! This module provides the numerical building blocks shared by the
//! background, calibration and peak fitting code.

pub mod errors;
pub mod linear_algebra;
pub mod math;

pub use errors::{Result, UtilsError};
pub use linear_algebra::solve_linear_system;
pub use math::{
    compress_array, evaluate_polynomial, expand_array, fit_gaussian, mean_and_std, polyfitw,
    quadratic_roots, GaussianEstimate,
};

/// Physical constants used in MCA calculations
pub mod constants {
    /// Ratio between the FWHM and the standard deviation of a Gaussian
    pub const SIGMA_TO_FWHM: f64 = 2.35482;

    /// hc in keV·Å, converts photon energy to wavelength
    pub const HC_KEV_ANGSTROM: f64 = 12.398;

    /// Number of standard deviations a Gaussian peak is evaluated over
    pub const MAX_SIGMA: f64 = 5.0;
}

/// Convert a Gaussian FWHM to its standard deviation
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / constants::SIGMA_TO_FWHM
}

/// Convert a Gaussian standard deviation to its FWHM
pub fn sigma_to_fwhm(sigma: f64) -> f64 {
    sigma * constants::SIGMA_TO_FWHM
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_width_conversions() {
        let fwhm = 0.15;
        let sigma = fwhm_to_sigma(fwhm);
        assert_relative_eq!(sigma_to_fwhm(sigma), fwhm, epsilon = 1e-12);
        assert_relative_eq!(sigma, 0.15 / 2.35482, epsilon = 1e-12);
    }
}
