/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Background estimation for MCA spectra
//!
//! The background is fitted with the peak-clipping method: concave-down
//! power-law polynomials are raised under every channel until they touch the
//! spectrum, and the background is the upper envelope of all of them. An
//! optional concave-up pass first fills narrow dips so the background does not
//! follow them.
//!
//! Widths are given in energy units and converted to channels with the
//! calibration slope. The spectrum may be compressed before fitting, which
//! speeds up the fit considerably for wide kernels.

pub mod clipping;
pub mod errors;

pub use errors::{BackgroundError, Result};

use crate::spectrum::Spectrum;
use crate::utils::{compress_array, expand_array};
use clipping::{bottom_pass, top_pass, PowerTable};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters of the peak-clipping background fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundParameters {
    /// Power of the clipping polynomials, an even integer of at least 2
    pub exponent: u32,
    /// Width of the concave-up polynomials in energy units, 0 disables the pass
    pub top_width: f64,
    /// Width of the concave-down polynomials in energy units
    pub bottom_width: f64,
    /// Tilt the concave-down polynomials to the local slope of the spectrum
    pub tangent: bool,
    /// Compression factor applied before fitting, must divide the channel count
    pub compress: usize,
}

impl Default for BackgroundParameters {
    fn default() -> Self {
        Self {
            exponent: 2,
            top_width: 0.0,
            bottom_width: 4.0,
            tangent: false,
            compress: 4,
        }
    }
}

impl BackgroundParameters {
    /// Check the parameters against a spectrum of `n_channels` channels
    pub fn validate(&self, n_channels: usize) -> Result<()> {
        if self.exponent < 2 || self.exponent % 2 != 0 {
            return Err(BackgroundError::Configuration(format!(
                "Exponent must be an even integer of at least 2, got {}",
                self.exponent
            )));
        }
        if !(self.top_width.is_finite() && self.top_width >= 0.0) {
            return Err(BackgroundError::Configuration(format!(
                "Top width must be non-negative, got {}",
                self.top_width
            )));
        }
        if !(self.bottom_width.is_finite() && self.bottom_width >= 0.0) {
            return Err(BackgroundError::Configuration(format!(
                "Bottom width must be non-negative, got {}",
                self.bottom_width
            )));
        }
        if self.compress == 0 {
            return Err(BackgroundError::Configuration(
                "Compression factor must be at least 1".to_string(),
            ));
        }
        if self.compress > n_channels || n_channels % self.compress != 0 {
            return Err(BackgroundError::Configuration(format!(
                "Compression factor {} does not evenly divide {} channels",
                self.compress, n_channels
            )));
        }
        Ok(())
    }
}

/// Estimate the background of a spectrum
///
/// # Arguments
///
/// * `spectrum` - The measured spectrum
/// * `slope` - Energy per channel of the spectrum calibration
/// * `params` - Clipping parameters
///
/// # Returns
///
/// A background spectrum of the same length, with every channel between 0
/// and the (compressed then expanded) measured counts
pub fn estimate_background(
    spectrum: &Spectrum,
    slope: f64,
    params: &BackgroundParameters,
) -> Result<Spectrum> {
    if spectrum.is_empty() {
        return Err(BackgroundError::Configuration(
            "Cannot estimate the background of an empty spectrum".to_string(),
        ));
    }
    if slope == 0.0 || !slope.is_finite() {
        return Err(BackgroundError::Configuration(format!(
            "Calibration slope must be finite and non-zero, got {}",
            slope
        )));
    }
    params.validate(spectrum.len())?;

    let data = compress_array(&spectrum.as_f64(), params.compress)?;
    let slope = slope.abs() * params.compress as f64;
    let n = data.len();

    let scratch = if params.top_width > 0.0 {
        let max_counts = data.iter().copied().fold(0.0, f64::max);
        let table = PowerTable::new(
            params.top_width / (2.0 * slope),
            params.exponent,
            max_counts,
            n,
        );
        debug!("Concave-up pass with kernel support {}", table.support());
        top_pass(&data, &table)
    } else {
        data.clone()
    };

    let max_counts = scratch.iter().copied().fold(0.0, f64::max);
    let table = PowerTable::new(
        params.bottom_width / (2.0 * slope),
        params.exponent,
        max_counts,
        n,
    );
    debug!("Concave-down pass with kernel support {}", table.support());
    let clipped = bottom_pass(&scratch, &table, params.tangent);

    // The concave-up envelope may lift the background above the data
    let bounded: Vec<f64> = clipped
        .iter()
        .zip(data.iter())
        .map(|(&b, &d)| b.min(d))
        .collect();

    let expanded = expand_array(&bounded, params.compress, false);
    let counts = expanded
        .iter()
        .map(|&v| if v > 0.0 { v.floor() as u64 } else { 0 })
        .collect();

    Ok(Spectrum::new(counts))
}

/// Estimate the backgrounds of several independent spectra in parallel
///
/// Each spectrum is paired with its own calibration slope. Results are in the
/// same order as the input.
pub fn estimate_backgrounds(
    spectra: &[(Spectrum, f64)],
    params: &BackgroundParameters,
) -> Vec<Result<Spectrum>> {
    spectra
        .par_iter()
        .map(|(spectrum, slope)| estimate_background(spectrum, *slope, params))
        .collect()
}
