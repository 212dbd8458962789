/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Channel to energy calibration
//!
//! An MCA calibration is a quadratic in channel number:
//! `energy = offset + slope * channel + quad * channel^2`. For energy
//! dispersive diffraction the detector angle `two_theta` additionally maps
//! energy to lattice d-spacing through Bragg's law.

use super::errors::{Result, SpectrumError};
use super::roi::RegionOfInterest;
use super::Spectrum;
use crate::utils::constants::HC_KEV_ANGSTROM;
use crate::utils::{evaluate_polynomial, mean_and_std, polyfitw, quadratic_roots};
use log::debug;
use serde::{Deserialize, Serialize};

/// Energy calibration of a detector channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Energy of channel 0
    pub offset: f64,
    /// Energy per channel
    pub slope: f64,
    /// Quadratic term
    pub quad: f64,
    /// Detector angle in degrees, used for d-spacing conversions
    pub two_theta: f64,
    /// Energy units label
    pub units: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset: 0.0,
            slope: 1.0,
            quad: 0.0,
            two_theta: 10.0,
            units: "keV".to_string(),
        }
    }
}

/// Result of fitting an energy calibration to ROI centroids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyCalibrationFit {
    /// The fitted calibration
    pub calibration: Calibration,
    /// `roi.energy - calibration.channel_to_energy(roi.centroid)` for every ROI
    pub residuals: Vec<f64>,
}

/// Result of fitting the detector angle to ROI d-spacings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoThetaFit {
    /// Mean two-theta over the ROIs used, in degrees
    pub two_theta: f64,
    /// Standard deviation of the per-ROI values
    pub std_dev: f64,
    /// Two-theta computed for each ROI, `None` when it has no usable d-spacing
    pub per_roi: Vec<Option<f64>>,
}

impl Calibration {
    /// Create a calibration with the default angle and units
    pub fn new(offset: f64, slope: f64, quad: f64) -> Self {
        Self {
            offset,
            slope,
            quad,
            ..Self::default()
        }
    }

    /// Check the calibration can be inverted
    pub fn validate(&self) -> Result<()> {
        if !self.offset.is_finite() || !self.quad.is_finite() {
            return Err(SpectrumError::Configuration(
                "Calibration coefficients must be finite".to_string(),
            ));
        }
        if self.slope == 0.0 || !self.slope.is_finite() {
            return Err(SpectrumError::Configuration(format!(
                "Calibration slope must be finite and non-zero, got {}",
                self.slope
            )));
        }
        Ok(())
    }

    /// Create a coarse calibration from the channel of the strongest peak
    ///
    /// Assumes the offset and quadratic terms are zero, and that the channel
    /// with the most counts corresponds to `energy`.
    pub fn initial(spectrum: &Spectrum, energy: f64) -> Result<Self> {
        if spectrum.is_empty() {
            return Err(SpectrumError::Configuration(
                "Cannot calibrate an empty spectrum".to_string(),
            ));
        }
        if !(energy.is_finite() && energy > 0.0) {
            return Err(SpectrumError::Configuration(format!(
                "Calibration energy must be positive, got {}",
                energy
            )));
        }
        let channel = spectrum.argmax().max(1);
        Ok(Self::new(0.0, energy / channel as f64, 0.0))
    }

    /// Energy of a (possibly fractional) channel
    pub fn channel_to_energy(&self, channel: f64) -> f64 {
        evaluate_polynomial(channel, &[self.offset, self.slope, self.quad])
    }

    /// Energies of channels `0..n_channels`
    pub fn energies(&self, n_channels: usize) -> Vec<f64> {
        (0..n_channels)
            .map(|c| self.channel_to_energy(c as f64))
            .collect()
    }

    /// Fractional channel of an energy
    ///
    /// With a quadratic term the root nearest to the linear estimate is used.
    /// If the quadratic has no real root the linear estimate is returned.
    pub fn energy_to_channel(&self, energy: f64) -> f64 {
        let linear = (energy - self.offset) / self.slope;
        if self.quad == 0.0 {
            return linear;
        }
        match quadratic_roots(self.quad, self.slope, self.offset - energy) {
            Some((r1, r2)) => {
                if (r1 - linear).abs() <= (r2 - linear).abs() {
                    r1
                } else {
                    r2
                }
            }
            None => linear,
        }
    }

    /// Nearest channel of an energy, optionally clipped to `[0, n_channels - 1]`
    pub fn energy_to_channel_index(&self, energy: f64, n_channels: usize, clip: bool) -> i64 {
        let channel = self.energy_to_channel(energy).round() as i64;
        if clip {
            channel.clamp(0, n_channels.saturating_sub(1) as i64)
        } else {
            channel
        }
    }

    /// Lattice d-spacing (Å) diffracting into a channel at this detector angle
    pub fn channel_to_d(&self, channel: f64) -> f64 {
        let energy = self.channel_to_energy(channel);
        HC_KEV_ANGSTROM / (2.0 * energy * self.two_theta.to_radians().sin())
    }

    /// Fractional channel of a lattice d-spacing (Å) at this detector angle
    pub fn d_to_channel(&self, d: f64) -> f64 {
        let energy = HC_KEV_ANGSTROM / (2.0 * d * self.two_theta.to_radians().sin());
        self.energy_to_channel(energy)
    }

    /// Fit an energy calibration to the centroids of ROIs with known energies
    ///
    /// Only ROIs flagged `use_for_calibration` enter the fit. A linear fit
    /// (`degree` 1) needs two such ROIs, a quadratic fit three. The angle and
    /// units are carried over from `self`.
    pub fn fit_energy(
        &self,
        rois: &[RegionOfInterest],
        degree: usize,
    ) -> Result<EnergyCalibrationFit> {
        if !(1..=2).contains(&degree) {
            return Err(SpectrumError::Configuration(format!(
                "Energy calibration degree must be 1 or 2, got {}",
                degree
            )));
        }

        let (chans, energies): (Vec<f64>, Vec<f64>) = rois
            .iter()
            .filter(|roi| roi.use_for_calibration)
            .map(|roi| (roi.centroid, roi.energy))
            .unzip();
        if chans.len() < degree + 1 {
            return Err(SpectrumError::InsufficientPoints {
                needed: degree + 1,
                found: chans.len(),
            });
        }

        let weights = vec![1.0; chans.len()];
        let coeffs = polyfitw(&chans, &energies, &weights, degree)?;
        let calibration = Calibration {
            offset: coeffs[0],
            slope: coeffs[1],
            quad: if degree == 2 { coeffs[2] } else { 0.0 },
            two_theta: self.two_theta,
            units: self.units.clone(),
        };
        calibration.validate()?;
        debug!(
            "Energy calibration from {} ROIs: offset={:.6} slope={:.6} quad={:.3e}",
            chans.len(),
            calibration.offset,
            calibration.slope,
            calibration.quad
        );

        let residuals = rois
            .iter()
            .map(|roi| roi.energy - calibration.channel_to_energy(roi.centroid))
            .collect();

        Ok(EnergyCalibrationFit {
            calibration,
            residuals,
        })
    }

    /// Fit the detector angle from ROIs with known d-spacings
    ///
    /// Each used ROI with a positive d-spacing gives
    /// `2θ = 2 asin(hc / (2 E d))` with `E` the energy of its centroid; the
    /// result is their mean.
    pub fn fit_two_theta(&self, rois: &[RegionOfInterest]) -> Result<TwoThetaFit> {
        let per_roi: Vec<Option<f64>> = rois
            .iter()
            .map(|roi| {
                if roi.d_spacing <= 0.0 {
                    return None;
                }
                let energy = self.channel_to_energy(roi.centroid);
                let sin_theta = HC_KEV_ANGSTROM / (2.0 * energy * roi.d_spacing);
                if energy > 0.0 && (0.0..=1.0).contains(&sin_theta) {
                    Some(2.0 * sin_theta.asin().to_degrees())
                } else {
                    None
                }
            })
            .collect();

        let used: Vec<f64> = rois
            .iter()
            .zip(per_roi.iter())
            .filter(|(roi, _)| roi.use_for_calibration)
            .filter_map(|(_, value)| *value)
            .collect();

        let (two_theta, std_dev) =
            mean_and_std(&used).ok_or(SpectrumError::InsufficientPoints {
                needed: 1,
                found: 0,
            })?;

        Ok(TwoThetaFit {
            two_theta,
            std_dev,
            per_roi,
        })
    }
}
