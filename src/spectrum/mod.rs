/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Spectrum data model
//!
//! This module holds the records shared by the background estimator and the
//! peak fitter: the channel counts of an MCA spectrum, the energy calibration
//! that maps channels to physical units, and the regions of interest used to
//! derive a calibration from known lines.

pub mod calibration;
pub mod errors;
pub mod roi;

pub use calibration::{Calibration, EnergyCalibrationFit, TwoThetaFit};
pub use errors::{Result, SpectrumError};
pub use roi::{RegionOfInterest, RoiCounts, RoiList};

use serde::{Deserialize, Serialize};
use std::ops::Index;

/// An MCA spectrum: one non-negative count per channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Spectrum {
    counts: Vec<u64>,
}

impl Spectrum {
    /// Create a spectrum from raw channel counts
    pub fn new(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Create a spectrum from floating point values
    ///
    /// Values are rounded to the nearest integer; negative and non-finite
    /// values become zero.
    pub fn from_f64(values: &[f64]) -> Self {
        let counts = values
            .iter()
            .map(|&v| if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 })
            .collect();
        Self { counts }
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the spectrum has no channels
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Channel counts
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Channel counts as floating point values
    pub fn as_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }

    /// Iterate over the channel counts
    pub fn iter(&self) -> std::slice::Iter<'_, u64> {
        self.counts.iter()
    }

    /// Largest count in any channel, 0 for an empty spectrum
    pub fn max(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// First channel holding the largest count, 0 for an empty spectrum
    pub fn argmax(&self) -> usize {
        let max = self.max();
        self.counts.iter().position(|&c| c == max).unwrap_or(0)
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Channel-wise difference `self - other`, saturating at zero
    ///
    /// Typically used to remove a fitted background before peak fitting.
    pub fn subtract(&self, other: &Spectrum) -> Result<Spectrum> {
        if self.len() != other.len() {
            return Err(SpectrumError::Configuration(format!(
                "Cannot subtract a spectrum of {} channels from one of {} channels",
                other.len(),
                self.len()
            )));
        }
        Ok(Spectrum::new(
            self.counts
                .iter()
                .zip(other.counts.iter())
                .map(|(&a, &b)| a.saturating_sub(b))
                .collect(),
        ))
    }
}

impl From<Vec<u64>> for Spectrum {
    fn from(counts: Vec<u64>) -> Self {
        Self::new(counts)
    }
}

impl Index<usize> for Spectrum {
    type Output = u64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.counts[index]
    }
}

impl<'a> IntoIterator for &'a Spectrum {
    type Item = &'a u64;
    type IntoIter = std::slice::Iter<'a, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.iter()
    }
}
