/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Peak descriptors
//!
//! Each Gaussian peak has an energy, a FWHM and an amplitude, and each of
//! these may be optimized or constrained independently:
//!
//! - the energy is either known (fixed) or optimized;
//! - the FWHM follows the global detector curve `offset + slope * sqrt(E)`,
//!   is optimized, or is fixed to the given value;
//! - the amplitude is free, linked by a ratio to the closest preceding free
//!   peak in the list, or excluded from the model.
//!
//! Amplitude links are positional: the reference of a linked peak is the most
//! recent free peak before it in the list.

use super::errors::{FitError, Result};
use serde::{Deserialize, Serialize};

/// How the energy of a peak is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnergyMode {
    /// Energy is known; the peak anchors the global energy calibration
    #[default]
    Fixed,
    /// Energy is a fit parameter
    Optimize,
}

impl EnergyMode {
    /// Mode from its numeric flag (0 = fixed, 1 = optimize)
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(EnergyMode::Fixed),
            1 => Some(EnergyMode::Optimize),
            _ => None,
        }
    }

    pub fn flag(&self) -> i64 {
        match self {
            EnergyMode::Fixed => 0,
            EnergyMode::Optimize => 1,
        }
    }
}

/// How the FWHM of a peak is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FwhmMode {
    /// FWHM follows the global detector curve
    #[default]
    GlobalCurve,
    /// FWHM is a fit parameter
    Optimize,
    /// FWHM is held at the initial value
    Fixed,
}

impl FwhmMode {
    /// Mode from its numeric flag (0 = global curve, 1 = optimize, 2 = fixed)
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(FwhmMode::GlobalCurve),
            1 => Some(FwhmMode::Optimize),
            2 => Some(FwhmMode::Fixed),
            _ => None,
        }
    }

    pub fn flag(&self) -> i64 {
        match self {
            FwhmMode::GlobalCurve => 0,
            FwhmMode::Optimize => 1,
            FwhmMode::Fixed => 2,
        }
    }
}

/// How the amplitude of a peak is treated
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum AmplitudeLink {
    /// Amplitude is a fit parameter; the peak becomes the reference for
    /// following linked peaks
    #[default]
    Free,
    /// Area is this fraction of the area of the reference peak
    Ratio(f64),
    /// Amplitude is held at zero
    Excluded,
}

impl AmplitudeLink {
    /// Link from the numeric amplitude factor
    ///
    /// `0` is free, a positive value a ratio and `-1` excludes the peak.
    /// Other negative values are rejected.
    pub fn from_factor(factor: f64) -> Result<Self> {
        if !factor.is_finite() {
            return Err(FitError::Configuration(format!(
                "Amplitude factor must be finite, got {}",
                factor
            )));
        }
        if factor == 0.0 {
            Ok(AmplitudeLink::Free)
        } else if factor > 0.0 {
            Ok(AmplitudeLink::Ratio(factor))
        } else if factor == -1.0 {
            Ok(AmplitudeLink::Excluded)
        } else {
            Err(FitError::Configuration(format!(
                "Amplitude factor must be 0, -1 or positive, got {}",
                factor
            )))
        }
    }

    /// Numeric amplitude factor
    pub fn factor(&self) -> f64 {
        match self {
            AmplitudeLink::Free => 0.0,
            AmplitudeLink::Ratio(ratio) => *ratio,
            AmplitudeLink::Excluded => -1.0,
        }
    }
}

/// A peak to fit, with its initial values and constraint flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDescriptor {
    pub label: String,
    pub initial_energy: f64,
    #[serde(default)]
    pub energy_flag: EnergyMode,
    /// Initial FWHM; may be zero when the FWHM follows the global curve
    #[serde(default)]
    pub initial_fwhm: f64,
    #[serde(default)]
    pub fwhm_flag: FwhmMode,
    #[serde(default)]
    pub ampl_factor: AmplitudeLink,
}

impl PeakDescriptor {
    /// A free peak at a known energy whose FWHM follows the global curve
    pub fn new(label: impl Into<String>, initial_energy: f64) -> Self {
        Self {
            label: label.into(),
            initial_energy,
            energy_flag: EnergyMode::Fixed,
            initial_fwhm: 0.0,
            fwhm_flag: FwhmMode::GlobalCurve,
            ampl_factor: AmplitudeLink::Free,
        }
    }

    pub fn with_energy_mode(mut self, mode: EnergyMode) -> Self {
        self.energy_flag = mode;
        self
    }

    pub fn with_fwhm(mut self, fwhm: f64, mode: FwhmMode) -> Self {
        self.initial_fwhm = fwhm;
        self.fwhm_flag = mode;
        self
    }

    pub fn with_amplitude(mut self, link: AmplitudeLink) -> Self {
        self.ampl_factor = link;
        self
    }

    /// Whether the peak is excluded from the model
    pub fn is_excluded(&self) -> bool {
        self.ampl_factor == AmplitudeLink::Excluded
    }
}

/// Fitted parameters of one peak
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FittedPeak {
    pub label: String,
    pub energy: f64,
    pub fwhm: f64,
    pub amplitude: f64,
    /// Sum of the predicted counts of this peak
    pub area: f64,
}
