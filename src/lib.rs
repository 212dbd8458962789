/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! # mcafit-rs
//!
//! Spectral analysis for multichannel analyzer (MCA) X-ray fluorescence
//! spectra: background estimation by peak clipping, constrained multi-Gaussian
//! peak fitting with global energy and FWHM calibration, and energy
//! calibration from regions of interest.
//!
//! ```no_run
//! use mcafit_rs::background::{estimate_background, BackgroundParameters};
//! use mcafit_rs::fitting::{fit_peaks, FitState, PeakDescriptor};
//! use mcafit_rs::spectrum::{Calibration, Spectrum};
//!
//! # fn main() -> anyhow::Result<()> {
//! let spectrum = Spectrum::new(vec![0; 2048]);
//! let calibration = Calibration::new(0.0, 0.01, 0.0);
//! let background =
//!     estimate_background(&spectrum, calibration.slope, &BackgroundParameters::default())?;
//! let net = spectrum.subtract(&background)?;
//!
//! let peaks = vec![
//!     PeakDescriptor::new("Fe Ka", 6.404),
//!     PeakDescriptor::new("Cu Ka", 8.048),
//! ];
//! let fit = fit_peaks(FitState::from_calibration(&calibration, 0), peaks, &net)?;
//! println!("{}", fit.report());
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod cli;
pub mod fitting;
pub mod input;
pub mod spectrum;
pub mod utils;
pub mod xrf;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
