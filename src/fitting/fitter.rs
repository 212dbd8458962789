/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Constrained Gaussian peak fitting
//!
//! Fits a background-subtracted spectrum with a set of Gaussian peaks whose
//! energies and widths are tied together through the global energy and FWHM
//! calibration curves. Which parameters vary is controlled per peak by the
//! flags of [`PeakDescriptor`] and globally by [`FitState`].

use super::errors::{FitError, GlobalCurve, Result};
use super::model::{
    chi_weights, peak_offset, GaussianModel, ENERGY_OFFSET, ENERGY_SLOPE, FWHM_OFFSET, FWHM_SLOPE,
};
use super::peak::{AmplitudeLink, EnergyMode, FwhmMode, PeakDescriptor};
use super::solver::{LeastSquaresSolver, LevenbergMarquardt, ParameterConstraint};
use super::state::{CalibrationMode, FitState};
use crate::spectrum::{Spectrum, SpectrumError};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a peak fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakFit {
    /// Fitted global curves, per-peak results and solver diagnostics
    pub state: FitState,
    /// The peak list as fitted, with out-of-range peaks excluded
    pub peaks: Vec<PeakDescriptor>,
    /// Predicted spectrum, rounded to whole counts
    pub predicted: Spectrum,
}

impl PeakFit {
    /// Whether the solver reported success
    pub fn converged(&self) -> bool {
        self.state.status.is_success()
    }

    /// Printable summary of the fit
    pub fn report(&self) -> FitReport<'_> {
        FitReport { fit: self }
    }
}

/// Text summary of a [`PeakFit`]
pub struct FitReport<'a> {
    fit: &'a PeakFit,
}

impl fmt::Display for FitReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = &self.fit.state;
        writeln!(f, "Status:          {}", state.status)?;
        if !state.err_string.is_empty() {
            writeln!(f, "Message:         {}", state.err_string)?;
        }
        writeln!(
            f,
            "Iterations:      {} ({} evaluations)",
            state.n_iterations, state.n_evaluations
        )?;
        writeln!(f, "Chi-square:      {:.6e}", state.chi_square)?;
        writeln!(
            f,
            "Energy:          offset={:.6} slope={:.6}",
            state.energy_offset, state.energy_slope
        )?;
        writeln!(
            f,
            "FWHM:            offset={:.6} slope={:.6}",
            state.fwhm_offset, state.fwhm_slope
        )?;
        writeln!(
            f,
            "{:<16} {:>10} {:>10} {:>12} {:>12}",
            "Peak", "Energy", "FWHM", "Amplitude", "Area"
        )?;
        for peak in &state.peaks {
            writeln!(
                f,
                "{:<16} {:>10.4} {:>10.4} {:>12.2} {:>12.2}",
                peak.label, peak.energy, peak.fwhm, peak.amplitude, peak.area
            )?;
        }
        Ok(())
    }
}

/// Fit peaks with the default Levenberg-Marquardt solver
///
/// # Arguments
///
/// * `state` - Initial global curves and solver settings
/// * `peaks` - Peaks to fit, in reference order for amplitude links
/// * `observed` - Background-subtracted spectrum
///
/// # Returns
///
/// The fitted state, the peak list as fitted and the predicted spectrum.
/// Non-convergence is reported through `state.status`, not as an error.
pub fn fit_peaks(
    state: FitState,
    peaks: Vec<PeakDescriptor>,
    observed: &Spectrum,
) -> Result<PeakFit> {
    fit_peaks_with(&LevenbergMarquardt::default(), state, peaks, observed)
}

/// Fit peaks with a caller-supplied solver
pub fn fit_peaks_with(
    solver: &dyn LeastSquaresSolver,
    mut state: FitState,
    mut peaks: Vec<PeakDescriptor>,
    observed: &Spectrum,
) -> Result<PeakFit> {
    validate_state(&state, observed)?;
    let n_channels = if state.n_channels == 0 {
        observed.len()
    } else {
        state.n_channels.min(observed.len())
    };
    state.n_channels = n_channels;

    validate_peaks(&peaks)?;
    check_links(&peaks)?;
    exclude_out_of_range(&state, &mut peaks);
    exclude_orphaned_links(&mut peaks);
    seed_widths(&state, &mut peaks)?;
    check_constraints(&state, &peaks)?;

    let observed: Vec<f64> = observed.as_f64()[..n_channels].to_vec();
    let (initial, constraints) = initial_parameters(&state, &peaks, &observed);
    let weights = chi_weights(&observed, state.chi_exponent);

    let model = GaussianModel::new(&peaks, n_channels);
    let residuals = |params: &[f64]| -> Vec<f64> {
        let (predicted, _) = model.predict(params);
        predicted
            .iter()
            .zip(observed.iter())
            .zip(weights.iter())
            .map(|((p, o), w)| (p - o) * w)
            .collect()
    };

    debug!(
        "Fitting {} peaks over {} channels ({} free parameters)",
        peaks.len(),
        n_channels,
        constraints.iter().filter(|c| !c.fixed).count()
    );
    let outcome = solver.solve(&residuals, &initial, &constraints, &state.solver_options());

    let (predicted, fitted) = model.predict(&outcome.params);
    state.energy_offset = outcome.params[ENERGY_OFFSET];
    state.energy_slope = outcome.params[ENERGY_SLOPE];
    state.fwhm_offset = outcome.params[FWHM_OFFSET];
    state.fwhm_slope = outcome.params[FWHM_SLOPE];
    state.peaks = fitted;
    state.n_iterations = outcome.n_iterations;
    state.n_evaluations = outcome.n_evaluations;
    state.chi_square = outcome.chi_square;
    state.status = outcome.status;
    state.err_string = outcome.message;

    if state.status.is_success() {
        info!(
            "Peak fit finished: {} after {} iterations, chi2={:.4e}",
            state.status, state.n_iterations, state.chi_square
        );
    } else {
        warn!("Peak fit did not converge: {}", state.status);
    }

    Ok(PeakFit {
        state,
        peaks,
        predicted: Spectrum::from_f64(&predicted),
    })
}

/// Fit several independent detector elements in parallel
///
/// Every job gets its own copy of the peak list. Results are in input order.
pub fn fit_detectors(
    jobs: &[(FitState, Spectrum)],
    peaks: &[PeakDescriptor],
) -> Vec<Result<PeakFit>> {
    jobs.par_iter()
        .map(|(state, observed)| fit_peaks(state.clone(), peaks.to_vec(), observed))
        .collect()
}

fn validate_state(state: &FitState, observed: &Spectrum) -> Result<()> {
    if observed.is_empty() {
        return Err(FitError::Configuration(
            "Cannot fit an empty spectrum".to_string(),
        ));
    }
    state.calibration().validate().map_err(|e| match e {
        SpectrumError::Configuration(message) => FitError::Configuration(message),
        other => FitError::Configuration(other.to_string()),
    })?;
    if !(state.fwhm_offset.is_finite() && state.fwhm_slope.is_finite()) {
        return Err(FitError::Configuration(
            "FWHM curve coefficients must be finite".to_string(),
        ));
    }
    if !(state.chi_exponent.is_finite() && state.chi_exponent >= 0.0) {
        return Err(FitError::Configuration(format!(
            "Chi exponent must be non-negative, got {}",
            state.chi_exponent
        )));
    }
    if !(state.tolerance > 0.0) || state.max_iterations == 0 {
        return Err(FitError::Configuration(
            "Tolerance must be positive and at least one iteration allowed".to_string(),
        ));
    }
    Ok(())
}

fn validate_peaks(peaks: &[PeakDescriptor]) -> Result<()> {
    for peak in peaks {
        if !peak.initial_energy.is_finite() || !peak.initial_fwhm.is_finite() {
            return Err(FitError::Configuration(format!(
                "Peak '{}' has a non-finite initial value",
                peak.label
            )));
        }
        if let AmplitudeLink::Ratio(ratio) = peak.ampl_factor {
            if !(ratio.is_finite() && ratio > 0.0) {
                return Err(FitError::Configuration(format!(
                    "Peak '{}' has an invalid amplitude ratio {}",
                    peak.label, ratio
                )));
            }
        }
    }
    Ok(())
}

/// Fix and exclude peaks whose energy lies outside the fitted channels
fn exclude_out_of_range(state: &FitState, peaks: &mut [PeakDescriptor]) {
    let last = (state.n_channels - 1) as f64;
    for peak in peaks.iter_mut() {
        let chan = state.energy_to_channel(peak.initial_energy);
        if chan < 0.0 || chan > last {
            warn!(
                "Peak '{}' at {} lies outside the spectrum (channel {:.1}); excluding it",
                peak.label, peak.initial_energy, chan
            );
            peak.ampl_factor = AmplitudeLink::Excluded;
            peak.energy_flag = EnergyMode::Fixed;
            peak.fwhm_flag = FwhmMode::Fixed;
        }
    }
}

/// Check every linked peak has a free peak before it in the list
fn check_links(peaks: &[PeakDescriptor]) -> Result<()> {
    let mut any_free = false;
    for peak in peaks {
        match peak.ampl_factor {
            AmplitudeLink::Free => any_free = true,
            AmplitudeLink::Ratio(_) if !any_free => {
                return Err(FitError::Configuration(format!(
                    "Peak '{}' is linked but no free peak precedes it",
                    peak.label
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Exclude linked peaks whose free references were all excluded
fn exclude_orphaned_links(peaks: &mut [PeakDescriptor]) {
    let mut active_free = false;
    for peak in peaks.iter_mut() {
        match peak.ampl_factor {
            AmplitudeLink::Free => active_free = true,
            AmplitudeLink::Ratio(_) if !active_free => {
                warn!(
                    "Peak '{}' is linked to an excluded peak; excluding it",
                    peak.label
                );
                peak.ampl_factor = AmplitudeLink::Excluded;
            }
            _ => {}
        }
    }
}

/// Seed missing widths of optimized peaks from the global curve
fn seed_widths(state: &FitState, peaks: &mut [PeakDescriptor]) -> Result<()> {
    for peak in peaks.iter_mut().filter(|p| !p.is_excluded()) {
        match peak.fwhm_flag {
            FwhmMode::Optimize if peak.initial_fwhm <= 0.0 => {
                peak.initial_fwhm = state.fwhm_at(peak.initial_energy);
                if peak.initial_fwhm <= 0.0 {
                    return Err(FitError::Configuration(format!(
                        "Peak '{}' has no positive initial FWHM",
                        peak.label
                    )));
                }
            }
            FwhmMode::Fixed if peak.initial_fwhm <= 0.0 => {
                return Err(FitError::Configuration(format!(
                    "Peak '{}' has a fixed FWHM of {}",
                    peak.label, peak.initial_fwhm
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Refuse to optimize a global curve that fewer than two peaks follow
fn check_constraints(state: &FitState, peaks: &[PeakDescriptor]) -> Result<()> {
    if state.energy_flag == CalibrationMode::Optimize {
        let anchors = peaks
            .iter()
            .filter(|p| !p.is_excluded() && p.energy_flag == EnergyMode::Fixed)
            .count();
        if anchors < 2 {
            return Err(FitError::InsufficientConstraints {
                curve: GlobalCurve::Energy,
                anchors,
            });
        }
    }
    if state.fwhm_flag == CalibrationMode::Optimize {
        let anchors = peaks
            .iter()
            .filter(|p| !p.is_excluded() && p.fwhm_flag == FwhmMode::GlobalCurve)
            .count();
        if anchors < 2 {
            return Err(FitError::InsufficientConstraints {
                curve: GlobalCurve::Fwhm,
                anchors,
            });
        }
    }
    Ok(())
}

/// Initial parameter vector and its constraints
fn initial_parameters(
    state: &FitState,
    peaks: &[PeakDescriptor],
    observed: &[f64],
) -> (Vec<f64>, Vec<ParameterConstraint>) {
    let global = |mode: CalibrationMode| match mode {
        CalibrationMode::Fixed => ParameterConstraint::fixed(),
        CalibrationMode::Optimize => ParameterConstraint::free(),
    };

    let mut params = vec![
        state.energy_offset,
        state.energy_slope,
        state.fwhm_offset,
        state.fwhm_slope,
    ];
    let mut constraints = vec![
        global(state.energy_flag),
        global(state.energy_flag),
        global(state.fwhm_flag),
        global(state.fwhm_flag),
    ];

    let last = observed.len() - 1;
    let mut reference = 0.0;
    for peak in peaks {
        params.push(peak.initial_energy);
        constraints.push(match peak.energy_flag {
            EnergyMode::Fixed => ParameterConstraint::fixed(),
            EnergyMode::Optimize => ParameterConstraint::free(),
        });

        match peak.fwhm_flag {
            FwhmMode::Optimize => {
                params.push(peak.initial_fwhm);
                constraints.push(ParameterConstraint::bounded(
                    peak.initial_fwhm / 10.0,
                    peak.initial_fwhm * 10.0,
                ));
            }
            FwhmMode::GlobalCurve => {
                params.push(state.fwhm_at(peak.initial_energy));
                constraints.push(ParameterConstraint::fixed());
            }
            FwhmMode::Fixed => {
                params.push(peak.initial_fwhm);
                constraints.push(ParameterConstraint::fixed());
            }
        }

        match peak.ampl_factor {
            AmplitudeLink::Free => {
                let chan = state.energy_to_channel(peak.initial_energy).round();
                let chan = chan.clamp(0.0, last as f64) as usize;
                reference = observed[chan].max(0.0);
                params.push(reference);
                constraints.push(ParameterConstraint::at_least(0.0));
            }
            AmplitudeLink::Ratio(ratio) => {
                params.push(reference * ratio);
                constraints.push(ParameterConstraint::fixed());
            }
            AmplitudeLink::Excluded => {
                params.push(0.0);
                constraints.push(ParameterConstraint::fixed());
            }
        }
    }

    debug_assert_eq!(params.len(), peak_offset(peaks.len()));
    (params, constraints)
}
