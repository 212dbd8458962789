/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Multi-Gaussian spectrum model
//!
//! Parameter vector layout: the four global coefficients
//! `[energy_offset, energy_slope, fwhm_offset, fwhm_slope]` followed by
//! `[energy, fwhm, amplitude]` for every peak. Every peak occupies its three
//! slots even when they are fixed or derived.

use super::peak::{AmplitudeLink, FittedPeak, FwhmMode, PeakDescriptor};
use crate::utils::constants::MAX_SIGMA;
use crate::utils::fwhm_to_sigma;

pub const ENERGY_OFFSET: usize = 0;
pub const ENERGY_SLOPE: usize = 1;
pub const FWHM_OFFSET: usize = 2;
pub const FWHM_SLOPE: usize = 3;
/// Number of global parameters ahead of the per-peak parameters
pub const N_GLOBAL: usize = 4;

/// Smallest FWHM used when scaling linked amplitudes
const MIN_FWHM: f64 = 0.001;

/// Index of the first parameter of peak `index`
pub fn peak_offset(index: usize) -> usize {
    N_GLOBAL + 3 * index
}

/// Gaussian model over a fixed list of peaks
#[derive(Debug, Clone, Copy)]
pub struct GaussianModel<'a> {
    peaks: &'a [PeakDescriptor],
    n_channels: usize,
}

impl<'a> GaussianModel<'a> {
    pub fn new(peaks: &'a [PeakDescriptor], n_channels: usize) -> Self {
        Self { peaks, n_channels }
    }

    /// Length of the parameter vector
    pub fn n_params(&self) -> usize {
        peak_offset(self.peaks.len())
    }

    /// Resolve a parameter vector into peak energies, widths and amplitudes
    ///
    /// Widths following the global curve are computed from it. Linked peaks
    /// take the amplitude of the most recent free peak scaled by the ratio and
    /// by the inverse ratio of their widths, so that their areas keep the
    /// requested ratio.
    pub fn resolve(&self, params: &[f64]) -> Vec<FittedPeak> {
        let fwhm_offset = params[FWHM_OFFSET];
        let fwhm_slope = params[FWHM_SLOPE];
        let mut reference: Option<(f64, f64)> = None;

        self.peaks
            .iter()
            .enumerate()
            .map(|(i, peak)| {
                let base = peak_offset(i);
                let energy = params[base];
                let fwhm = match peak.fwhm_flag {
                    FwhmMode::GlobalCurve => fwhm_offset + fwhm_slope * energy.max(0.0).sqrt(),
                    FwhmMode::Optimize | FwhmMode::Fixed => params[base + 1],
                };
                let amplitude = match peak.ampl_factor {
                    AmplitudeLink::Free => {
                        let amplitude = params[base + 2];
                        reference = Some((amplitude, fwhm));
                        amplitude
                    }
                    AmplitudeLink::Ratio(ratio) => reference
                        .map(|(ref_ampl, ref_fwhm)| {
                            ref_ampl * ratio * ref_fwhm / fwhm.max(MIN_FWHM)
                        })
                        .unwrap_or(0.0),
                    AmplitudeLink::Excluded => 0.0,
                };

                FittedPeak {
                    label: peak.label.clone(),
                    energy,
                    fwhm,
                    amplitude,
                    area: 0.0,
                }
            })
            .collect()
    }

    /// Predicted spectrum and resolved peaks (with areas) for a parameter vector
    pub fn predict(&self, params: &[f64]) -> (Vec<f64>, Vec<FittedPeak>) {
        let mut peaks = self.resolve(params);
        let predicted = gaussian_spectrum(
            params[ENERGY_OFFSET],
            params[ENERGY_SLOPE],
            self.n_channels,
            &mut peaks,
        );
        (predicted, peaks)
    }
}

/// Sum of Gaussian peaks on a linear energy scale
///
/// Each peak is evaluated only over channels within 5 sigma of its energy.
/// The area of each peak is set to the sum of its counts.
pub fn gaussian_spectrum(
    energy_offset: f64,
    energy_slope: f64,
    n_channels: usize,
    peaks: &mut [FittedPeak],
) -> Vec<f64> {
    let mut predicted = vec![0.0; n_channels];
    if n_channels == 0 || energy_slope == 0.0 || !energy_slope.is_finite() {
        return predicted;
    }
    let last = (n_channels - 1) as f64;

    for peak in peaks.iter_mut() {
        peak.area = 0.0;
        let sigma = fwhm_to_sigma(peak.fwhm);
        if !(sigma > 0.0 && sigma.is_finite() && peak.energy.is_finite()) || peak.amplitude == 0.0 {
            continue;
        }

        let c1 = (peak.energy - MAX_SIGMA * sigma - energy_offset) / energy_slope;
        let c2 = (peak.energy + MAX_SIGMA * sigma - energy_offset) / energy_slope;
        let (lo, hi) = (c1.min(c2), c1.max(c2));
        if hi < 0.0 || lo > last {
            continue;
        }
        let first = lo.floor().max(0.0) as usize;
        let end = hi.ceil().min(last) as usize;

        let two_sigma_sq = 2.0 * sigma * sigma;
        for (chan, value) in predicted.iter_mut().enumerate().take(end + 1).skip(first) {
            let energy = energy_offset + chan as f64 * energy_slope;
            let counts = peak.amplitude * (-(energy - peak.energy).powi(2) / two_sigma_sq).exp();
            *value += counts;
            peak.area += counts;
        }
    }
    predicted
}

/// Weight of every channel in chi-square
///
/// The standard deviation of a channel is taken as `observed^chi_exponent`,
/// with observed counts floored at 1.
pub fn chi_weights(observed: &[f64], chi_exponent: f64) -> Vec<f64> {
    observed
        .iter()
        .map(|&o| {
            let o = o.max(1.0);
            if chi_exponent == 0.0 {
                1.0
            } else if chi_exponent == 0.5 {
                1.0 / o.sqrt()
            } else if chi_exponent == 1.0 {
                1.0 / o
            } else {
                1.0 / o.powf(chi_exponent)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::peak::EnergyMode;
    use approx::assert_relative_eq;

    fn params_for(globals: [f64; 4], peaks: &[[f64; 3]]) -> Vec<f64> {
        let mut params = globals.to_vec();
        for p in peaks {
            params.extend_from_slice(p);
        }
        params
    }

    #[test]
    fn test_global_curve_and_linkage() {
        let peaks = vec![
            PeakDescriptor::new("a", 4.0),
            PeakDescriptor::new("b", 6.0)
                .with_fwhm(0.3, FwhmMode::Fixed)
                .with_amplitude(AmplitudeLink::Ratio(0.5)),
            PeakDescriptor::new("c", 9.0).with_amplitude(AmplitudeLink::Excluded),
        ];
        let model = GaussianModel::new(&peaks, 1000);
        assert_eq!(model.n_params(), 13);

        let params = params_for(
            [0.0, 0.01, 0.1, 0.05],
            &[[4.0, 0.0, 200.0], [6.0, 0.3, 0.0], [9.0, 0.2, 50.0]],
        );
        let resolved = model.resolve(&params);

        assert_relative_eq!(resolved[0].fwhm, 0.2);
        assert_relative_eq!(resolved[1].fwhm, 0.3);
        assert_relative_eq!(resolved[1].amplitude, 200.0 * 0.5 * 0.2 / 0.3);
        assert_eq!(resolved[2].amplitude, 0.0);
    }

    #[test]
    fn test_linked_areas_keep_ratio() {
        let peaks = vec![
            PeakDescriptor::new("a", 3.0).with_fwhm(0.15, FwhmMode::Fixed),
            PeakDescriptor::new("b", 6.0)
                .with_fwhm(0.25, FwhmMode::Fixed)
                .with_amplitude(AmplitudeLink::Ratio(0.4)),
        ];
        let model = GaussianModel::new(&peaks, 1000);
        let params = params_for(
            [0.0, 0.01, 0.0, 0.0],
            &[[3.0, 0.15, 500.0], [6.0, 0.25, 0.0]],
        );
        let (predicted, resolved) = model.predict(&params);

        assert_relative_eq!(resolved[1].area / resolved[0].area, 0.4, epsilon = 1e-3);
        let total: f64 = predicted.iter().sum();
        assert_relative_eq!(total, resolved[0].area + resolved[1].area, epsilon = 1e-6);
    }

    #[test]
    fn test_peak_window() {
        let mut peaks = vec![FittedPeak {
            label: "p".to_string(),
            energy: 5.0,
            fwhm: 0.1,
            amplitude: 100.0,
            area: 0.0,
        }];
        let predicted = gaussian_spectrum(0.0, 0.01, 1024, &mut peaks);

        assert_relative_eq!(predicted[500], 100.0);
        // sigma is 4.25 channels, so 5 sigma is about 21 channels
        assert!(predicted[475] == 0.0);
        assert!(predicted[525] == 0.0);
        assert!(predicted[480] > 0.0);
        let expected_area = 100.0 * (0.1 / 2.35482) / 0.01 * (2.0 * std::f64::consts::PI).sqrt();
        assert_relative_eq!(peaks[0].area, expected_area, max_relative = 1e-3);
    }

    #[test]
    fn test_peak_outside_range_contributes_nothing() {
        let mut peaks = vec![FittedPeak {
            label: "far".to_string(),
            energy: 50.0,
            fwhm: 0.2,
            amplitude: 100.0,
            area: 0.0,
        }];
        let predicted = gaussian_spectrum(0.0, 0.01, 1024, &mut peaks);
        assert!(predicted.iter().all(|&v| v == 0.0));
        assert_eq!(peaks[0].area, 0.0);
    }

    #[test]
    fn test_chi_weights() {
        let observed = [0.0, 1.0, 4.0, 100.0];
        assert_eq!(chi_weights(&observed, 0.0), vec![1.0; 4]);
        assert_eq!(chi_weights(&observed, 0.5), vec![1.0, 1.0, 0.5, 0.1]);
        assert_eq!(chi_weights(&observed, 1.0), vec![1.0, 1.0, 0.25, 0.01]);
        let w = chi_weights(&observed, 2.0);
        assert_relative_eq!(w[2], 1.0 / 16.0);
    }

    #[test]
    fn test_energy_mode_does_not_change_resolution() {
        let peaks = vec![PeakDescriptor::new("a", 4.0).with_energy_mode(EnergyMode::Optimize)];
        let model = GaussianModel::new(&peaks, 100);
        let params = params_for([0.0, 0.1, 0.2, 0.0], &[[4.2, 0.0, 10.0]]);
        assert_relative_eq!(model.resolve(&params)[0].energy, 4.2);
    }
}
