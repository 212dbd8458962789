/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

use approx::assert_relative_eq;
use mcafit_rs::spectrum::{Calibration, RegionOfInterest, RoiList, Spectrum, SpectrumError};
use mcafit_rs::xrf::lookup_line;

const N_CHANNELS: usize = 1024;

fn gaussian(chan: f64, center: f64, fwhm: f64, amplitude: f64) -> f64 {
    let sigma = fwhm / 2.35482;
    amplitude * (-(chan - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

/// Detector with offset 0.05 keV and 20 eV per channel
fn true_calibration() -> Calibration {
    Calibration::new(0.05, 0.02, 0.0)
}

/// Fe, Cu and Zn K-alpha lines on a flat continuum
fn line_spectrum(lines: &[&str]) -> Spectrum {
    let cal = true_calibration();
    let centers: Vec<f64> = lines
        .iter()
        .map(|label| cal.energy_to_channel(lookup_line(label).unwrap()))
        .collect();
    let values: Vec<f64> = (0..N_CHANNELS)
        .map(|i| {
            let x = i as f64;
            20.0 + centers
                .iter()
                .map(|&c| gaussian(x, c, 8.0, 500.0))
                .sum::<f64>()
        })
        .collect();
    Spectrum::from_f64(&values)
}

/// ROIs of +-12 channels around each line, with the line energy filled in
fn line_rois(lines: &[&str], guess: &Calibration) -> RoiList {
    let mut rois = RoiList::new(N_CHANNELS);
    for label in lines {
        let energy = lookup_line(label).unwrap();
        let width = 12.0 * guess.slope;
        let index = rois
            .add_energy(energy - width, energy + width, *label, guess)
            .unwrap();
        rois.get_mut(index).unwrap().energy = energy;
    }
    rois
}

#[test]
fn test_linear_calibration_from_rois() {
    let lines = ["Fe Ka", "Cu Ka", "Zn Ka"];
    let spectrum = line_spectrum(&lines);
    let guess = true_calibration();
    let mut rois = line_rois(&lines, &guess);

    rois.compute_centroids(&spectrum, &guess).unwrap();
    for roi in rois.iter() {
        assert_relative_eq!(
            roi.centroid,
            guess.energy_to_channel(roi.energy),
            epsilon = 0.2
        );
        // 8 channels at 20 eV per channel
        assert_relative_eq!(roi.fwhm, 0.16, max_relative = 0.1);
    }

    let fit = Calibration::default().fit_energy(rois.rois(), 1).unwrap();
    assert_relative_eq!(fit.calibration.slope, 0.02, max_relative = 0.01);
    assert_relative_eq!(fit.calibration.offset, 0.05, epsilon = 0.02);
    assert_eq!(fit.calibration.quad, 0.0);
    assert_eq!(fit.residuals.len(), 3);
    assert!(fit.residuals.iter().all(|r| r.abs() < 0.01));
}

#[test]
fn test_quadratic_calibration_needs_three_rois() {
    let lines = ["Fe Ka", "Zn Ka"];
    let spectrum = line_spectrum(&lines);
    let guess = true_calibration();
    let mut rois = line_rois(&lines, &guess);
    rois.compute_centroids(&spectrum, &guess).unwrap();

    assert_eq!(
        guess.fit_energy(rois.rois(), 2).unwrap_err(),
        SpectrumError::InsufficientPoints {
            needed: 3,
            found: 2
        }
    );
    assert!(guess.fit_energy(rois.rois(), 1).is_ok());
    assert!(guess.fit_energy(rois.rois(), 3).is_err());
}

#[test]
fn test_unused_rois_are_ignored() {
    let lines = ["Fe Ka", "Cu Ka", "Zn Ka"];
    let spectrum = line_spectrum(&lines);
    let guess = true_calibration();
    let mut rois = line_rois(&lines, &guess);
    rois.compute_centroids(&spectrum, &guess).unwrap();

    // A wrong energy on an unused ROI must not disturb the fit
    let zn = rois.find_energy(8.639 - 0.24, 8.639 + 0.24, &guess).unwrap();
    let roi = rois.get_mut(zn).unwrap();
    roi.energy = 20.0;
    roi.use_for_calibration = false;

    let fit = guess.fit_energy(rois.rois(), 1).unwrap();
    assert_relative_eq!(fit.calibration.slope, 0.02, max_relative = 0.01);
    // The unused ROI still gets a residual
    assert!(fit.residuals[zn] > 10.0);
}

#[test]
fn test_two_theta_from_d_spacings() {
    let cal = Calibration::new(0.0, 0.02, 0.0);
    let two_theta: f64 = 10.0;
    let sin_theta = (two_theta / 2.0).to_radians().sin();

    let rois: Vec<RegionOfInterest> = [300.0, 450.0, 600.0]
        .iter()
        .map(|&centroid| {
            let energy = cal.channel_to_energy(centroid);
            RegionOfInterest {
                left: centroid as usize - 5,
                right: centroid as usize + 5,
                centroid,
                d_spacing: 12.398 / (2.0 * energy * sin_theta),
                ..RegionOfInterest::default()
            }
        })
        .chain(std::iter::once(RegionOfInterest::new(700, 710, "no d")))
        .collect();

    let fit = cal.fit_two_theta(&rois).unwrap();
    assert_relative_eq!(fit.two_theta, 10.0, epsilon = 1e-9);
    assert!(fit.std_dev < 1e-9);
    assert_eq!(fit.per_roi.len(), 4);
    assert!(fit.per_roi[3].is_none());

    let none: Vec<RegionOfInterest> = vec![RegionOfInterest::new(1, 2, "x")];
    assert!(matches!(
        cal.fit_two_theta(&none),
        Err(SpectrumError::InsufficientPoints { .. })
    ));
}

#[test]
fn test_initial_calibration_from_strongest_line() {
    let spectrum = line_spectrum(&["Cu Ka"]);
    let cal = Calibration::initial(&spectrum, 8.048).unwrap();
    let channel = spectrum.argmax() as f64;
    assert_eq!(cal.offset, 0.0);
    assert_relative_eq!(cal.channel_to_energy(channel), 8.048, epsilon = 1e-12);
}
