/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

use clap::Parser;
use mcafit_rs::background::BackgroundParameters;
use mcafit_rs::cli::{run, Cli};
use mcafit_rs::fitting::{AmplitudeLink, EnergyMode, FwhmMode, PeakDescriptor};
use mcafit_rs::input::{
    read_peaks, read_spectrum, write_peaks, write_spectrum, AnalysisConfig, InputError,
};
use mcafit_rs::spectrum::{Calibration, RegionOfInterest, Spectrum};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn gaussian(chan: f64, center: f64, fwhm: f64, amplitude: f64) -> f64 {
    let sigma = fwhm / 2.35482;
    amplitude * (-(chan - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

/// Fe K-alpha and K-beta on a weak continuum, 10 eV per channel
fn iron_spectrum() -> Spectrum {
    let values: Vec<f64> = (0..1024)
        .map(|i| {
            let x = i as f64;
            5.0 + gaussian(x, 640.4, 15.0, 2000.0) + gaussian(x, 705.8, 16.0, 300.0)
        })
        .collect();
    Spectrum::from_f64(&values)
}

fn write_job(dir: &TempDir, peaks: &str, rois: Vec<RegionOfInterest>) -> PathBuf {
    write_spectrum(dir.path().join("counts.txt"), &iron_spectrum()).unwrap();
    fs::write(dir.path().join("lines.pks"), peaks).unwrap();

    let config = AnalysisConfig {
        spectrum: PathBuf::from("counts.txt"),
        peaks: Some(PathBuf::from("lines.pks")),
        calibration: Calibration::new(0.0, 0.01, 0.0),
        rois,
        ..AnalysisConfig::default()
    };
    let path = dir.path().join("job.json");
    config.save(&path).unwrap();
    path
}

#[test]
fn test_peak_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peaks.pks");
    let peaks = vec![
        PeakDescriptor::new("Fe Ka", 6.404),
        PeakDescriptor::new("Fe Kb", 7.058).with_amplitude(AmplitudeLink::Ratio(0.14)),
        PeakDescriptor::new("Diffraction", 15.9)
            .with_energy_mode(EnergyMode::Optimize)
            .with_fwhm(0.3, FwhmMode::Optimize),
        PeakDescriptor::new("Escape", 4.66).with_amplitude(AmplitudeLink::Excluded),
    ];
    let background = BackgroundParameters {
        exponent: 4,
        top_width: 0.5,
        bottom_width: 2.0,
        tangent: true,
        compress: 8,
    };

    write_peaks(&path, &peaks, Some(&background)).unwrap();
    let list = read_peaks(&path).unwrap();
    assert_eq!(list.peaks, peaks);
    assert_eq!(list.background, background);

    write_peaks(&path, &peaks, None).unwrap();
    let list = read_peaks(&path).unwrap();
    assert_eq!(list.background, BackgroundParameters::default());
}

#[test]
fn test_hand_written_peak_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peaks.pks");
    fs::write(
        &path,
        "4.660,,,,,Fe escape  ! numeric energy\n\
         Fe Ka\n\
         Fe Kb,,,,.5          ! half of Fe Ka\n\
         Cd109 G1\n\
         17.443,1,,,,Unknown\n",
    )
    .unwrap();

    let list = read_peaks(&path).unwrap();
    let labels: Vec<&str> = list.peaks.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, ["Fe escape", "Fe Ka", "Fe Kb", "Cd109 G1", "Unknown"]);
    assert_eq!(list.peaks[1].initial_energy, 6.404);
    assert_eq!(list.peaks[2].ampl_factor, AmplitudeLink::Ratio(0.5));
    assert_eq!(list.peaks[3].initial_energy, 88.034);
    assert_eq!(list.peaks[4].energy_flag, EnergyMode::Optimize);
}

#[test]
fn test_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        read_peaks(dir.path().join("absent.pks")),
        Err(InputError::IoError(_))
    ));
    assert!(matches!(
        read_spectrum(dir.path().join("absent.txt")),
        Err(InputError::IoError(_))
    ));

    let empty = dir.path().join("empty.txt");
    fs::write(&empty, "# nothing here\n").unwrap();
    assert!(matches!(
        read_spectrum(&empty),
        Err(InputError::InvalidFormat(_))
    ));
}

#[test]
fn test_spectrum_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counts.txt");
    let spectrum = iron_spectrum();
    write_spectrum(&path, &spectrum).unwrap();
    assert_eq!(read_spectrum(&path).unwrap(), spectrum);
}

#[test]
fn test_cli_background_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job(&dir, "Background_compress, 8\nFe Ka\n", Vec::new());
    let output = dir.path().join("background.txt");

    let cli = Cli::try_parse_from([
        "mcafit",
        "background",
        job.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ])
    .unwrap();
    run(cli).unwrap();

    let background = read_spectrum(&output).unwrap();
    let spectrum = iron_spectrum();
    assert_eq!(background.len(), spectrum.len());
    assert!(background[640] < spectrum[640] / 10);
}

#[test]
fn test_cli_fit_and_calibrate() {
    let dir = tempfile::tempdir().unwrap();
    let rois = vec![
        RegionOfInterest::new(620, 660, "Fe Ka"),
        RegionOfInterest::new(690, 722, "Fe Kb"),
    ];
    let job = write_job(&dir, "Fe Ka\nFe Kb\n", rois);
    let predicted = dir.path().join("predicted.txt");

    let cli = Cli::try_parse_from([
        "mcafit",
        "fit",
        job.to_str().unwrap(),
        "-o",
        predicted.to_str().unwrap(),
        "--format",
        "json",
    ])
    .unwrap();
    run(cli).unwrap();
    let predicted = read_spectrum(&predicted).unwrap();
    assert!(predicted.argmax().abs_diff(640) <= 1);

    let cli = Cli::try_parse_from(["mcafit", "calibrate", job.to_str().unwrap()]).unwrap();
    run(cli).unwrap();
}

#[test]
fn test_cli_fit_requires_peak_list() {
    let dir = tempfile::tempdir().unwrap();
    write_spectrum(dir.path().join("counts.txt"), &iron_spectrum()).unwrap();
    let job = dir.path().join("job.json");
    fs::write(&job, r#"{"spectrum": "counts.txt"}"#).unwrap();

    let cli = Cli::try_parse_from(["mcafit", "fit", job.to_str().unwrap()]).unwrap();
    assert!(run(cli).is_err());
}
