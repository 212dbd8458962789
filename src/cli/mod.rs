/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Command Line Interface (CLI) module
//!
//! Every subcommand reads a JSON job file (see [`crate::input::AnalysisConfig`])
//! and prints its result as a text table or as JSON.

use crate::background::{estimate_background, BackgroundParameters};
use crate::fitting::fit_peaks;
use crate::input::{read_peaks, read_spectrum, write_spectrum, AnalysisConfig, PeakList};
use crate::spectrum::{RoiList, Spectrum};
use crate::xrf::lookup_line;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mcafit")]
#[command(about = "Background estimation, peak fitting and calibration of MCA spectra")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Estimate the background of a spectrum
    Background {
        /// JSON job file
        config: PathBuf,

        /// Write the background counts to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Fit the peaks of a peak list to a spectrum
    Fit {
        /// JSON job file
        config: PathBuf,

        /// Fit the raw spectrum without subtracting a background
        #[arg(long)]
        no_background: bool,

        /// Write the predicted spectrum to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Fit an energy calibration to the ROIs of a job
    Calibrate {
        /// JSON job file
        config: PathBuf,

        /// Polynomial degree, 1 or 2
        #[arg(long, short = 'd', default_value_t = 1)]
        degree: usize,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Run a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Background { config, output } => {
            run_background(&config, output.as_deref(), cli.format)
        }
        Commands::Fit {
            config,
            no_background,
            output,
        } => run_fit(&config, no_background, output.as_deref(), cli.format),
        Commands::Calibrate { config, degree } => run_calibrate(&config, degree, cli.format),
    }
}

fn load_job(path: &Path) -> Result<(AnalysisConfig, Spectrum)> {
    let config = AnalysisConfig::load(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let spectrum = read_spectrum(&config.spectrum)
        .with_context(|| format!("Failed to read spectrum {}", config.spectrum.display()))?;
    info!(
        "Loaded {} channels from {}",
        spectrum.len(),
        config.spectrum.display()
    );
    Ok((config, spectrum))
}

fn load_peaks(config: &AnalysisConfig) -> Result<Option<PeakList>> {
    match &config.peaks {
        Some(path) => {
            let list = read_peaks(path)
                .with_context(|| format!("Failed to read peak list {}", path.display()))?;
            Ok(Some(list))
        }
        None => Ok(None),
    }
}

/// Background parameters from the job file, else the peak list, else defaults
fn background_parameters(
    config: &AnalysisConfig,
    peaks: Option<&PeakList>,
) -> BackgroundParameters {
    config
        .background
        .clone()
        .or_else(|| peaks.map(|list| list.background.clone()))
        .unwrap_or_default()
}

fn run_background(path: &Path, output: Option<&Path>, format: OutputFormat) -> Result<()> {
    let (config, spectrum) = load_job(path)?;
    let peaks = load_peaks(&config)?;
    let params = background_parameters(&config, peaks.as_ref());

    let background = estimate_background(&spectrum, config.calibration.slope, &params)?;
    if let Some(output) = output {
        write_spectrum(output, &background)?;
    }

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "energies": config.calibration.energies(spectrum.len()),
                "counts": spectrum,
                "background": background,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Channels:        {}", spectrum.len());
            println!("Total counts:    {}", spectrum.total());
            println!("Background:      {}", background.total());
            println!(
                "Net:             {}",
                spectrum.total().saturating_sub(background.total())
            );
        }
    }
    Ok(())
}

fn run_fit(
    path: &Path,
    no_background: bool,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let (config, spectrum) = load_job(path)?;
    let Some(list) = load_peaks(&config)? else {
        bail!("Job file {} does not name a peak list", path.display());
    };

    let observed = if no_background {
        spectrum
    } else {
        let params = background_parameters(&config, Some(&list));
        let background = estimate_background(&spectrum, config.calibration.slope, &params)?;
        spectrum.subtract(&background)?
    };

    let state = config.fit.to_state(&config.calibration);
    let fit = fit_peaks(state, list.peaks, &observed)?;
    if let Some(output) = output {
        write_spectrum(output, &fit.predicted)?;
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&fit)?),
        OutputFormat::Text => print!("{}", fit.report()),
    }
    Ok(())
}

/// Fill missing ROI energies from the line table
///
/// Used ROIs whose energy stays unknown are dropped from the calibration.
fn assign_line_energies(rois: &mut RoiList) {
    for i in 0..rois.len() {
        let Some(roi) = rois.get_mut(i) else {
            continue;
        };
        if roi.energy > 0.0 {
            continue;
        }
        if let Some(energy) = lookup_line(&roi.label) {
            roi.energy = energy;
        } else if roi.use_for_calibration {
            warn!(
                "ROI '{}' has no energy and no known line; not using it for calibration",
                roi.label
            );
            roi.use_for_calibration = false;
        }
    }
}

fn run_calibrate(path: &Path, degree: usize, format: OutputFormat) -> Result<()> {
    let (config, spectrum) = load_job(path)?;
    if config.rois.is_empty() {
        bail!("Job file {} defines no ROIs", path.display());
    }

    let mut rois = RoiList::from_rois(spectrum.len(), config.rois.clone())?;
    assign_line_energies(&mut rois);
    rois.compute_centroids(&spectrum, &config.calibration)?;

    let fit = config.calibration.fit_energy(rois.rois(), degree)?;
    let uses_d_spacing = rois
        .iter()
        .any(|roi| roi.use_for_calibration && roi.d_spacing > 0.0);
    let two_theta = if uses_d_spacing {
        Some(fit.calibration.fit_two_theta(rois.rois())?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "calibration": fit.calibration,
                "residuals": fit.residuals,
                "two_theta": two_theta,
                "rois": rois.rois(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            let cal = &fit.calibration;
            println!(
                "Calibration:     offset={:.6} slope={:.6} quad={:.3e} {}",
                cal.offset, cal.slope, cal.quad, cal.units
            );
            if let Some(tt) = &two_theta {
                println!("Two-theta:       {:.4} +/- {:.4} deg", tt.two_theta, tt.std_dev);
            }
            println!(
                "{:<16} {:>10} {:>10} {:>10} {:>10}",
                "ROI", "Centroid", "Energy", "FWHM", "Residual"
            );
            for (roi, residual) in rois.iter().zip(fit.residuals.iter()) {
                println!(
                    "{:<16} {:>10.3} {:>10.4} {:>10.4} {:>10.4}",
                    roi.label, roi.centroid, roi.energy, roi.fwhm, residual
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::RegionOfInterest;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fit_command() {
        let args = ["mcafit", "fit", "job.json", "--no-background", "-f", "json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Fit {
                no_background: true,
                ..
            }
        ));
    }

    #[test]
    fn test_background_parameter_precedence() {
        let list = PeakList {
            peaks: Vec::new(),
            background: BackgroundParameters {
                exponent: 4,
                ..BackgroundParameters::default()
            },
        };
        let mut config = AnalysisConfig::default();
        assert_eq!(background_parameters(&config, Some(&list)).exponent, 4);
        assert_eq!(background_parameters(&config, None).exponent, 2);

        config.background = Some(BackgroundParameters {
            exponent: 6,
            ..BackgroundParameters::default()
        });
        assert_eq!(background_parameters(&config, Some(&list)).exponent, 6);
    }

    #[test]
    fn test_unknown_roi_lines_are_not_used() {
        let rois = vec![
            RegionOfInterest::new(100, 120, "Fe Ka"),
            RegionOfInterest::new(200, 220, "Mystery"),
            RegionOfInterest {
                energy: 9.0,
                ..RegionOfInterest::new(300, 320, "Mystery")
            },
        ];
        let mut rois = RoiList::from_rois(1024, rois).unwrap();
        assign_line_energies(&mut rois);

        let fe = rois.find(100, 120).unwrap();
        assert_eq!(rois.get(fe).unwrap().energy, 6.404);
        assert!(rois.get(fe).unwrap().use_for_calibration);

        let unknown = rois.get(rois.find(200, 220).unwrap()).unwrap();
        assert_eq!(unknown.energy, 0.0);
        assert!(!unknown.use_for_calibration);

        let explicit = rois.get(rois.find(300, 320).unwrap()).unwrap();
        assert_eq!(explicit.energy, 9.0);
        assert!(explicit.use_for_calibration);
    }
}
