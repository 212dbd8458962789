/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Peak-list text format
//!
//! A peak list is a plain text file with one peak per line:
//!
//! ```text
//! Background_exponent, 4
//! Background_bottom_width, 4
//! 4.660,,,,,Fe escape   ! numeric energy
//! Fe Ka                 ! energy looked up from the line table
//! Fe Kb,,,,.5           ! area fixed at half of Fe Ka
//! 15.9,1,.3,1,,Diffraction
//! ```
//!
//! Peak fields are `energy, energy_flag, fwhm, fwhm_flag, ampl_factor, label`
//! and every field after the energy is optional. The energy may be a line
//! label such as `Fe Ka`. Lines starting with `Background_` set the
//! background parameters. Text after `!` or `#` is ignored.

use super::errors::{InputError, Result};
use crate::background::BackgroundParameters;
use crate::fitting::{AmplitudeLink, EnergyMode, FwhmMode, PeakDescriptor};
use crate::xrf::lookup_line;
use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Peaks and background parameters read from a peak-list file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakList {
    pub peaks: Vec<PeakDescriptor>,
    /// Background parameters, defaults for any key the file does not set
    pub background: BackgroundParameters,
}

/// Read a peak-list file
pub fn read_peaks<P: AsRef<Path>>(path: P) -> Result<PeakList> {
    let file = File::open(path.as_ref())?;
    let list = parse_peaks(BufReader::new(file))?;
    debug!(
        "Read {} peaks from {}",
        list.peaks.len(),
        path.as_ref().display()
    );
    Ok(list)
}

/// Parse a peak list from any buffered reader
pub fn parse_peaks<R: BufRead>(reader: R) -> Result<PeakList> {
    let mut list = PeakList::default();

    for (i, line_result) in reader.lines().enumerate() {
        let line_number = i + 1;
        let line = line_result?;
        let content = strip_comment(&line).trim();
        if content.is_empty() {
            continue;
        }

        if let Some((key, value)) = content.split_once(',') {
            if parse_background_line(key.trim(), value.trim(), line_number, &mut list.background)? {
                continue;
            }
        }
        list.peaks.push(parse_peak_line(content, line_number)?);
    }

    Ok(list)
}

/// Parse one peak line
///
/// `line_number` is only used in error messages.
pub fn parse_peak_line(text: &str, line_number: usize) -> Result<PeakDescriptor> {
    let fields: Vec<&str> = strip_comment(text).split(',').map(str::trim).collect();
    let first = fields.first().copied().unwrap_or("");
    if first.is_empty() {
        return Err(InputError::parse(line_number, "Missing peak energy"));
    }

    let mut peak = match first.parse::<f64>() {
        Ok(energy) => PeakDescriptor::new("", energy),
        Err(_) => {
            let energy = lookup_line(first).unwrap_or_else(|| {
                warn!(
                    "Unknown line '{}' at line {}, using energy 0",
                    first, line_number
                );
                0.0
            });
            PeakDescriptor::new(first, energy)
        }
    };

    if let Some(flag) = optional_field(&fields, 1) {
        let flag = parse_flag(flag, line_number)?;
        peak.energy_flag = EnergyMode::from_flag(flag).ok_or_else(|| {
            InputError::parse(line_number, format!("Invalid energy flag {}", flag))
        })?;
    }
    if let Some(fwhm) = optional_field(&fields, 2) {
        peak.initial_fwhm = parse_number(fwhm, "FWHM", line_number)?;
    }
    if let Some(flag) = optional_field(&fields, 3) {
        let flag = parse_flag(flag, line_number)?;
        peak.fwhm_flag = FwhmMode::from_flag(flag).ok_or_else(|| {
            InputError::parse(line_number, format!("Invalid FWHM flag {}", flag))
        })?;
    }
    if let Some(factor) = optional_field(&fields, 4) {
        let factor = parse_number(factor, "amplitude factor", line_number)?;
        peak.ampl_factor = AmplitudeLink::from_factor(factor)?;
    }
    if let Some(label) = optional_field(&fields, 5) {
        peak.label = label.to_string();
    }

    Ok(peak)
}

/// Write a peak-list file, with the background block first when given
pub fn write_peaks<P: AsRef<Path>>(
    path: P,
    peaks: &[PeakDescriptor],
    background: Option<&BackgroundParameters>,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    format_peaks(&mut writer, peaks, background)?;
    writer.flush()?;
    Ok(())
}

/// Write a peak list to any writer
pub fn format_peaks<W: Write>(
    writer: &mut W,
    peaks: &[PeakDescriptor],
    background: Option<&BackgroundParameters>,
) -> Result<()> {
    if let Some(bg) = background {
        writeln!(writer, "Background_exponent, {}", bg.exponent)?;
        writeln!(writer, "Background_top_width, {}", bg.top_width)?;
        writeln!(writer, "Background_bottom_width, {}", bg.bottom_width)?;
        writeln!(writer, "Background_tangent, {}", u8::from(bg.tangent))?;
        writeln!(writer, "Background_compress, {}", bg.compress)?;
    }
    for peak in peaks {
        writeln!(
            writer,
            "{}, {}, {}, {}, {}, {}",
            peak.initial_energy,
            peak.energy_flag.flag(),
            peak.initial_fwhm,
            peak.fwhm_flag.flag(),
            peak.ampl_factor.factor(),
            peak.label
        )?;
    }
    Ok(())
}

/// Apply a `Background_*` line; returns false if `key` is not a background key
fn parse_background_line(
    key: &str,
    value: &str,
    line_number: usize,
    background: &mut BackgroundParameters,
) -> Result<bool> {
    match key.to_ascii_lowercase().as_str() {
        "background_exponent" => {
            let exponent = parse_number(value, "exponent", line_number)?;
            if exponent < 0.0 || exponent.fract() != 0.0 {
                return Err(InputError::parse(
                    line_number,
                    format!("Background exponent must be a whole number, got {}", value),
                ));
            }
            background.exponent = exponent as u32;
        }
        "background_top_width" => {
            background.top_width = parse_number(value, "top width", line_number)?;
        }
        "background_bottom_width" => {
            background.bottom_width = parse_number(value, "bottom width", line_number)?;
        }
        "background_tangent" => {
            background.tangent = parse_flag(value, line_number)? != 0;
        }
        "background_compress" => {
            let compress = parse_flag(value, line_number)?;
            background.compress = usize::try_from(compress).map_err(|_| {
                InputError::parse(line_number, format!("Invalid compression factor {}", compress))
            })?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn strip_comment(line: &str) -> &str {
    match line.find(['!', '#']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn optional_field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields.get(index).copied().filter(|f| !f.is_empty())
}

fn parse_number(text: &str, what: &str, line_number: usize) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| InputError::parse(line_number, format!("Invalid {}: '{}'", what, text)))
}

/// Integer flag, written either as `1` or `1.0`
fn parse_flag(text: &str, line_number: usize) -> Result<i64> {
    let value = parse_number(text, "flag", line_number)?;
    if !value.is_finite() {
        return Err(InputError::parse(line_number, format!("Invalid flag: '{}'", text)));
    }
    Ok(value.trunc() as i64)
}
