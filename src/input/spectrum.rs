/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Plain counts files
//!
//! One or more counts per line, separated by whitespace or commas. Text after
//! `!` or `#` is a comment.

use super::errors::{InputError, Result};
use crate::spectrum::Spectrum;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Read a counts file into a spectrum
pub fn read_spectrum<P: AsRef<Path>>(path: P) -> Result<Spectrum> {
    let file = File::open(path.as_ref())?;
    let spectrum = parse_spectrum(BufReader::new(file))?;
    if spectrum.is_empty() {
        return Err(InputError::InvalidFormat(format!(
            "No counts found in {}",
            path.as_ref().display()
        )));
    }
    Ok(spectrum)
}

/// Parse counts from any buffered reader
///
/// Counts written as decimals are rounded. Negative or non-finite values are
/// rejected.
pub fn parse_spectrum<R: BufRead>(reader: R) -> Result<Spectrum> {
    let mut counts = Vec::new();

    for (i, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let content = match line.find(['!', '#']) {
            Some(pos) => &line[..pos],
            None => line.as_str(),
        };

        for token in content
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            counts.push(parse_count(token, i + 1)?);
        }
    }

    Ok(Spectrum::new(counts))
}

/// Write a spectrum with one count per line
pub fn write_spectrum<P: AsRef<Path>>(path: P, spectrum: &Spectrum) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for count in spectrum.iter() {
        writeln!(writer, "{}", count)?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_count(token: &str, line_number: usize) -> Result<u64> {
    if let Ok(count) = token.parse::<u64>() {
        return Ok(count);
    }
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value.round() as u64),
        _ => Err(InputError::parse(
            line_number,
            format!("Invalid count '{}'", token),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_mixed_separators() {
        let text = "# header\n1 2 3\n4,5, 6\n\n7.6 ! trailing\n";
        let spectrum = parse_spectrum(Cursor::new(text)).unwrap();
        assert_eq!(spectrum.counts(), &[1, 2, 3, 4, 5, 6, 8]);
    }

    #[test]
    fn test_invalid_count() {
        let err = parse_spectrum(Cursor::new("1 2\n3 -4\n")).unwrap_err();
        assert!(matches!(err, InputError::ParseError { line: 2, .. }));
        assert!(parse_spectrum(Cursor::new("abc")).is_err());
    }
}
