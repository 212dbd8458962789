/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! X-ray fluorescence line energies
//!
//! A small immutable table of common fluorescence lines and calibration
//! source gamma lines, used to resolve peak labels such as `"Fe Ka"` to
//! energies in keV.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Line energies in keV, keyed by `"<Element> <Line>"`
const LINES: &[(&str, f64)] = &[
    ("Si Ka", 1.740),
    ("S Ka", 2.308),
    ("Ar Ka", 2.958),
    ("K Ka", 3.314),
    ("K Kb", 3.590),
    ("Ca Ka", 3.692),
    ("Ca Kb", 4.013),
    ("Ti Ka", 4.511),
    ("Ti Kb", 4.932),
    ("Cr Ka", 5.415),
    ("Cr Kb", 5.947),
    ("Mn Ka", 5.899),
    ("Mn Kb", 6.490),
    ("Fe Ka", 6.404),
    ("Fe Kb", 7.058),
    ("Co Ka", 6.930),
    ("Co Kb", 7.649),
    ("Ni Ka", 7.478),
    ("Ni Kb", 8.265),
    ("Cu Ka", 8.048),
    ("Cu Kb", 8.905),
    ("Zn Ka", 8.639),
    ("Zn Kb", 9.572),
    ("As Ka", 10.544),
    ("As Kb", 11.726),
    ("Se Ka", 11.222),
    ("Br Ka", 11.924),
    ("Rb Ka", 13.395),
    ("Sr Ka", 14.165),
    ("Zr Ka", 15.775),
    ("Mo Ka", 17.479),
    ("Ag Ka", 22.163),
    ("Pb La", 10.551),
    ("Pb Lb", 12.614),
    ("Co57 G1", 14.413),
    ("Co57 G2", 122.06),
    ("Co57 G3", 136.47),
    ("Cd109 G1", 88.034),
    ("Am241 G1", 59.541),
];

static LINE_TABLE: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    LINES
        .iter()
        .map(|(label, energy)| (normalize(label), *energy))
        .collect()
});

fn normalize(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Energy in keV of a line label
///
/// Matching ignores case and extra whitespace, so `"fe  ka"` finds `"Fe Ka"`.
pub fn lookup_line(label: &str) -> Option<f64> {
    LINE_TABLE.get(&normalize(label)).copied()
}

/// All known line labels with their energies, sorted by energy
pub fn known_lines() -> Vec<(&'static str, f64)> {
    let mut lines = LINES.to_vec();
    lines.sort_by(|a, b| a.1.total_cmp(&b.1));
    lines
}
