/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Polynomial peak-clipping passes
//!
//! Both passes slide a power-law kernel `d^n * 100 / w^n` along the spectrum,
//! where `d` is the distance in channels from the kernel centre and `w` the
//! half-width in channels. The kernel reaches the reference amplitude of 100
//! counts at `d = w`.

/// Kernel amplitude at the half-width
const REFERENCE_AMPL: f64 = 100.0;

/// Denominator used when the width is zero
const TINY: f64 = 1e-20;

/// Half-size of the window used to estimate the local tangent
pub const MAX_TANGENT: usize = 2;

/// Lookup table of the clipping kernel, indexed by distance from its centre
#[derive(Debug, Clone)]
pub struct PowerTable {
    values: Vec<f64>,
}

impl PowerTable {
    /// Build the kernel for a width in channels
    ///
    /// The table stops at the last distance whose value does not exceed
    /// `max_counts`, and never extends further than `n_channels - 1`.
    pub fn new(chan_width: f64, exponent: u32, max_counts: f64, n_channels: usize) -> Self {
        let denom = chan_width.powi(exponent as i32).max(TINY);
        let scale = REFERENCE_AMPL / denom;

        let mut values = vec![0.0];
        for d in 1..n_channels {
            let value = (d as f64).powi(exponent as i32) * scale;
            if value > max_counts {
                break;
            }
            values.push(value);
        }
        Self { values }
    }

    /// Largest distance covered by the kernel
    pub fn support(&self) -> usize {
        self.values.len() - 1
    }

    /// Kernel value at distance `d` from the centre
    pub fn at(&self, d: usize) -> f64 {
        self.values[d]
    }

    /// Channel range covered by the kernel centred on `center`
    fn window(&self, center: usize, n: usize) -> std::ops::RangeInclusive<usize> {
        let m = self.support();
        center.saturating_sub(m)..=(center + m).min(n - 1)
    }
}

/// Concave-up pass: fill narrow dips from above
///
/// Every channel raises its neighbours to at least its own counts plus the
/// kernel, giving an upper envelope of the spectrum.
pub fn top_pass(scratch: &[f64], table: &PowerTable) -> Vec<f64> {
    let n = scratch.len();
    let mut envelope = scratch.to_vec();
    for (center, &counts) in scratch.iter().enumerate() {
        for j in table.window(center, n) {
            let test = counts + table.at(j.abs_diff(center));
            if test > envelope[j] {
                envelope[j] = test;
            }
        }
    }
    envelope
}

/// Concave-down pass: fit the tallest kernel under the spectrum at each channel
///
/// For each centre the kernel is raised until it touches `scratch`; the
/// background is the pointwise maximum of all such kernels. With `tangent`
/// set the kernels are tilted to follow the local slope of `scratch`.
pub fn bottom_pass(scratch: &[f64], table: &PowerTable, tangent: bool) -> Vec<f64> {
    let n = scratch.len();
    let mut background = vec![f64::NEG_INFINITY; n];

    for center in 0..n {
        let slope = if tangent {
            tangent_slope(scratch, center)
        } else {
            0.0
        };
        let lin_offset = |j: usize| scratch[center] + (j as f64 - center as f64) * slope;

        let window = table.window(center, n);
        let height = window
            .clone()
            .map(|j| scratch[j] - lin_offset(j) + table.at(j.abs_diff(center)))
            .fold(f64::INFINITY, f64::min);

        for j in window {
            let test = height + lin_offset(j) - table.at(j.abs_diff(center));
            if test > background[j] {
                background[j] = test;
            }
        }
    }
    background
}

/// Mean finite-difference slope of `scratch` around `center`
fn tangent_slope(scratch: &[f64], center: usize) -> f64 {
    let first = center.saturating_sub(MAX_TANGENT);
    let last = (center + MAX_TANGENT).min(scratch.len() - 1);
    if last == first {
        return 0.0;
    }

    let sum: f64 = (first..=last)
        .filter(|&j| j != center)
        .map(|j| (scratch[center] - scratch[j]) / (center as f64 - j as f64))
        .sum();
    sum / (last - first) as f64
}
