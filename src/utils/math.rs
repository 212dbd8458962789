/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Mathematical utility functions for MCA spectral analysis
//!
//! This module provides the small numerical kernels shared by the rest of the
//! crate: weighted polynomial least squares, the linearised Gaussian fit used
//! for ROI centroids, spectrum rebinning, and quadratic root finding.

use super::errors::{Result, UtilsError};
use super::linear_algebra::solve_linear_system;
use faer::Mat;

/// Perform a weighted least-squares polynomial fit
///
/// Builds the normal equations `sum(w * x^(j+k)) * c_k = sum(w * y * x^j)` and
/// solves them directly.
///
/// # Arguments
///
/// * `x` - Independent variable values
/// * `y` - Dependent variable values, same length as `x`
/// * `w` - Weight of each point, same length as `x`
/// * `degree` - Degree of the polynomial to fit
///
/// # Returns
///
/// Coefficients in ascending order of power (`degree + 1` values)
pub fn polyfitw(x: &[f64], y: &[f64], w: &[f64], degree: usize) -> Result<Vec<f64>> {
    if x.len() != y.len() || x.len() != w.len() {
        return Err(UtilsError::Generic(format!(
            "x, y and w must have the same length (got {}, {}, {})",
            x.len(),
            y.len(),
            w.len()
        )));
    }

    let n_coeffs = degree + 1;
    if x.len() < n_coeffs {
        return Err(UtilsError::Generic(format!(
            "Need at least {} points for a degree {} polynomial, got {}",
            n_coeffs,
            degree,
            x.len()
        )));
    }

    // Power sums sum(w * x^p) for p = 0..=2*degree
    let mut power_sums = vec![0.0; 2 * degree + 1];
    let mut b = vec![0.0; n_coeffs];
    for ((&xi, &yi), &wi) in x.iter().zip(y.iter()).zip(w.iter()) {
        let mut z = 1.0;
        for (p, sum) in power_sums.iter_mut().enumerate() {
            *sum += wi * z;
            if p < n_coeffs {
                b[p] += wi * yi * z;
            }
            z *= xi;
        }
    }

    let mut a = Mat::<f64>::zeros(n_coeffs, n_coeffs);
    for j in 0..n_coeffs {
        for k in 0..n_coeffs {
            a[(j, k)] = power_sums[j + k];
        }
    }

    solve_linear_system(a, b)
}

/// Evaluate a polynomial with coefficients in ascending order of power
pub fn evaluate_polynomial(x: f64, coeffs: &[f64]) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Result of the linearised Gaussian fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianEstimate {
    /// Peak height
    pub amplitude: f64,
    /// Peak position, in the units of the abscissa
    pub centroid: f64,
    /// Full width at half maximum, in the units of the abscissa
    pub fwhm: f64,
}

/// Fit a single peak to a Gaussian using a linearising method
///
/// The logarithm of the counts is fitted with a parabola, weighted by the
/// squared counts, which turns the Gaussian fit into a linear least-squares
/// problem. The curvature is clamped to at most `-0.001` so that flat or
/// concave-up data still yield a finite width.
///
/// # Arguments
///
/// * `chans` - Channel numbers of the region
/// * `counts` - Net counts in each channel
pub fn fit_gaussian(chans: &[f64], counts: &[f64]) -> Result<GaussianEstimate> {
    if chans.len() != counts.len() {
        return Err(UtilsError::Generic(
            "chans and counts must have the same length".to_string(),
        ));
    }
    if chans.len() < 3 {
        return Err(UtilsError::Generic(
            "Need at least 3 channels to fit a Gaussian".to_string(),
        ));
    }

    let center = (chans[0] + chans[chans.len() - 1]) / 2.0;
    let x: Vec<f64> = chans.iter().map(|&c| c - center).collect();
    let y: Vec<f64> = counts.iter().map(|&c| c.max(1.0).ln()).collect();
    let w: Vec<f64> = counts.iter().map(|&c| (c * c).max(1.0)).collect();

    let mut fic = polyfitw(&x, &y, &w, 2)?;
    // Protect against divide by 0
    fic[2] = fic[2].min(-0.001);

    let amplitude = (fic[0] - fic[1] * fic[1] / (4.0 * fic[2])).exp();
    let centroid = center - fic[1] / (2.0 * fic[2]);
    let sigma = (-1.0 / (2.0 * fic[2])).sqrt();

    Ok(GaussianEstimate {
        amplitude,
        centroid,
        fwhm: super::sigma_to_fwhm(sigma),
    })
}

/// Compress a 1-D array by an integer factor, averaging each block
///
/// The factor must divide the array length evenly.
pub fn compress_array(array: &[f64], factor: usize) -> Result<Vec<f64>> {
    if factor == 0 {
        return Err(UtilsError::Generic(
            "Compression factor must be at least 1".to_string(),
        ));
    }
    if array.len() % factor != 0 {
        return Err(UtilsError::Generic(format!(
            "Compression factor {} is not an integer divisor of array length {}",
            factor,
            array.len()
        )));
    }

    Ok(array
        .chunks_exact(factor)
        .map(|block| block.iter().sum::<f64>() / factor as f64)
        .collect())
}

/// Expand a 1-D array by an integer factor
///
/// With `sample` set each element is simply repeated. Otherwise the repeated
/// array is smoothed with a box kernel of width `factor`, replicating the edge
/// values so the ends are not pulled towards zero.
pub fn expand_array(array: &[f64], factor: usize, sample: bool) -> Vec<f64> {
    if factor <= 1 || array.is_empty() {
        return array.to_vec();
    }

    let repeated: Vec<f64> = array
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(factor))
        .collect();
    if sample {
        return repeated;
    }

    let n = repeated.len() as isize;
    let shift = (factor as isize - 1) / 2;
    (0..n)
        .map(|i| {
            let first = i + shift - factor as isize + 1;
            let sum: f64 = (first..=i + shift)
                .map(|m| repeated[m.clamp(0, n - 1) as usize])
                .sum();
            sum / factor as f64
        })
        .collect()
}

/// Real roots of `a*x^2 + b*x + c = 0`, smaller root first
///
/// Falls back to the single linear root (returned twice) when `a` is zero.
/// Returns `None` when there is no real root.
pub fn quadratic_roots(a: f64, b: f64, c: f64) -> Option<(f64, f64)> {
    if a == 0.0 {
        if b == 0.0 {
            return None;
        }
        let root = -c / b;
        return Some((root, root));
    }

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    // Numerically stable form avoiding cancellation
    let q = -0.5 * (b + b.signum() * discriminant.sqrt());
    let (r1, r2) = if q == 0.0 {
        (0.0, 0.0)
    } else {
        (q / a, c / q)
    };
    Some((r1.min(r2), r1.max(r2)))
}

/// Mean and sample standard deviation of a set of values
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() == 1 {
        return Some((mean, 0.0));
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}
