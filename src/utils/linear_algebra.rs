/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Dense linear algebra helpers
//!
//! The systems solved here are the small normal-equation matrices of the
//! polynomial and Levenberg-Marquardt fits, so a direct elimination on a
//! `faer` matrix is all that is needed.

use super::errors::{Result, UtilsError};
use faer::Mat;

/// Pivots smaller than this, after row equilibration, are treated as zero
const PIVOT_EPSILON: f64 = 1e-14;

/// Solve `a * x = b` by Gaussian elimination with partial pivoting
///
/// # Arguments
///
/// * `a` - Square coefficient matrix, consumed by the elimination
/// * `b` - Right-hand side, one entry per row of `a`
///
/// # Returns
///
/// The solution vector, or `UtilsError::SingularMatrix` when a pivot vanishes
pub fn solve_linear_system(mut a: Mat<f64>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(UtilsError::Generic(format!(
            "Cannot solve a {}x{} system with a right-hand side of length {}",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    // Row equilibration, so the pivot threshold is relative to each row
    for i in 0..n {
        let mut row_max = 0.0_f64;
        for j in 0..n {
            row_max = row_max.max(a[(i, j)].abs());
        }
        if row_max == 0.0 || !row_max.is_finite() {
            return Err(UtilsError::SingularMatrix(n));
        }
        for j in 0..n {
            a[(i, j)] /= row_max;
        }
        b[i] /= row_max;
    }

    for k in 0..n {
        // Find pivot
        let mut pivot_row = k;
        let mut pivot_val = a[(k, k)].abs();
        for i in (k + 1)..n {
            let val = a[(i, k)].abs();
            if val > pivot_val {
                pivot_row = i;
                pivot_val = val;
            }
        }

        if pivot_val <= PIVOT_EPSILON {
            return Err(UtilsError::SingularMatrix(n));
        }

        if pivot_row != k {
            for j in 0..n {
                let temp = a[(k, j)];
                a[(k, j)] = a[(pivot_row, j)];
                a[(pivot_row, j)] = temp;
            }
            b.swap(k, pivot_row);
        }

        // Eliminate below
        for i in (k + 1)..n {
            let factor = a[(i, k)] / a[(k, k)];
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                let update = factor * a[(k, j)];
                a[(i, j)] -= update;
            }
            b[i] -= factor * b[k];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[(i, j)] * x[j];
        }
        x[i] = sum / a[(i, i)];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(UtilsError::Math(
            "Linear solve produced non-finite values".to_string(),
        ));
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_small_system() {
        let mut a = Mat::<f64>::zeros(3, 3);
        a[(0, 0)] = 2.0;
        a[(0, 1)] = 1.0;
        a[(0, 2)] = -1.0;
        a[(1, 0)] = -3.0;
        a[(1, 1)] = -1.0;
        a[(1, 2)] = 2.0;
        a[(2, 0)] = -2.0;
        a[(2, 1)] = 1.0;
        a[(2, 2)] = 2.0;

        let x = solve_linear_system(a, vec![8.0, -11.0, -3.0]).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-10);
        assert_relative_eq!(x[2], -1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_singular_system() {
        let mut a = Mat::<f64>::zeros(2, 2);
        a[(0, 0)] = 1.0;
        a[(0, 1)] = 2.0;
        a[(1, 0)] = 2.0;
        a[(1, 1)] = 4.0;

        let result = solve_linear_system(a, vec![1.0, 2.0]);
        assert_eq!(result, Err(UtilsError::SingularMatrix(2)));
    }

    #[test]
    fn test_badly_scaled_system() {
        // Diagonal spanning 24 orders of magnitude
        let mut a = Mat::<f64>::zeros(3, 3);
        a[(0, 0)] = 1e12;
        a[(0, 1)] = 1e3;
        a[(1, 0)] = 1e3;
        a[(1, 1)] = 2.0;
        a[(1, 2)] = 1e-6;
        a[(2, 1)] = 1e-6;
        a[(2, 2)] = 1e-12;

        let x = solve_linear_system(a, vec![1e12 + 2e3, 1e3 + 4.0 + 3e-6, 2e-6 + 3e-12]).unwrap();
        assert_relative_eq!(x[0], 1.0, max_relative = 1e-8);
        assert_relative_eq!(x[1], 2.0, max_relative = 1e-8);
        assert_relative_eq!(x[2], 3.0, max_relative = 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Mat::<f64>::zeros(2, 2);
        assert!(solve_linear_system(a, vec![1.0]).is_err());
    }
}
