/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Bounded non-linear least squares
//!
//! The peak fitter only needs a narrow interface: minimise the sum of squared
//! residuals of a closure over a parameter vector in which some parameters are
//! fixed and others are confined to a box. [`LevenbergMarquardt`] is the
//! implementation used by default.

use crate::utils::solve_linear_system;
use faer::Mat;
use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fix/bound specification of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterConstraint {
    /// Keep the parameter at its initial value
    pub fixed: bool,
    /// Lower bound, if any
    pub lower: Option<f64>,
    /// Upper bound, if any
    pub upper: Option<f64>,
}

impl ParameterConstraint {
    /// An unbounded free parameter
    pub fn free() -> Self {
        Self::default()
    }

    /// A parameter held at its initial value
    pub fn fixed() -> Self {
        Self {
            fixed: true,
            ..Self::default()
        }
    }

    /// A free parameter confined to `[lower, upper]`
    pub fn bounded(lower: f64, upper: f64) -> Self {
        Self {
            fixed: false,
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// A free parameter with only a lower bound
    pub fn at_least(lower: f64) -> Self {
        Self {
            fixed: false,
            lower: Some(lower),
            upper: None,
        }
    }

    /// Clamp a value into the bounds
    pub fn project(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lower) = self.lower {
            v = v.max(lower);
        }
        if let Some(upper) = self.upper {
            v = v.min(upper);
        }
        v
    }
}

/// Tuning knobs of a solver run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Relative change in chi-square or parameters regarded as converged
    pub tolerance: f64,
    /// Maximum number of iterations
    pub max_iterations: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 20,
        }
    }
}

/// Termination status of a least-squares fit
///
/// Codes of zero or less are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitStatus {
    /// No fit has been performed yet
    #[default]
    NotRun,
    /// Inconsistent input or no free parameters
    InvalidInput,
    /// The residuals became NaN or infinite
    NonFinite,
    /// Relative chi-square change below tolerance
    ChiSquareConverged,
    /// Relative parameter change below tolerance
    ParametersConverged,
    /// Both chi-square and parameters converged
    BothConverged,
    /// The gradient of chi-square vanished
    GradientVanished,
    /// Iteration limit reached
    MaxIterations,
    /// No step could reduce chi-square further
    NoFurtherReduction,
}

impl FitStatus {
    /// Integer status code
    pub fn code(&self) -> i32 {
        match self {
            FitStatus::NotRun | FitStatus::InvalidInput => 0,
            FitStatus::NonFinite => -1,
            FitStatus::ChiSquareConverged => 1,
            FitStatus::ParametersConverged => 2,
            FitStatus::BothConverged => 3,
            FitStatus::GradientVanished => 4,
            FitStatus::MaxIterations => 5,
            FitStatus::NoFurtherReduction => 6,
        }
    }

    /// Whether the fit produced usable parameters
    pub fn is_success(&self) -> bool {
        self.code() > 0
    }

    fn description(&self) -> &'static str {
        match self {
            FitStatus::NotRun => "fit not run",
            FitStatus::InvalidInput => "invalid input",
            FitStatus::NonFinite => "non-finite residuals",
            FitStatus::ChiSquareConverged => "chi-square converged",
            FitStatus::ParametersConverged => "parameters converged",
            FitStatus::BothConverged => "chi-square and parameters converged",
            FitStatus::GradientVanished => "gradient vanished",
            FitStatus::MaxIterations => "maximum iterations reached",
            FitStatus::NoFurtherReduction => "no further reduction in chi-square possible",
        }
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Result of a solver run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    /// Best parameters found
    pub params: Vec<f64>,
    pub status: FitStatus,
    pub n_iterations: usize,
    pub n_evaluations: usize,
    /// Sum of squared residuals at `params`
    pub chi_square: f64,
    /// Human-readable reason for termination
    pub message: String,
}

/// A bounded non-linear least-squares minimiser
pub trait LeastSquaresSolver: Send + Sync {
    /// Minimise `sum(residuals(p)^2)` starting from `initial`
    ///
    /// Fixed parameters keep their initial values. Failures are reported
    /// through [`SolverOutcome::status`], never by panicking.
    fn solve(
        &self,
        residuals: &dyn Fn(&[f64]) -> Vec<f64>,
        initial: &[f64],
        constraints: &[ParameterConstraint],
        options: &SolverOptions,
    ) -> SolverOutcome;
}

/// Levenberg-Marquardt with box constraints
///
/// Uses a forward-difference Jacobian over the free parameters, Marquardt
/// scaling of the damping term and projection of every trial step onto the
/// bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardt {
    /// Initial damping factor
    pub initial_lambda: f64,
    /// Damping above which the search gives up
    pub max_lambda: f64,
    /// Relative finite-difference step
    pub relative_step: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            initial_lambda: 1e-3,
            max_lambda: 1e10,
            relative_step: 1e-6,
        }
    }
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

impl LevenbergMarquardt {
    fn outcome(
        params: Vec<f64>,
        status: FitStatus,
        n_iterations: usize,
        n_evaluations: usize,
        chi_square: f64,
    ) -> SolverOutcome {
        SolverOutcome {
            params,
            status,
            n_iterations,
            n_evaluations,
            chi_square,
            message: status.description().to_string(),
        }
    }

    /// Forward-difference Jacobian of the residuals over the free parameters
    fn jacobian(
        &self,
        residuals: &dyn Fn(&[f64]) -> Vec<f64>,
        params: &[f64],
        base: &[f64],
        free: &[usize],
        constraints: &[ParameterConstraint],
    ) -> Option<Array2<f64>> {
        let mut jac = Array2::<f64>::zeros((base.len(), free.len()));
        let mut trial = params.to_vec();

        for (col, &k) in free.iter().enumerate() {
            let mut h = self.relative_step * params[k].abs().max(1e-3);
            if let Some(upper) = constraints[k].upper {
                if params[k] + h > upper {
                    h = -h;
                }
            }
            trial[k] = params[k] + h;
            let shifted = residuals(&trial);
            trial[k] = params[k];
            if shifted.len() != base.len() || !all_finite(&shifted) {
                return None;
            }
            for (row, (s, b)) in shifted.iter().zip(base.iter()).enumerate() {
                jac[[row, col]] = (s - b) / h;
            }
        }
        Some(jac)
    }
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn solve(
        &self,
        residuals: &dyn Fn(&[f64]) -> Vec<f64>,
        initial: &[f64],
        constraints: &[ParameterConstraint],
        options: &SolverOptions,
    ) -> SolverOutcome {
        if constraints.len() != initial.len()
            || !all_finite(initial)
            || !(options.tolerance > 0.0)
        {
            return Self::outcome(initial.to_vec(), FitStatus::InvalidInput, 0, 0, f64::NAN);
        }

        let mut params: Vec<f64> = initial
            .iter()
            .zip(constraints.iter())
            .map(|(&p, c)| if c.fixed { p } else { c.project(p) })
            .collect();
        let free: Vec<usize> = (0..params.len())
            .filter(|&k| !constraints[k].fixed)
            .collect();

        let mut r = residuals(&params);
        let mut n_evaluations = 1;
        if !all_finite(&r) {
            return Self::outcome(params, FitStatus::NonFinite, 0, n_evaluations, f64::NAN);
        }
        let mut chi_square = sum_of_squares(&r);

        if free.is_empty() || r.is_empty() {
            let mut outcome =
                Self::outcome(params, FitStatus::InvalidInput, 0, n_evaluations, chi_square);
            outcome.message = "no free parameters".to_string();
            return outcome;
        }

        let n_free = free.len();
        let mut lambda = self.initial_lambda;

        for iteration in 1..=options.max_iterations {
            let jac = match self.jacobian(residuals, &params, &r, &free, constraints) {
                Some(jac) => jac,
                None => {
                    return Self::outcome(
                        params,
                        FitStatus::NonFinite,
                        iteration,
                        n_evaluations,
                        chi_square,
                    )
                }
            };
            n_evaluations += n_free;

            let r_vec = Array1::from(r.clone());
            let gradient = jac.t().dot(&r_vec);
            let jtj = jac.t().dot(&jac);

            let gradient_norm = gradient.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
            if gradient_norm == 0.0 {
                return Self::outcome(
                    params,
                    FitStatus::GradientVanished,
                    iteration,
                    n_evaluations,
                    chi_square,
                );
            }
            let column_scale: Vec<f64> = (0..n_free)
                .map(|i| {
                    let diag = jtj[[i, i]];
                    if diag > 0.0 && diag.is_finite() {
                        diag.sqrt()
                    } else {
                        0.0
                    }
                })
                .collect();

            // Damped steps until chi-square decreases
            let accepted = loop {
                if lambda > self.max_lambda {
                    break None;
                }

                // Solved in Jacobi-scaled form: unit diagonal plus lambda
                let mut a = Mat::<f64>::zeros(n_free, n_free);
                let mut b = vec![0.0; n_free];
                for i in 0..n_free {
                    if column_scale[i] == 0.0 {
                        // Parameter has no effect on the residuals
                        a[(i, i)] = 1.0;
                        continue;
                    }
                    for j in 0..n_free {
                        if column_scale[j] > 0.0 {
                            a[(i, j)] = jtj[[i, j]] / (column_scale[i] * column_scale[j]);
                        }
                    }
                    a[(i, i)] = 1.0 + lambda;
                    b[i] = -gradient[i] / column_scale[i];
                }

                let delta: Vec<f64> = match solve_linear_system(a, b) {
                    Ok(scaled) => scaled
                        .iter()
                        .zip(column_scale.iter())
                        .map(|(&y, &d)| if d > 0.0 { y / d } else { 0.0 })
                        .collect(),
                    Err(_) => {
                        lambda *= 10.0;
                        continue;
                    }
                };

                let mut trial = params.clone();
                for (d, &k) in delta.iter().zip(free.iter()) {
                    trial[k] = constraints[k].project(params[k] + d);
                }
                let trial_r = residuals(&trial);
                n_evaluations += 1;
                if trial_r.len() != r.len() || !all_finite(&trial_r) {
                    lambda *= 10.0;
                    continue;
                }

                let trial_chi = sum_of_squares(&trial_r);
                if trial_chi < chi_square {
                    lambda = (lambda / 10.0).max(1e-12);
                    break Some((trial, trial_r, trial_chi));
                }
                lambda *= 10.0;
            };

            let (trial, trial_r, trial_chi) = match accepted {
                Some(step) => step,
                None => {
                    return Self::outcome(
                        params,
                        FitStatus::NoFurtherReduction,
                        iteration,
                        n_evaluations,
                        chi_square,
                    )
                }
            };

            let chi_change = (chi_square - trial_chi) / chi_square.max(f64::MIN_POSITIVE);
            let step_norm = free
                .iter()
                .map(|&k| (trial[k] - params[k]).powi(2))
                .sum::<f64>()
                .sqrt();
            let param_norm = free.iter().map(|&k| params[k].powi(2)).sum::<f64>().sqrt();
            let param_change = step_norm / param_norm.max(f64::MIN_POSITIVE);

            debug!(
                "LM iteration {}: chi2 {:.6e} -> {:.6e}, lambda {:.1e}",
                iteration, chi_square, trial_chi, lambda
            );

            params = trial;
            r = trial_r;
            chi_square = trial_chi;

            let status = match (
                chi_change <= options.tolerance,
                param_change <= options.tolerance,
            ) {
                (true, true) => Some(FitStatus::BothConverged),
                (true, false) => Some(FitStatus::ChiSquareConverged),
                (false, true) => Some(FitStatus::ParametersConverged),
                (false, false) => None,
            };
            if let Some(status) = status {
                return Self::outcome(params, status, iteration, n_evaluations, chi_square);
            }
        }

        Self::outcome(
            params,
            FitStatus::MaxIterations,
            options.max_iterations,
            n_evaluations,
            chi_square,
        )
    }
}
