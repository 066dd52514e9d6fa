//! Gauss-Newton step computation.
//!
//! The step solves the normal equations `JᵀJ Δx = -Jᵀr`. The system is
//! symmetric positive semi-definite, so Cholesky is tried first; SVD supplies
//! the rank check.

use nalgebra::{Matrix6, Vector6};

use crate::error::{RegistrationError, Result};
use crate::objective::NormalEquations;

/// Solve `jtj · Δx = -jtf`.
///
/// # Arguments
/// * `jtf` - Gradient `Σ w·Jᵀr` (6x1)
/// * `jtj` - Normal matrix `Σ w·JᵀJ` (6x6)
/// * `tolerance` - Smallest accepted ratio `σ_min / σ_max`
///
/// # Errors
/// [`RegistrationError::SingularSystem`] when the matrix is zero, rank
/// deficient relative to `tolerance`, or the step is not finite.
pub fn gauss_newton_step(
    jtf: &Vector6<f64>,
    jtj: &Matrix6<f64>,
    tolerance: f64,
) -> Result<Vector6<f64>> {
    if !(jtj.iter().all(|v| v.is_finite()) && jtf.iter().all(|v| v.is_finite())) {
        return Err(RegistrationError::SingularSystem(
            "non-finite normal equations".to_string(),
        ));
    }

    let svd = jtj.svd(false, false);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();

    if !(max_sv.is_finite() && max_sv > 0.0) {
        return Err(RegistrationError::SingularSystem(format!(
            "normal matrix is degenerate (largest singular value {max_sv})"
        )));
    }
    if min_sv / max_sv < tolerance {
        return Err(RegistrationError::SingularSystem(format!(
            "rank deficient normal matrix (condition ratio {:.3e} < {tolerance:.1e})",
            min_sv / max_sv
        )));
    }

    let neg_jtf = -jtf;
    let delta = match jtj.cholesky() {
        Some(chol) => chol.solve(&neg_jtf),
        None => jtj
            .svd(true, true)
            .solve(&neg_jtf, max_sv * tolerance)
            .map_err(|e| RegistrationError::SingularSystem(e.to_string()))?,
    };

    if delta.iter().all(|v| v.is_finite()) {
        Ok(delta)
    } else {
        Err(RegistrationError::SingularSystem(
            "non-finite Gauss-Newton step".to_string(),
        ))
    }
}

/// Step for an accumulated system; zero inliers is singular.
pub fn solve_normal_equations(eq: &NormalEquations, tolerance: f64) -> Result<Vector6<f64>> {
    if eq.inlier == 0 {
        return Err(RegistrationError::SingularSystem(format!(
            "no inlier correspondences ({} outliers, {} invalid)",
            eq.outlier, eq.invalid
        )));
    }
    gauss_newton_step(&eq.jtf, &eq.jtj, tolerance)
}

/// Ratio of largest to smallest singular value.
pub fn condition_number(jtj: &Matrix6<f64>) -> f64 {
    let svd = jtj.svd(false, false);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();

    if min_sv < 1e-15 {
        f64::INFINITY
    } else {
        max_sv / min_sv
    }
}
