//! Small dense-matrix helpers on top of `nalgebra`.

use std::fmt::Write;

use nalgebra::{DMatrix, Matrix2};

use crate::Float;
use crate::error::{AlignmentError, Result};

/// Determinants below this are treated as zero when inverting 2x2 matrices.
pub(crate) const DETERMINANT_EPSILON: f64 = 1e-10;

/// Reciprocal condition number of the design matrix below which a least-squares
/// fit is rejected. The normal matrix squares the condition number, so this
/// corresponds to roughly `1e-14` on `XᵗX`.
pub(crate) const RCOND_LIMIT: f64 = 1e-7;

/// Closed-form inverse of a 2x2 matrix.
pub(crate) fn invert_2x2<F: Float>(m: &Matrix2<F>) -> Result<Matrix2<F>> {
    let det = m.m11 * m.m22 - m.m12 * m.m21;
    if det.abs() < nalgebra::convert(DETERMINANT_EPSILON) {
        return Err(AlignmentError::SingularMatrix {
            determinant: nalgebra::try_convert::<F, f64>(det).unwrap_or(0.),
        });
    }

    Ok(Matrix2::new(m.m22 / det, -m.m12 / det, -m.m21 / det, m.m11 / det))
}

/// Solve the normal equation `θ = (XᵗX)⁻¹ Xᵗ y`.
///
/// # Arguments
/// - `features`: design matrix `X` of shape `(n_samples, n_features)`.
/// - `values`: target matrix `y` of shape `(n_samples, n_targets)`.
///
/// # Returns
/// `θ` of shape `(n_features, n_targets)`, or [`AlignmentError::IllConditioned`]
/// if `X` is too close to rank deficient for the inverse to be trusted.
///
/// The columns of `X` are equilibrated before solving (`X = X_s D`, `θ = D⁻¹ θ_s`),
/// so squared axis features in the 10⁴..10⁵ range do not swamp the constant term.
pub(crate) fn solve_normal_equation(
    features: &DMatrix<f64>,
    values: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let scales = features
        .column_iter()
        .map(|c| c.amax())
        .map(|s| if s > 0. { s } else { 1. })
        .collect::<Vec<_>>();
    let mut scaled = features.clone();
    for (mut column, scale) in scaled.column_iter_mut().zip(&scales) {
        column /= *scale;
    }

    let rcond = reciprocal_condition(&scaled);
    if !(rcond >= RCOND_LIMIT) {
        return Err(AlignmentError::IllConditioned { rcond });
    }

    let features_t = scaled.transpose();
    let xx = &features_t * &scaled;
    let xxi = xx
        .try_inverse()
        .ok_or(AlignmentError::IllConditioned { rcond })?;
    let xy = &features_t * values;
    let mut theta = xxi * xy;
    for (mut row, scale) in theta.row_iter_mut().zip(&scales) {
        row /= *scale;
    }

    if theta.iter().all(|v| v.is_finite()) {
        Ok(theta)
    } else {
        Err(AlignmentError::IllConditioned { rcond })
    }
}

/// Ratio of the smallest to the largest singular value, `0` for rank-deficient
/// or empty matrices.
pub(crate) fn reciprocal_condition(m: &DMatrix<f64>) -> f64 {
    if m.nrows() < m.ncols() || m.is_empty() {
        return 0.;
    }
    let sv = m.singular_values();
    let max = sv.max();
    if max <= 0. { 0. } else { sv.min() / max }
}

/// Render a matrix as tab separated rows, for diagnostics.
pub(crate) fn format_matrix(m: &DMatrix<f64>) -> String {
    let mut out = String::new();
    for row in m.row_iter() {
        let line = row.iter().map(|v| format!("{v:.6}")).collect::<Vec<_>>();
        let _ = writeln!(out, "{}", line.join("\t"));
    }
    out
}
