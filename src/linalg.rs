//! Symmetric eigendecomposition for covariance matrices.
//!
//! Every covariance in this crate (component densities, confidence regions)
//! goes through [`decompose`]. The solver itself is faer's self-adjoint
//! eigensolver; this module adds the guards the rest of the crate relies on:
//!
//! - **Finite input only**: NaN/Inf entries are rejected with
//!   [`Error::DegenerateInput`] before the solver runs.
//! - **Symmetrized**: the matrix is replaced by `(A + Aᵀ) / 2`, so small
//!   asymmetries from accumulated rounding do not leak into the result.
//! - **Clamped spectrum**: negative or NaN eigenvalues come back as `0`.
//!
//! Eigenvalues are returned in ascending order with eigenvector `i` stored in
//! column `i` of [`Eigen::vectors`]. The order is deterministic for a given
//! matrix.

use crate::error::{Error, Result};
use faer::{Mat, Side};
use ndarray::{Array1, Array2, ArrayView2};

/// Eigenpairs of a symmetric matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Eigen {
    /// Eigenvalues, ascending, each finite and `>= 0`.
    pub values: Array1<f64>,
    /// Orthonormal eigenvectors, one per column.
    pub vectors: Array2<f64>,
}

impl Eigen {
    /// Dimension of the decomposed matrix.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Rebuild `V · diag(λ) · Vᵀ`.
    pub fn reconstruct(&self) -> Array2<f64> {
        let scaled = &self.vectors * &self.values;
        scaled.dot(&self.vectors.t())
    }
}

/// Decompose a symmetric matrix into eigenvalues and eigenvectors.
///
/// # Errors
///
/// - [`Error::DimensionMismatch`] if the matrix is not square.
/// - [`Error::DegenerateInput`] if any entry is non-finite, or the solver
///   fails to converge.
pub fn decompose(matrix: ArrayView2<'_, f64>) -> Result<Eigen> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(Error::DimensionMismatch {
            expected: rows,
            found: cols,
        });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::DegenerateInput {
            reason: "matrix contains non-finite entries",
        });
    }

    let n = rows;
    if n == 0 {
        return Ok(Eigen {
            values: Array1::zeros(0),
            vectors: Array2::zeros((0, 0)),
        });
    }

    let sym = Mat::<f64>::from_fn(n, n, |i, j| 0.5 * (matrix[[i, j]] + matrix[[j, i]]));
    let evd = sym
        .self_adjoint_eigen(Side::Lower)
        .map_err(|_| Error::DegenerateInput {
            reason: "eigensolver did not converge",
        })?;

    let s = evd.S().column_vector();
    let u = evd.U();

    let values = Array1::from_shape_fn(n, |i| clamp_eigenvalue(s[i]));
    let vectors = Array2::from_shape_fn((n, n), |(i, j)| {
        let v = u[(i, j)];
        if v.is_finite() {
            v
        } else {
            0.0
        }
    });

    Ok(Eigen { values, vectors })
}

/// Negative and NaN eigenvalues collapse to zero.
#[inline]
pub(crate) fn clamp_eigenvalue(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else {
        value
    }
}
