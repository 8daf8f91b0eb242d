//! Dense row-major matrix helpers shared by the estimation, blending and
//! simulation modules. Sizes here are a handful of assets, so plain
//! `Vec<Vec<f64>>` with O(n^3) routines is sufficient.

use crate::error::InvexisError;
use crate::types::Matrix;
use crate::InvexisResult;

/// Absolute tolerance used when checking covariance symmetry.
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Multiply two matrices: C = A * B.
/// A is (m x p), B is (p x n_cols), result is (m x n_cols).
pub fn mat_multiply(a: &[Vec<f64>], b: &[Vec<f64>]) -> Matrix {
    let m = a.len();
    let p = if m > 0 { a[0].len() } else { 0 };
    let n_cols = if !b.is_empty() { b[0].len() } else { 0 };
    let mut c = vec![vec![0.0; n_cols]; m];
    for i in 0..m {
        for j in 0..n_cols {
            let mut sum = 0.0;
            for k in 0..p {
                sum += a[i][k] * b[k][j];
            }
            c[i][j] = sum;
        }
    }
    c
}

/// Transpose an (m x n) matrix. An empty matrix with a known column count
/// transposes to `n_cols` empty rows.
pub fn mat_transpose(a: &[Vec<f64>], n_cols: usize) -> Matrix {
    let m = a.len();
    let mut t = vec![vec![0.0; m]; n_cols];
    for (i, row) in a.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            t[j][i] = *v;
        }
    }
    t
}

/// Multiply a matrix (m x n) by a vector (n x 1), returning (m x 1).
pub fn mat_vec_multiply(a: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    a.iter()
        .map(|row| row.iter().zip(v.iter()).map(|(a_ij, v_j)| a_ij * v_j).sum())
        .collect()
}

/// Dot product of two vectors.
pub fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Element-wise addition of two matrices.
pub fn mat_add(a: &[Vec<f64>], b: &[Vec<f64>]) -> Matrix {
    a.iter()
        .zip(b.iter())
        .map(|(row_a, row_b)| row_a.iter().zip(row_b.iter()).map(|(x, y)| x + y).collect())
        .collect()
}

/// Scale every element of a matrix by a scalar.
pub fn mat_scale(a: &[Vec<f64>], s: f64) -> Matrix {
    a.iter()
        .map(|row| row.iter().map(|v| v * s).collect())
        .collect()
}

/// Diagonal of a square matrix.
pub fn diagonal(a: &[Vec<f64>]) -> Vec<f64> {
    a.iter().enumerate().map(|(i, row)| row[i]).collect()
}

/// Add `eps` to every diagonal element.
pub fn add_to_diagonal(a: &[Vec<f64>], eps: f64) -> Matrix {
    let mut out = a.to_vec();
    for (i, row) in out.iter_mut().enumerate() {
        row[i] += eps;
    }
    out
}

/// Invert a square matrix using Gauss-Jordan elimination with partial
/// pivoting. A pivot below `n * EPSILON * max|a_ij|` is treated as singular,
/// which keeps the test scale-free for daily covariances around 1e-4.
#[allow(clippy::needless_range_loop)]
pub fn mat_inverse(a: &[Vec<f64>], context: &str) -> InvexisResult<Matrix> {
    let n = a.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let max_abs = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !max_abs.is_finite() || max_abs == 0.0 {
        return Err(InvexisError::SingularMatrix {
            context: context.to_string(),
        });
    }
    let tolerance = n as f64 * f64::EPSILON * max_abs;

    // Augmented matrix [A | I]
    let mut aug: Vec<Vec<f64>> = Vec::with_capacity(n);
    for (i, a_row) in a.iter().enumerate() {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(a_row);
        for j in 0..n {
            row.push(if i == j { 1.0 } else { 0.0 });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_val = aug[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val <= tolerance {
            return Err(InvexisError::SingularMatrix {
                context: context.to_string(),
            });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Cholesky decomposition of a symmetric positive-definite matrix.
/// Returns lower-triangular L such that A = L * L^T, or `SingularMatrix`
/// when a non-positive pivot shows the matrix is not positive-definite.
pub fn cholesky(a: &[Vec<f64>], context: &str) -> InvexisResult<Matrix> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i][k] * l[j][k];
            }

            if i == j {
                let diag = a[i][i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return Err(InvexisError::SingularMatrix {
                        context: context.to_string(),
                    });
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }

    Ok(l)
}

/// Check that `cov` is an `n x n`, finite, symmetric matrix with a
/// non-negative diagonal.
pub fn validate_covariance(cov: &[Vec<f64>], n: usize, field: &str) -> InvexisResult<()> {
    if cov.len() != n {
        let cols = cov.first().map(|r| r.len()).unwrap_or(0);
        return Err(InvexisError::shape_mismatch(field, (n, n), (cov.len(), cols)));
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(InvexisError::DimensionMismatch {
                context: field.to_string(),
                expected: format!("{} columns in row {}", n, i),
                actual: row.len().to_string(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(InvexisError::InvalidInput {
                field: field.to_string(),
                reason: format!("Row {} contains a non-finite value", i),
            });
        }
    }
    for i in 0..n {
        if cov[i][i] < 0.0 {
            return Err(InvexisError::InvalidInput {
                field: field.to_string(),
                reason: format!("Negative variance on diagonal [{},{}]={}", i, i, cov[i][i]),
            });
        }
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1.0);
            if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(InvexisError::InvalidInput {
                    field: field.to_string(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}
