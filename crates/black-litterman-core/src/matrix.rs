//! Dense Decimal linear algebra used throughout the engine.
//!
//! Inversions go through [`LuDecomposition`] (Doolittle with partial
//! pivoting) rather than Gauss-Jordan on an augmented matrix, so every
//! "inverse" in the Black-Litterman formulas is really a sequence of
//! triangular solves.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::BlackLittermanError;
use crate::types::{Matrix, Vector};
use crate::BlackLittermanResult;

/// Pivots smaller than this fraction of the largest entry are treated as zero.
const PIVOT_TOLERANCE: Decimal = dec!(0.000000000001);

/// Maximum |A_ij - A_ji| accepted by [`ensure_symmetric`].
pub const SYMMETRY_TOLERANCE: Decimal = dec!(0.0000001);

// ---------------------------------------------------------------------------
// Elementwise helpers
// ---------------------------------------------------------------------------

/// Dot product of two vectors.
pub fn dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Matrix-vector multiplication: result_i = sum_j mat[i][j] * v[j].
pub fn mat_vec(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vector {
    mat.iter().map(|row| dot(row, v)).collect()
}

/// Matrix-matrix multiplication: C = A * B.
#[allow(clippy::needless_range_loop)]
pub fn mat_mul(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Matrix {
    let m = a.len();
    let p = if m > 0 { a[0].len() } else { 0 };
    let n_cols = if !b.is_empty() { b[0].len() } else { 0 };
    let mut c = vec![vec![Decimal::ZERO; n_cols]; m];
    for i in 0..m {
        for k in 0..p {
            let a_ik = a[i][k];
            if a_ik.is_zero() {
                continue;
            }
            for j in 0..n_cols {
                c[i][j] += a_ik * b[k][j];
            }
        }
    }
    c
}

/// Matrix transpose.
pub fn transpose(mat: &[Vec<Decimal>]) -> Matrix {
    if mat.is_empty() {
        return Vec::new();
    }
    let m = mat.len();
    let n = mat[0].len();
    let mut t = vec![vec![Decimal::ZERO; m]; n];
    for (i, row) in mat.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            t[j][i] = *v;
        }
    }
    t
}

/// Element-wise matrix addition: C = A + B.
pub fn mat_add(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Matrix {
    a.iter()
        .zip(b.iter())
        .map(|(row_a, row_b)| {
            row_a
                .iter()
                .zip(row_b.iter())
                .map(|(x, y)| *x + *y)
                .collect()
        })
        .collect()
}

/// Element-wise vector addition.
pub fn vec_add(a: &[Decimal], b: &[Decimal]) -> Vector {
    a.iter().zip(b.iter()).map(|(x, y)| *x + *y).collect()
}

/// Element-wise vector subtraction: a - b.
pub fn vec_sub(a: &[Decimal], b: &[Decimal]) -> Vector {
    a.iter().zip(b.iter()).map(|(x, y)| *x - *y).collect()
}

/// Scale every element of a matrix by a scalar.
pub fn mat_scale(mat: &[Vec<Decimal>], s: Decimal) -> Matrix {
    mat.iter()
        .map(|row| row.iter().map(|v| *v * s).collect())
        .collect()
}

/// Identity matrix of size n.
pub fn identity(n: usize) -> Matrix {
    let mut m = vec![vec![Decimal::ZERO; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = Decimal::ONE;
    }
    m
}

/// Quadratic form x' A x.
pub fn quadratic_form(x: &[Decimal], a: &[Vec<Decimal>]) -> Decimal {
    dot(x, &mat_vec(a, x))
}

/// Replace A with (A + A') / 2.
#[allow(clippy::needless_range_loop)]
pub fn symmetrize(mat: &mut Matrix) {
    let n = mat.len();
    let two = dec!(2);
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = (mat[i][j] + mat[j][i]) / two;
            mat[i][j] = avg;
            mat[j][i] = avg;
        }
    }
}

/// sqrt(w' Sigma w), zero for a non-positive variance.
pub fn portfolio_volatility(w: &[Decimal], sigma: &[Vec<Decimal>]) -> Decimal {
    let var = quadratic_form(w, sigma);
    if var <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    var.sqrt().unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Shape validation
// ---------------------------------------------------------------------------

/// Check that `mat` is n x n and return n.
pub fn ensure_square(mat: &[Vec<Decimal>], context: &str) -> BlackLittermanResult<usize> {
    let n = mat.len();
    for row in mat {
        if row.len() != n {
            return Err(BlackLittermanError::dimension(
                format!("{} (columns)", context),
                n,
                row.len(),
            ));
        }
    }
    Ok(n)
}

/// Check that a square matrix is symmetric within [`SYMMETRY_TOLERANCE`].
#[allow(clippy::needless_range_loop)]
pub fn ensure_symmetric(mat: &[Vec<Decimal>], context: &str) -> BlackLittermanResult<()> {
    let n = ensure_square(mat, context)?;
    for i in 0..n {
        for j in (i + 1)..n {
            if (mat[i][j] - mat[j][i]).abs() > SYMMETRY_TOLERANCE {
                return Err(BlackLittermanError::parameter(
                    context,
                    format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, mat[i][j], j, i, mat[j][i]
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LU decomposition
// ---------------------------------------------------------------------------

/// PA = LU factorisation of a square matrix, L unit-lower and U upper
/// triangular, stored packed in one matrix.
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    lu: Matrix,
    permutation: Vec<usize>,
}

impl LuDecomposition {
    /// Factorise `mat`. `context` names the matrix in a `SingularMatrix` error.
    #[allow(clippy::needless_range_loop)]
    pub fn new(mat: &[Vec<Decimal>], context: &str) -> BlackLittermanResult<Self> {
        let n = ensure_square(mat, context)?;
        let mut lu: Matrix = mat.to_vec();
        let mut permutation: Vec<usize> = (0..n).collect();

        let scale = lu
            .iter()
            .flat_map(|row| row.iter())
            .map(|v| v.abs())
            .max()
            .unwrap_or(Decimal::ZERO);
        if n > 0 && scale.is_zero() {
            return Err(BlackLittermanError::SingularMatrix {
                context: context.to_string(),
            });
        }
        let threshold = scale * PIVOT_TOLERANCE;

        for k in 0..n {
            let mut pivot_row = k;
            let mut pivot_val = lu[k][k].abs();
            for row in (k + 1)..n {
                let val = lu[row][k].abs();
                if val > pivot_val {
                    pivot_val = val;
                    pivot_row = row;
                }
            }

            if pivot_val <= threshold {
                return Err(BlackLittermanError::SingularMatrix {
                    context: context.to_string(),
                });
            }

            if pivot_row != k {
                lu.swap(k, pivot_row);
                permutation.swap(k, pivot_row);
            }

            let pivot = lu[k][k];
            for row in (k + 1)..n {
                let factor = lu[row][k] / pivot;
                lu[row][k] = factor;
                if factor.is_zero() {
                    continue;
                }
                for col in (k + 1)..n {
                    let upper = lu[k][col];
                    lu[row][col] -= factor * upper;
                }
            }
        }

        Ok(Self { lu, permutation })
    }

    pub fn dim(&self) -> usize {
        self.lu.len()
    }

    /// Solve A x = b.
    #[allow(clippy::needless_range_loop)]
    pub fn solve(&self, b: &[Decimal]) -> BlackLittermanResult<Vector> {
        let n = self.dim();
        if b.len() != n {
            return Err(BlackLittermanError::dimension(
                "LU solve right-hand side",
                n,
                b.len(),
            ));
        }

        let mut x: Vector = self.permutation.iter().map(|&p| b[p]).collect();

        // Forward substitution (unit lower triangle)
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[i][j] * x[j];
            }
            x[i] = sum;
        }

        // Back substitution
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[i][j] * x[j];
            }
            x[i] = sum / self.lu[i][i];
        }

        Ok(x)
    }

    /// A^-1, column by column from solves against the identity.
    pub fn inverse(&self) -> BlackLittermanResult<Matrix> {
        let n = self.dim();
        let mut columns = Vec::with_capacity(n);
        for e in identity(n) {
            columns.push(self.solve(&e)?);
        }
        Ok(transpose(&columns))
    }
}

/// Solve A x = b through a fresh LU factorisation.
pub fn solve(mat: &[Vec<Decimal>], b: &[Decimal], context: &str) -> BlackLittermanResult<Vector> {
    LuDecomposition::new(mat, context)?.solve(b)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
