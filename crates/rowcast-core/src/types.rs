//! Core types shared across Rowcast.
//!
//! This module defines the replicated linear system every rank holds and
//! the report a harness produces once a solve has finished.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::solver::SolverError;

/// A dense linear system $\mathbf{A}\mathbf{x} = \mathbf{b}$.
///
/// Every rank of a group holds its own full copy. The solver mutates the
/// copy in place, and only in the rows the rank owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSystem {
    /// Coefficient matrix $\mathbf{A}$ ($n \times n$).
    pub matrix: Array2<f64>,
    /// Right-hand side $\mathbf{b}$ (length $n$).
    pub rhs: Array1<f64>,
}

impl LinearSystem {
    /// Wrap a matrix and right-hand side. Dimensions are checked when the
    /// system is solved, not here.
    pub fn new(matrix: Array2<f64>, rhs: Array1<f64>) -> Self {
        Self { matrix, rhs }
    }

    /// Number of unknowns, taken from the right-hand side.
    pub fn dim(&self) -> usize {
        self.rhs.len()
    }

    /// Check that $\mathbf{A}$ is square and $\mathbf{b}$ matches it.
    /// Returns $n$.
    pub fn check_dimensions(&self) -> Result<usize, SolverError> {
        let (rows, cols) = self.matrix.dim();
        let rhs = self.rhs.len();
        if rows != cols || rhs != rows {
            return Err(SolverError::DimensionMismatch { rows, cols, rhs });
        }
        Ok(rows)
    }

    /// Residual $\mathbf{A}\mathbf{x} - \mathbf{b}$.
    pub fn residual(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matrix.dot(x) - &self.rhs
    }

    /// Euclidean norm of the residual.
    pub fn residual_norm(&self, x: &Array1<f64>) -> f64 {
        self.residual(x).iter().map(|r| r * r).sum::<f64>().sqrt()
    }
}

/// Summary of a finished solve, written by harnesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    /// Number of unknowns.
    pub dimension: usize,
    /// Number of ranks that took part.
    pub group_size: usize,
    /// $\lVert \mathbf{A}\mathbf{x} - \mathbf{b} \rVert_2$ against the original system.
    pub residual_norm: f64,
    /// Number of solution entries that are infinite or NaN.
    pub non_finite: usize,
    /// Largest absolute deviation from the LU reference solution, if computed.
    pub reference_deviation: Option<f64>,
    /// The solution vector.
    pub solution: Vec<f64>,
}

impl SolveReport {
    /// Build a report for `x`, the solution of `original` on `group_size` ranks.
    pub fn new(original: &LinearSystem, x: &Array1<f64>, group_size: usize) -> Self {
        Self {
            dimension: x.len(),
            group_size,
            residual_norm: original.residual_norm(x),
            non_finite: x.iter().filter(|v| !v.is_finite()).count(),
            reference_deviation: None,
            solution: x.to_vec(),
        }
    }

    /// Record the deviation from a reference solution.
    pub fn with_reference(mut self, reference: &Array1<f64>) -> Self {
        let deviation = self
            .solution
            .iter()
            .zip(reference.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        self.reference_deviation = Some(deviation);
        self
    }
}
