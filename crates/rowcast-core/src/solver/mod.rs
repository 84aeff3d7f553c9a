//! Linear solvers.
//!
//! [`gauss::GaussSolver`] is the distributed solver: row-cyclic Gaussian
//! elimination coordinated through broadcasts over a
//! [`ProcessGroup`]. [`direct::solve_reference`] solves the same system on a
//! single process with a pivoted LU factorisation and serves as a check.

pub mod direct;
pub mod gauss;

use ndarray::{Array1, Array2};
use rowcast_comm::{CommError, ProcessGroup};
use thiserror::Error;

use crate::types::LinearSystem;

/// Errors that can occur during a solve.
///
/// Every variant aborts the solve; a partially computed solution is never
/// returned.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Dimension mismatch: matrix is {rows}x{cols}, right-hand side has {rhs} entries")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },

    #[error(
        "Rank {rank} disagrees with rank 0 about the run: local n={local_dim}, P={local_size}; \
         rank 0 has n={root_dim}, P={root_size}"
    )]
    GroupMismatch {
        rank: usize,
        local_dim: usize,
        local_size: usize,
        root_dim: usize,
        root_size: usize,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Communication failure: {0}")]
    Comm(#[from] CommError),
}

/// Solve $\mathbf{A}\mathbf{x} = \mathbf{b}$ cooperatively with the default
/// [`gauss::GaussSolver`].
///
/// Every member of `group` must call this with identical `matrix` and `rhs`.
/// The returned vector is the full solution, identical on every rank.
pub fn solve(
    matrix: Array2<f64>,
    rhs: Array1<f64>,
    group: &dyn ProcessGroup,
) -> Result<Array1<f64>, SolverError> {
    let mut system = LinearSystem::new(matrix, rhs);
    gauss::GaussSolver::default().solve(&mut system, group)
}
