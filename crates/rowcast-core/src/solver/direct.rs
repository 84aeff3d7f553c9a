//! Single-process reference solver.
//!
//! Uses LU decomposition with partial pivoting via `faer` to solve
//! $\mathbf{A}\mathbf{x} = \mathbf{b}$ on one process. It is not part of the
//! distributed protocol; harnesses and tests use it to check the
//! distributed result on well-conditioned systems.

use faer::linalg::solvers::SpSolver;
use ndarray::Array1;

use super::SolverError;
use crate::types::LinearSystem;

/// Solve `system` using direct LU decomposition.
///
/// # Returns
/// The solution vector $\mathbf{x}$ (length $n$).
pub fn solve_reference(system: &LinearSystem) -> Result<Array1<f64>, SolverError> {
    let dim = system.check_dimensions()?;
    if dim == 0 {
        return Ok(Array1::zeros(0));
    }

    let matrix = &system.matrix;
    let rhs = &system.rhs;

    // Convert ndarray to faer Mat<f64>
    let faer_mat = faer::Mat::<f64>::from_fn(dim, dim, |i, j| matrix[[i, j]]);
    let faer_rhs = faer::Col::<f64>::from_fn(dim, |i| rhs[i]);

    // LU decomposition with partial pivoting
    let lu = faer_mat.partial_piv_lu();
    let faer_sol = lu.solve(&faer_rhs);

    Ok(Array1::from_iter((0..dim).map(|i| faer_sol[i])))
}
