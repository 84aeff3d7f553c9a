//! Replication of a system from one root to the whole group.
//!
//! The solver assumes every rank already holds an identical copy of
//! $\mathbf{A}$ and $\mathbf{b}$. Harnesses that load the system on a
//! single rank use [`replicate_system`] to establish that precondition:
//! the root broadcasts $n$, then $\mathbf{A}$ in row-major order, then
//! $\mathbf{b}$.

use log::debug;
use ndarray::{Array1, Array2};
use rowcast_comm::ProcessGroup;

use crate::solver::SolverError;
use crate::types::LinearSystem;

/// Distribute `system` from `root` to every member of `group`.
///
/// The root must pass `Some(system)`; other ranks pass `None` and receive a
/// copy. Every rank returns the same system.
pub fn replicate_system(
    group: &dyn ProcessGroup,
    system: Option<LinearSystem>,
    root: usize,
) -> Result<LinearSystem, SolverError> {
    let is_root = group.rank() == root;

    let (n, mut flat, mut rhs) = match (is_root, system) {
        (true, Some(system)) => {
            let n = system.check_dimensions()?;
            let flat: Vec<f64> = system.matrix.iter().copied().collect();
            (n, flat, system.rhs.to_vec())
        }
        (true, None) => {
            return Err(SolverError::Configuration(format!(
                "rank {} is the replication root but has no system",
                root
            )))
        }
        (false, _) => (0, Vec::new(), Vec::new()),
    };

    let announced = group.broadcast_scalar(n as f64, root)?;
    if !(announced.is_finite() && announced >= 0.0 && announced.fract() == 0.0) {
        return Err(SolverError::Configuration(format!(
            "root announced an invalid dimension {}",
            announced
        )));
    }
    let n = announced as usize;

    let entries = n.checked_mul(n).ok_or_else(|| {
        SolverError::Configuration(format!("announced dimension {} is too large", n))
    })?;
    if !is_root {
        flat = vec![0.0; entries];
        rhs = vec![0.0; n];
    }
    group.broadcast_vector(&mut flat, root)?;
    group.broadcast_vector(&mut rhs, root)?;

    let matrix = Array2::from_shape_vec((n, n), flat)
        .map_err(|e| SolverError::Configuration(e.to_string()))?;
    debug!("rank {}: replicated system of dimension {}", group.rank(), n);

    Ok(LinearSystem::new(matrix, Array1::from_vec(rhs)))
}
