//! Back substitution phase.
//!
//! Step $i$ runs from $n-1$ down to $0$. The owner of row $i$ computes
//! $x_i = b_i / A_{ii}$ and broadcasts it; every rank then subtracts
//! $A_{ji} x_i$ from $b_j$ for the rows $j < i$ it owns. Because every
//! $x_i$ is broadcast, all ranks finish holding the whole solution.

use log::trace;
use ndarray::{Array1, Array2};
use rowcast_comm::{CommError, ProcessGroup};

use crate::ownership::RowOwnership;

/// Solve the upper-triangular system left by forward elimination.
pub fn substitute(
    matrix: &Array2<f64>,
    rhs: &mut Array1<f64>,
    ownership: &RowOwnership,
    group: &dyn ProcessGroup,
) -> Result<Array1<f64>, CommError> {
    let n = rhs.len();
    let rank = group.rank();
    let mut x = Array1::<f64>::zeros(n);

    for step in (0..n).rev() {
        let root = ownership.owner(step);
        let local = if root == rank {
            rhs[step] / matrix[[step, step]]
        } else {
            0.0
        };

        let xi = group.broadcast_scalar(local, root)?;
        x[step] = xi;
        trace!("rank {}: x[{}] from rank {}", rank, step, root);

        for row in ownership.owned_rows(rank, 0..step) {
            rhs[row] -= matrix[[row, step]] * xi;
        }
    }

    Ok(x)
}
