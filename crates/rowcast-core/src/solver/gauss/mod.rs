//! Row-cyclic distributed Gaussian elimination.
//!
//! Each member of the group holds a full replica of
//! $\mathbf{A}$ and $\mathbf{b}$ but only computes with the rows it owns
//! (see [`RowOwnership`]). The solve runs in two phases:
//!
//! - **Forward elimination** ([`forward`]): at step $i$ the owner of row
//!   $i$ normalises it by the pivot $A_{ii}$ and broadcasts it; every rank
//!   then eliminates column $i$ from the rows below the pivot that it owns.
//! - **Back substitution** ([`backward`]): walking from the last row up,
//!   the owner of row $i$ computes $x_i$ and broadcasts it; every rank
//!   folds $x_i$ into the right-hand side of the rows above that it owns.
//!
//! Steps are strictly sequential and each one is a chain of blocking
//! collective calls, so all ranks move through the protocol in lockstep.
//! Only the row update inside a step may run in parallel.
//!
//! # Pivoting
//!
//! There is none. A zero on the diagonal yields infinities or NaNs that
//! propagate into the solution; this is not reported as an error.

pub mod backward;
pub mod forward;

use log::{debug, warn};
use ndarray::Array1;
use rowcast_comm::ProcessGroup;

use super::SolverError;
use crate::ownership::RowOwnership;
use crate::types::LinearSystem;

/// The distributed Gaussian elimination solver.
#[derive(Debug, Clone)]
pub struct GaussSolver {
    /// Update the locally owned rows of each elimination step on the rayon
    /// thread pool.
    pub parallel_rows: bool,
    /// Before eliminating, have rank 0 broadcast its view of the system
    /// dimension and group size so that every rank can confirm it agrees.
    pub check_agreement: bool,
}

impl Default for GaussSolver {
    fn default() -> Self {
        Self {
            parallel_rows: false,
            check_agreement: true,
        }
    }
}

impl GaussSolver {
    pub fn new(parallel_rows: bool, check_agreement: bool) -> Self {
        Self {
            parallel_rows,
            check_agreement,
        }
    }

    /// Solve `system` in place and return the solution.
    ///
    /// On return the locally owned rows of `system` hold the upper-triangular
    /// factor and partially reduced right-hand side; rows owned by other
    /// ranks are stale. The solution is identical on every rank.
    pub fn solve(
        &self,
        system: &mut LinearSystem,
        group: &dyn ProcessGroup,
    ) -> Result<Array1<f64>, SolverError> {
        // Purely local, so every rank holding the same system reaches the
        // same verdict before any collective is issued.
        let n = system.check_dimensions()?;
        let ownership = RowOwnership::for_group(group)?;
        let rank = group.rank();

        if self.check_agreement {
            self.confirm_agreement(n, group)?;
        }

        debug!(
            "rank {}: solving n={} over {} ranks ({} rows owned)",
            rank,
            n,
            ownership.size(),
            ownership.row_counts(n).get(rank).copied().unwrap_or(0)
        );
        if self.parallel_rows {
            debug!(
                "rank {}: row updates on {} rayon threads",
                rank,
                rayon::current_num_threads()
            );
        }

        forward::eliminate(
            &mut system.matrix,
            &mut system.rhs,
            &ownership,
            group,
            self.parallel_rows,
        )?;
        debug!("rank {}: forward elimination complete", rank);

        let x = backward::substitute(&system.matrix, &mut system.rhs, &ownership, group)?;
        debug!("rank {}: back substitution complete", rank);

        let non_finite = x.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 && rank == 0 {
            warn!(
                "{} of {} solution entries are not finite (zero pivot encountered)",
                non_finite, n
            );
        }

        Ok(x)
    }

    /// Compare this rank's (n, P) with rank 0's.
    fn confirm_agreement(&self, n: usize, group: &dyn ProcessGroup) -> Result<(), SolverError> {
        let local = [n as f64, group.size() as f64];
        let mut view = local;
        group.broadcast_vector(&mut view, 0)?;
        if view != local {
            return Err(SolverError::GroupMismatch {
                rank: group.rank(),
                local_dim: n,
                local_size: group.size(),
                root_dim: view[0] as usize,
                root_size: view[1] as usize,
            });
        }
        Ok(())
    }
}
