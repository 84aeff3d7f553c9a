//! Forward elimination phase.
//!
//! Step $i$ (ascending):
//!
//! 1. The owner of row $i$ computes the normalised pivot row
//!    $\mathbf{p} = A_{i,*} / A_{ii}$ and $v = b_i / A_{ii}$, then broadcasts
//!    $\mathbf{p}$ followed by $v$.
//! 2. Every other rank receives both.
//! 3. Each rank updates the rows $j > i$ it owns:
//!    $A_{j,*} \mathrel{-}= f\,\mathbf{p}$ and $b_j \mathrel{-}= f\,v$, with
//!    $f = A_{ji}$ read before the row is touched.
//!
//! The pivot row itself is left unnormalised in the owner's replica; back
//! substitution divides by $A_{ii}$ again.

use log::trace;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis, Zip};
use rowcast_comm::{CommError, ProcessGroup};

use crate::ownership::RowOwnership;

/// The broadcast pivot of one elimination step, applied to owned rows.
struct PivotUpdate<'a> {
    step: usize,
    rank: usize,
    ownership: &'a RowOwnership,
    pivot_row: ArrayView1<'a, f64>,
    pivot_val: f64,
}

impl PivotUpdate<'_> {
    fn apply(&self, row_index: usize, mut row: ArrayViewMut1<'_, f64>, rhs: &mut f64) {
        if !self.ownership.is_owner(row_index, self.rank) {
            return;
        }
        let factor = row[self.step];
        row.scaled_add(-factor, &self.pivot_row);
        *rhs -= self.pivot_val * factor;
    }
}

/// Reduce `matrix` to upper-triangular form, one broadcast pivot per row.
pub fn eliminate(
    matrix: &mut Array2<f64>,
    rhs: &mut Array1<f64>,
    ownership: &RowOwnership,
    group: &dyn ProcessGroup,
    parallel_rows: bool,
) -> Result<(), CommError> {
    let n = rhs.len();
    let rank = group.rank();
    let mut pivot_row = vec![0.0; n];

    for step in 0..n {
        let root = ownership.owner(step);

        let mut pivot_val = 0.0;
        if root == rank {
            let pivot = matrix[[step, step]];
            for (p, &a) in pivot_row.iter_mut().zip(matrix.row(step)) {
                *p = a / pivot;
            }
            pivot_val = rhs[step] / pivot;
        }

        group.broadcast_vector(&mut pivot_row, root)?;
        let pivot_val = group.broadcast_scalar(pivot_val, root)?;
        trace!("rank {}: step {} pivot from rank {}", rank, step, root);

        let update = PivotUpdate {
            step,
            rank,
            ownership,
            pivot_row: ArrayView1::from(&pivot_row[..]),
            pivot_val,
        };
        let first_below = step + 1;
        let (_, mut below) = matrix.view_mut().split_at(Axis(0), first_below);
        let (_, mut below_rhs) = rhs.view_mut().split_at(Axis(0), first_below);
        let rows = Zip::indexed(below.rows_mut()).and(&mut below_rhs);

        if parallel_rows {
            rows.par_for_each(|offset, row, b| update.apply(first_below + offset, row, b));
        } else {
            rows.for_each(|offset, row, b| update.apply(first_below + offset, row, b));
        }
    }

    Ok(())
}
