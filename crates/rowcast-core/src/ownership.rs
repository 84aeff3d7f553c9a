//! Row-cyclic ownership of matrix rows.
//!
//! Row $i$ belongs to rank $i \bmod P$. Every process stores the whole
//! system; ownership only decides which rank is allowed to compute with a
//! row. The mapping is stateless and must be evaluated with the same $P$ on
//! every rank.

use std::ops::Range;

use rowcast_comm::ProcessGroup;

use crate::solver::SolverError;

/// Assignment of rows to the ranks of a group of fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOwnership {
    size: usize,
}

impl RowOwnership {
    pub fn new(size: usize) -> Result<Self, SolverError> {
        if size == 0 {
            return Err(SolverError::Configuration(
                "row ownership needs at least one rank".into(),
            ));
        }
        Ok(Self { size })
    }

    /// Ownership for the size of `group`.
    pub fn for_group(group: &dyn ProcessGroup) -> Result<Self, SolverError> {
        Self::new(group.size())
    }

    /// Number of ranks rows are dealt across.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The rank that owns row `row`.
    pub fn owner(&self, row: usize) -> usize {
        row % self.size
    }

    pub fn is_owner(&self, row: usize, rank: usize) -> bool {
        self.owner(row) == rank
    }

    /// Rows in `rows` owned by `rank`, in ascending order.
    pub fn owned_rows(&self, rank: usize, rows: Range<usize>) -> impl Iterator<Item = usize> {
        let step = self.size;
        let first = if rank < step {
            rows.start + (rank + step - rows.start % step) % step
        } else {
            // A rank outside the group owns nothing.
            rows.end
        };
        (first..rows.end.max(first)).step_by(step)
    }

    /// How many of the first `n` rows each rank owns, indexed by rank.
    pub fn row_counts(&self, n: usize) -> Vec<usize> {
        (0..self.size)
            .map(|rank| n / self.size + usize::from(rank < n % self.size))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_row_modulo_size() {
        let map = RowOwnership::new(3).unwrap();
        let owners: Vec<usize> = (0..7).map(|i| map.owner(i)).collect();
        assert_eq!(owners, vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(map.is_owner(4, 1));
        assert!(!map.is_owner(4, 0));
    }

    #[test]
    fn test_zero_ranks_rejected() {
        assert!(matches!(
            RowOwnership::new(0),
            Err(SolverError::Configuration(_))
        ));
    }

    #[test]
    fn test_every_row_has_exactly_one_owner() {
        for size in 1..=6 {
            let map = RowOwnership::new(size).unwrap();
            for n in [0, 1, 2, 5, 13, 64] {
                let mut seen = vec![0usize; n];
                for rank in 0..size {
                    for row in map.owned_rows(rank, 0..n) {
                        seen[row] += 1;
                        assert_eq!(map.owner(row), rank);
                    }
                }
                assert!(
                    seen.iter().all(|&count| count == 1),
                    "P={} n={}: {:?}",
                    size,
                    n,
                    seen
                );
            }
        }
    }

    #[test]
    fn test_owned_rows_respects_range_start() {
        let map = RowOwnership::new(4).unwrap();
        let rows: Vec<usize> = map.owned_rows(1, 6..15).collect();
        assert_eq!(rows, vec![9, 13]);
        let rows: Vec<usize> = map.owned_rows(2, 6..15).collect();
        assert_eq!(rows, vec![6, 10, 14]);
    }

    #[test]
    fn test_owned_rows_empty_range() {
        let map = RowOwnership::new(2).unwrap();
        assert_eq!(map.owned_rows(0, 5..5).count(), 0);
        assert_eq!(map.owned_rows(1, 4..5).count(), 0);
        assert_eq!(map.owned_rows(7, 0..10).count(), 0);
    }

    #[test]
    fn test_row_counts_sum_to_n() {
        let map = RowOwnership::new(4).unwrap();
        assert_eq!(map.row_counts(10), vec![3, 3, 2, 2]);
        assert_eq!(map.row_counts(3), vec![1, 1, 1, 0]);
        assert_eq!(map.row_counts(0), vec![0, 0, 0, 0]);
    }
}
