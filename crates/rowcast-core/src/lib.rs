//! # Rowcast Core
//!
//! Distributed dense linear solver. A fixed group of processes solves
//! $\mathbf{A}\mathbf{x} = \mathbf{b}$ by Gaussian elimination without any
//! one of them performing the whole factorisation: rows are dealt out
//! cyclically, and the owner of each pivot row broadcasts it to the rest of
//! the group at every step.
//!
//! ## Architecture
//!
//! The solver talks to its peers only through the
//! [`ProcessGroup`](rowcast_comm::ProcessGroup) trait, so the same code runs
//! over in-process channels in tests and over TCP across machines.
//!
//! ## Modules
//!
//! - [`types`]: The replicated linear system and solve reports.
//! - [`ownership`]: Row-cyclic assignment of rows to ranks.
//! - [`solver`]: Forward elimination and back substitution, plus a
//!   single-process LU reference.
//! - [`replicate`]: Distribute a system from one root to the whole group.
//! - [`parsers`]: Load systems from text and JSON files.

pub mod ownership;
pub mod parsers;
pub mod replicate;
pub mod solver;
pub mod types;

pub use ownership::RowOwnership;
pub use solver::gauss::GaussSolver;
pub use solver::{solve, SolverError};
pub use types::{LinearSystem, SolveReport};
