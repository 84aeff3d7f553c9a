//! End-to-end tests of the distributed solver over in-process and TCP groups.
//!
//! Coverage:
//! - Residual and reference agreement for well-posed systems at several group sizes
//! - Identity, diagonal and 1x1 systems
//! - Zero pivot propagation (no error raised)
//! - Result independence from the group size and identical results on every rank
//! - Dimension checks reached identically on every rank
//! - Replication followed by a solve, and a solve over loopback TCP

use std::net::{SocketAddr, TcpListener};

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2};

use rowcast_comm::tcp::TcpOptions;
use rowcast_comm::{run_local, ProcessGroup, TcpGroup};
use rowcast_core::replicate::replicate_system;
use rowcast_core::solver::direct::solve_reference;
use rowcast_core::{solve, GaussSolver, LinearSystem, SolverError};

// ─────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────

/// Deterministic, strictly diagonally dominant system of dimension `n`.
fn dominant_system(n: usize) -> LinearSystem {
    let matrix = Array2::from_shape_fn((n, n), |(i, j)| {
        let off = ((i * 7 + j * 13) % 11) as f64 / 11.0 - 0.5;
        if i == j {
            n as f64 + 1.0 + off.abs()
        } else {
            off
        }
    });
    let rhs = Array1::from_shape_fn(n, |i| ((i * 5) % 9) as f64 - 4.0);
    LinearSystem::new(matrix, rhs)
}

/// Solve `system` on a local group of `size` and return every rank's result.
fn solve_on(size: usize, system: &LinearSystem) -> Vec<Array1<f64>> {
    run_local(size, |group| {
        solve(system.matrix.clone(), system.rhs.clone(), &group).unwrap()
    })
    .unwrap()
}

// ─────────────────────────────────────────────────────────────
// Correctness
// ─────────────────────────────────────────────────────────────

#[test]
fn test_residual_is_small_for_every_group_size() {
    let system = dominant_system(12);
    for size in 1..=5 {
        let results = solve_on(size, &system);
        for x in &results {
            let residual = system.residual_norm(x);
            assert!(residual < 1e-10, "P={}: residual {:.3e}", size, residual);
        }
    }
}

#[test]
fn test_matches_lu_reference() {
    let system = dominant_system(20);
    let reference = solve_reference(&system).unwrap();
    let results = solve_on(4, &system);
    for (got, want) in results[0].iter().zip(reference.iter()) {
        assert_abs_diff_eq!(got, want, epsilon = 1e-10);
    }
}

#[test]
fn test_identity_returns_rhs() {
    let b = Array1::from_vec(vec![3.0, -1.5, 0.0, 7.25, 2.0]);
    let system = LinearSystem::new(Array2::eye(5), b.clone());
    for x in solve_on(3, &system) {
        for (got, want) in x.iter().zip(b.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = f64::EPSILON);
        }
    }
}

#[test]
fn test_diagonal_system() {
    let d = [2.0, -4.0, 0.5, 10.0, 3.0, -1.0];
    let b = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let system = LinearSystem::new(Array2::from_diag(&Array1::from_vec(d.to_vec())), b.clone());

    let results = solve_on(4, &system);
    for i in 0..d.len() {
        assert_abs_diff_eq!(results[2][i], b[i] / d[i], epsilon = 1e-15);
    }
}

#[test]
fn test_one_by_one_system() {
    let system = LinearSystem::new(Array2::from_elem((1, 1), 4.0), Array1::from_elem(1, 10.0));
    // More ranks than rows: ranks 1 and 2 own nothing but still take part.
    for size in [1, 3] {
        for x in solve_on(size, &system) {
            assert_eq!(x.len(), 1);
            assert_abs_diff_eq!(x[0], 2.5, epsilon = 1e-15);
        }
    }
}

#[test]
fn test_empty_system_solves_to_empty_vector() {
    let system = LinearSystem::new(Array2::zeros((0, 0)), Array1::zeros(0));
    for x in solve_on(2, &system) {
        assert!(x.is_empty());
    }
}

// ─────────────────────────────────────────────────────────────
// Zero pivot
// ─────────────────────────────────────────────────────────────

#[test]
fn test_zero_leading_pivot_yields_non_finite_solution() {
    let mut system = dominant_system(6);
    system.matrix[[0, 0]] = 0.0;

    for size in [1, 3] {
        let results = run_local(size, |group| {
            solve(system.matrix.clone(), system.rhs.clone(), &group)
        })
        .unwrap();

        for result in results {
            let x = result.expect("a zero pivot is not an error");
            assert!(
                x.iter().any(|v| !v.is_finite()),
                "P={}: expected non-finite entries, got {:?}",
                size,
                x
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Group behaviour
// ─────────────────────────────────────────────────────────────

#[test]
fn test_group_size_does_not_change_result() {
    let system = dominant_system(17);
    let single = solve_on(1, &system);
    let four = solve_on(4, &system);
    for (a, b) in single[0].iter().zip(four[0].iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_every_rank_holds_identical_solution() {
    let system = dominant_system(9);
    let results = solve_on(4, &system);
    for x in &results[1..] {
        // Broadcast values are copied bit for bit.
        assert_eq!(x, &results[0]);
    }
}

#[test]
fn test_parallel_row_updates_over_group() {
    let system = dominant_system(30);
    let results = run_local(3, |group| {
        let mut local = system.clone();
        GaussSolver::new(true, true).solve(&mut local, &group).unwrap()
    })
    .unwrap();
    assert!(system.residual_norm(&results[0]) < 1e-10);
}

#[test]
fn test_dimension_mismatch_reported_on_every_rank() {
    let results = run_local(3, |group| {
        solve(Array2::eye(4), Array1::zeros(3), &group)
    })
    .unwrap();

    for result in results {
        assert!(matches!(
            result,
            Err(SolverError::DimensionMismatch {
                rows: 4,
                cols: 4,
                rhs: 3
            })
        ));
    }
}

#[test]
fn test_replicate_then_solve() {
    let system = dominant_system(8);
    let results = run_local(3, |group| {
        let mine = (group.rank() == 0).then(|| system.clone());
        let mut local = replicate_system(&group, mine, 0).unwrap();
        GaussSolver::default().solve(&mut local, &group).unwrap()
    })
    .unwrap();

    for x in &results {
        assert!(system.residual_norm(x) < 1e-10);
    }
}

#[test]
fn test_solve_over_tcp_group() {
    let size = 3;
    let system = dominant_system(7);
    let listeners: Vec<TcpListener> = (0..size)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let peers: Vec<SocketAddr> = listeners.iter().map(|l| l.local_addr().unwrap()).collect();

    let handles: Vec<_> = listeners
        .into_iter()
        .enumerate()
        .map(|(rank, listener)| {
            let peers = peers.clone();
            let system = system.clone();
            std::thread::spawn(move || {
                let group =
                    TcpGroup::from_listener(rank, listener, &peers, &TcpOptions::default()).unwrap();
                let mine = (rank == 0).then_some(system);
                let mut local = replicate_system(&group, mine, 0).unwrap();
                GaussSolver::default().solve(&mut local, &group).unwrap()
            })
        })
        .collect();

    let reference = solve_on(1, &system).remove(0);
    for handle in handles {
        let x = handle.join().unwrap();
        for (got, want) in x.iter().zip(reference.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }
}
