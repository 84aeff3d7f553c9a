//! Job runner: ties together system loading, the process group and the solver.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array1;

use rowcast_comm::{run_local, ProcessGroup, TcpGroup, TcpOptions};
use rowcast_core::parsers::load_system;
use rowcast_core::replicate::replicate_system;
use rowcast_core::solver::direct::solve_reference;
use rowcast_core::{GaussSolver, LinearSystem, SolveReport, SolverError};

use crate::config::{JobConfig, Transport};

/// Load the system file named by the job.
pub fn load_job_system(job: &JobConfig) -> Result<LinearSystem> {
    load_system(&job.system.file)
        .with_context(|| format!("Cannot load system file {}", job.system.file.display()))
}

fn solver_for(job: &JobConfig) -> GaussSolver {
    GaussSolver::new(job.solver.parallel_rows, job.solver.check_agreement)
}

/// One member's share of a job: replicate from the root, then solve.
fn solve_member(
    group: &dyn ProcessGroup,
    solver: &GaussSolver,
    system: Option<LinearSystem>,
    root: usize,
) -> Result<Array1<f64>, SolverError> {
    let mut local = replicate_system(group, system, root)?;
    solver.solve(&mut local, group)
}

/// Run a job on a local group of `job.group.processes` threads.
///
/// Returns the report built from the root rank's solution.
pub fn run_local_job(job: &JobConfig) -> Result<SolveReport> {
    if job.group.transport != Transport::Local {
        anyhow::bail!("Job uses the tcp transport; start each rank with `rowcast worker --rank R`");
    }

    let system = load_job_system(job)?;
    let size = job.group.processes;
    let root = job.group.root;
    println!(
        "System: {} unknowns, {} local ranks (root {})",
        system.dim(),
        size,
        root
    );

    let solver = solver_for(job);
    let results = run_local(size, |group| {
        let mine = (group.rank() == root).then(|| system.clone());
        solve_member(&group, &solver, mine, root)
    })
    .context("Cannot form local process group")?;

    let mut solution = None;
    for (rank, result) in results.into_iter().enumerate() {
        let x = result.with_context(|| format!("Rank {} failed", rank))?;
        if rank == root {
            solution = Some(x);
        }
    }
    let x = solution.context("Root rank returned no solution")?;

    build_report(job, &system, &x, size)
}

/// Join the TCP group described by the job as `rank`.
///
/// Returns the report on the root rank and `None` elsewhere.
pub fn run_worker(job: &JobConfig, rank: usize) -> Result<Option<SolveReport>> {
    if job.group.transport != Transport::Tcp {
        anyhow::bail!("`worker` needs group.transport = \"tcp\"; use `rowcast run` for local jobs");
    }

    let peers = job.peer_addrs()?;
    let root = job.group.root;

    println!("Rank {}/{}: connecting to {} peers...", rank, peers.len(), peers.len() - 1);
    let group = TcpGroup::connect(rank, &peers, &TcpOptions::default())
        .with_context(|| format!("Rank {} cannot join the tcp group", rank))?;
    log::info!("rank {} joined a tcp group of {}", rank, group.size());

    // Loaded after joining, so a failed load drops `group` and peers see a
    // lost connection instead of waiting in accept.
    let system = if rank == root {
        match load_job_system(job) {
            Ok(system) => Some(system),
            Err(e) => {
                log::error!("rank {}: {:#}; leaving the group", rank, e);
                return Err(e);
            }
        }
    } else {
        None
    };

    let x = solve_member(&group, &solver_for(job), system.clone(), root)
        .with_context(|| format!("Rank {} failed", rank))?;

    match system {
        Some(original) => build_report(job, &original, &x, group.size()).map(Some),
        None => Ok(None),
    }
}

fn build_report(
    job: &JobConfig,
    original: &LinearSystem,
    x: &Array1<f64>,
    group_size: usize,
) -> Result<SolveReport> {
    let mut report = SolveReport::new(original, x, group_size);
    if job.output.compare_reference {
        let reference = solve_reference(original).context("Reference LU solve failed")?;
        report = report.with_reference(&reference);
    }
    Ok(report)
}

/// Print the summary line for a finished solve.
pub fn print_summary(report: &SolveReport) {
    println!("Residual ||Ax - b||_2 = {:.6e}", report.residual_norm);
    if let Some(deviation) = report.reference_deviation {
        println!("Max deviation from LU reference = {:.6e}", deviation);
    }
    if report.non_finite > 0 {
        eprintln!(
            "Warning: {} of {} solution entries are not finite (zero pivot?)",
            report.non_finite, report.dimension
        );
    }
}

/// Write the outputs enabled in the job to `out_dir`.
pub fn write_outputs(report: &SolveReport, job: &JobConfig, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if job.output.save_csv {
        let csv_path = out_dir.join("solution.csv");
        write_solution_csv(report, &csv_path, job)?;
        written.push(csv_path);
    }
    if job.output.save_json {
        let json_path = out_dir.join("solution.json");
        write_solution_json(report, &json_path)?;
        written.push(json_path);
    }
    Ok(written)
}

/// Write the solution vector to a CSV file with a metadata header.
pub fn write_solution_csv(report: &SolveReport, path: &Path, job: &JobConfig) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Cannot create {}", path.display()))?;

    // Metadata header
    writeln!(file, "# Rowcast Gaussian Elimination: Solution")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# system: {}", job.system.file.display())?;
    writeln!(file, "# dimension: {}", report.dimension)?;
    writeln!(file, "# group_size: {}", report.group_size)?;
    writeln!(file, "# residual_norm: {:.6e}", report.residual_norm)?;
    if let Some(deviation) = report.reference_deviation {
        writeln!(file, "# reference_deviation: {:.6e}", deviation)?;
    }
    writeln!(file, "#")?;
    writeln!(file, "index,value")?;

    for (i, value) in report.solution.iter().enumerate() {
        writeln!(file, "{},{:.17e}", i, value)?;
    }

    println!("Solution written to: {}", path.display());
    Ok(())
}

/// Write the full solve report to a JSON file.
pub fn write_solution_json(report: &SolveReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Report (JSON) written to: {}", path.display());
    Ok(())
}
