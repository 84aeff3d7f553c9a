//! Rowcast command-line interface.
//!
//! Solve linear systems described by TOML job files:
//! ```sh
//! rowcast run job.toml
//! rowcast validate job.toml
//! rowcast worker job.toml --rank 2
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rowcast")]
#[command(about = "Rowcast: distributed Gaussian elimination with row-cyclic ownership")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a system on a local group of threads.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a job file and its system file without solving.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Join a TCP group as one rank. Start one worker per peer address.
    Worker {
        /// Path to the job configuration file.
        config: PathBuf,
        /// This process's rank, an index into `group.peers`.
        #[arg(short, long)]
        rank: usize,
        /// Output directory for the root rank (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Rowcast Gaussian Elimination");
            println!("============================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let report = runner::run_local_job(&job)?;
            runner::print_summary(&report);

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            runner::write_outputs(&report, &job, &out_dir)?;

            println!("Solve complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let system = runner::load_job_system(&job)?;
            system.check_dimensions()?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  system: {} ({} unknowns), group of {} ranks",
                job.system.file.display(),
                system.dim(),
                job.group_size()
            );
            Ok(())
        }
        Commands::Worker {
            config,
            rank,
            output,
        } => {
            let job = config::load_config(&config)?;
            match runner::run_worker(&job, rank)? {
                Some(report) => {
                    runner::print_summary(&report);
                    let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
                    runner::write_outputs(&report, &job, &out_dir)?;
                    println!("Solve complete.");
                }
                None => println!("Rank {} finished.", rank),
            }
            Ok(())
        }
    }
}
