//! TOML configuration deserialisation for solve jobs.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub system: SystemConfig,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the system to solve comes from.
#[derive(Debug, Deserialize)]
pub struct SystemConfig {
    /// System file (`.sys`, `.txt` or `.json`). Relative paths are resolved
    /// against the directory of the job file.
    pub file: PathBuf,
}

/// How the process group is formed.
#[derive(Debug, Deserialize)]
pub struct GroupConfig {
    /// Number of ranks for the local transport. Default: 1.
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// Transport: "local" (threads in this process) or "tcp". Default: "local".
    #[serde(default)]
    pub transport: Transport,
    /// One address per rank, indexed by rank. TCP only.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Rank that loads the system and writes the outputs. Default: 0.
    #[serde(default)]
    pub root: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            processes: default_processes(),
            transport: Transport::default(),
            peers: Vec::new(),
            root: 0,
        }
    }
}

fn default_processes() -> usize {
    1
}

/// Transport selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Local,
    Tcp,
}

/// Solver options.
#[derive(Debug, Deserialize)]
pub struct SolverConfig {
    /// Update owned rows of each elimination step in parallel (default: false).
    #[serde(default)]
    pub parallel_rows: bool,
    /// Confirm all ranks agree on n and P before eliminating (default: true).
    #[serde(default = "default_true")]
    pub check_agreement: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            parallel_rows: false,
            check_agreement: true,
        }
    }
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the solution as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save the solve report as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to compare against a single-process LU solve (default: false).
    #[serde(default)]
    pub compare_reference: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
            compare_reference: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Number of ranks in the group this job describes.
    pub fn group_size(&self) -> usize {
        match self.group.transport {
            Transport::Local => self.group.processes,
            Transport::Tcp => self.group.peers.len(),
        }
    }

    /// Parsed peer addresses for the TCP transport.
    pub fn peer_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.group
            .peers
            .iter()
            .enumerate()
            .map(|(rank, addr)| {
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("Invalid address '{}' for rank {}", addr, rank))
            })
            .collect()
    }

    /// Check the settings that cannot be expressed in the TOML schema.
    pub fn validate(&self) -> Result<()> {
        match self.group.transport {
            Transport::Local => {
                if self.group.processes == 0 {
                    anyhow::bail!("group.processes must be at least 1");
                }
            }
            Transport::Tcp => {
                if self.group.peers.is_empty() {
                    anyhow::bail!("group.peers must list one address per rank for the tcp transport");
                }
                self.peer_addrs()?;
            }
        }
        if self.group.root >= self.group_size() {
            anyhow::bail!(
                "group.root = {} is outside a group of {} ranks",
                self.group.root,
                self.group_size()
            );
        }
        Ok(())
    }
}

/// Parse a job from TOML text. `base` is the directory relative system
/// paths are resolved against.
pub fn parse_config(content: &str, base: &Path) -> Result<JobConfig> {
    let mut config: JobConfig = toml::from_str(content)?;
    if config.system.file.is_relative() {
        config.system.file = base.join(&config.system.file);
    }
    config.validate()?;
    Ok(config)
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read job file {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&content, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_job_uses_defaults() {
        let job = parse_config("[system]\nfile = \"a.sys\"\n", Path::new("/jobs")).unwrap();
        assert_eq!(job.system.file, PathBuf::from("/jobs/a.sys"));
        assert_eq!(job.group.processes, 1);
        assert_eq!(job.group.transport, Transport::Local);
        assert!(job.solver.check_agreement);
        assert!(!job.solver.parallel_rows);
        assert!(job.output.save_csv);
        assert!(!job.output.compare_reference);
        assert_eq!(job.group_size(), 1);
    }

    #[test]
    fn test_absolute_system_path_is_kept() {
        let job = parse_config("[system]\nfile = \"/data/a.json\"\n", Path::new("/jobs")).unwrap();
        assert_eq!(job.system.file, PathBuf::from("/data/a.json"));
    }

    #[test]
    fn test_tcp_job() {
        let toml = r#"
            [system]
            file = "a.sys"

            [group]
            transport = "tcp"
            peers = ["127.0.0.1:7100", "127.0.0.1:7101"]
            root = 1
        "#;
        let job = parse_config(toml, Path::new(".")).unwrap();
        assert_eq!(job.group.transport, Transport::Tcp);
        assert_eq!(job.group_size(), 2);
        assert_eq!(job.peer_addrs().unwrap()[1].port(), 7101);
    }

    #[test]
    fn test_bad_peer_address_rejected() {
        let toml = r#"
            [system]
            file = "a.sys"
            [group]
            transport = "tcp"
            peers = ["not-an-address"]
        "#;
        assert!(parse_config(toml, Path::new(".")).is_err());
    }

    #[test]
    fn test_root_outside_group_rejected() {
        let toml = r#"
            [system]
            file = "a.sys"
            [group]
            processes = 2
            root = 2
        "#;
        assert!(parse_config(toml, Path::new(".")).is_err());
    }

    #[test]
    fn test_zero_processes_rejected() {
        let toml = "[system]\nfile = \"a.sys\"\n[group]\nprocesses = 0\n";
        assert!(parse_config(toml, Path::new(".")).is_err());
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let toml = "[system]\nfile = \"a.sys\"\n[group]\ntransport = \"mpi\"\n";
        assert!(parse_config(toml, Path::new(".")).is_err());
    }
}
