//! CLI argument parsing using clap

use super::OutputFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Local mode (default) - every worker is a thread in this process
    Local,
    /// Worker mode - this process is one member of a TCP group
    Worker,
    /// Launch mode - spawn a TCP group of worker processes on localhost
    Launch,
}

/// pidist - distributed Monte Carlo estimation of π
#[derive(Parser, Debug)]
#[command(name = "pidist")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Total number of samples across the whole group [default: 100000000]
    #[arg(value_name = "TOTAL_SAMPLES")]
    pub total_samples: Option<u64>,

    /// Execution mode: local, worker, or launch
    #[arg(long, value_enum, default_value = "local")]
    pub mode: ExecutionMode,

    /// Number of workers (local and launch modes) [default: number of CPUs]
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// This worker's rank (worker mode only)
    #[arg(long, env = "PIDIST_RANK")]
    pub rank: Option<usize>,

    /// Group size (worker mode only)
    #[arg(long, env = "PIDIST_SIZE")]
    pub size: Option<usize>,

    /// Address the designated worker listens on (worker mode only)
    #[arg(long, env = "PIDIST_COORDINATOR")]
    pub coordinator: Option<String>,

    /// Report total and parallel-phase elapsed times
    #[arg(long)]
    pub timing: bool,

    /// Seed base (defaults to wall-clock seconds at start)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Seconds to wait for the group to form
    #[arg(long)]
    pub join_timeout: Option<u64>,

    /// TOML configuration file (command-line flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Verbose diagnostics on stderr
    #[arg(long)]
    pub debug: bool,
}

/// Rank, size and coordinator address of a TCP worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub rank: usize,
    pub size: usize,
    pub coordinator: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(workers) = self.workers {
            if workers == 0 {
                anyhow::bail!("workers must be at least 1");
            }
        }

        if self.mode == ExecutionMode::Worker {
            self.worker_identity()?;
        }

        Ok(())
    }

    /// Group size for local and launch modes
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// Identity for worker mode, from flags or `PIDIST_*` variables
    pub fn worker_identity(&self) -> anyhow::Result<WorkerIdentity> {
        let (Some(rank), Some(size), Some(coordinator)) =
            (self.rank, self.size, self.coordinator.clone())
        else {
            anyhow::bail!(
                "worker mode requires --rank, --size and --coordinator \
                 (or PIDIST_RANK, PIDIST_SIZE, PIDIST_COORDINATOR)"
            );
        };

        if size == 0 {
            anyhow::bail!("size must be at least 1");
        }
        if rank >= size {
            anyhow::bail!("rank {} is outside a group of size {}", rank, size);
        }

        Ok(WorkerIdentity {
            rank,
            size,
            coordinator,
        })
    }
}
