//! pidist CLI entry point

use anyhow::{Context, Result};
use pidist::config::cli::{Cli, ExecutionMode};
use pidist::config::toml::build_config;
use pidist::config::RunConfig;
use pidist::coordinator::{Coordinator, RunOutcome};
use pidist::group::{RunTerms, TcpGroup};
use pidist::launch;
use pidist::output;
use pidist::util::time::{format_duration, wall_clock_seed};
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let main_start = Instant::now();

    let cli = Cli::parse_args();
    init_tracing(cli.debug);
    cli.validate()?;

    let config = build_config(&cli)?;
    let seed_base = config.seed.unwrap_or_else(wall_clock_seed);
    debug!(?config, seed_base, mode = ?cli.mode, "configuration resolved");

    let result = match cli.mode {
        ExecutionMode::Local => run_local(&cli, &config, seed_base),
        ExecutionMode::Worker => run_worker(&cli, &config, seed_base),
        ExecutionMode::Launch => run_launch(&cli, &config, seed_base),
    };

    debug!(elapsed = %format_duration(main_start.elapsed()), "done");
    result
}

/// Log to stderr; `RUST_LOG` wins over `--debug`
fn init_tracing(debug: bool) {
    let default_level = if debug { "pidist=debug" } else { "pidist=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the whole group as threads of this process
fn run_local(cli: &Cli, config: &RunConfig, seed_base: u64) -> Result<()> {
    let workers = cli.worker_count();
    let report = launch::run_threads(config, workers, seed_base)?;
    output::emit(&report, config.format)
}

/// Run as one member of a TCP group
fn run_worker(cli: &Cli, config: &RunConfig, seed_base: u64) -> Result<()> {
    let identity = cli.worker_identity()?;
    let join_timeout = Duration::from_secs(config.join_timeout_secs);

    let group = TcpGroup::join(
        identity.rank,
        identity.size,
        &identity.coordinator,
        RunTerms::from(config),
        seed_base,
        join_timeout,
    )
    .with_context(|| {
        format!(
            "Worker {} failed to join group at {}",
            identity.rank, identity.coordinator
        )
    })?;

    // Peers run on the designated worker's seed base, not their own clock
    let seed_base = group.seed_base();
    let outcome = Coordinator::new(group, config, seed_base)
        .run()
        .with_context(|| format!("Worker {} failed", identity.rank))?;

    match outcome {
        RunOutcome::Finalized(report) => output::emit(&report, config.format),
        RunOutcome::Idle => Ok(()),
    }
}

/// Spawn the whole group as worker processes on localhost
fn run_launch(cli: &Cli, config: &RunConfig, seed_base: u64) -> Result<()> {
    let workers = cli.worker_count();
    launch::launch_processes(config, workers, seed_base, cli.debug)
}
