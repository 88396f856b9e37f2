//! Group launchers
//!
//! - `run_threads`: whole group inside this process, one thread per worker
//! - `launch_processes`: whole group on localhost, one child process per
//!   worker, connected over TCP

use crate::config::RunConfig;
use crate::coordinator::{Coordinator, RunOutcome};
use crate::group::LocalGroup;
use crate::output::Report;
use anyhow::{Context, Result};
use std::net::TcpListener;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Ports tried, in order, for the designated worker of a launched group
const PORT_RANGE: std::ops::Range<u16> = 47_600..47_700;

/// How often launched children are polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a group of `workers` threads and return the designated worker's report
pub fn run_threads(config: &RunConfig, workers: usize, seed_base: u64) -> Result<Report> {
    let groups = LocalGroup::create(workers).context("Failed to create worker group")?;

    let outcomes = thread::scope(|s| {
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| s.spawn(move || Coordinator::new(group, config, seed_base).run()))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("Worker thread panicked"))
            })
            .collect::<Vec<_>>()
    });

    let mut report = None;
    for outcome in outcomes {
        if let RunOutcome::Finalized(r) = outcome?? {
            report = Some(r);
        }
    }

    report.context("Designated worker produced no report")
}

/// Find a free localhost port for the designated worker
pub fn find_available_port() -> Result<u16> {
    for port in PORT_RANGE {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            drop(listener);
            debug!(port, "port available");
            return Ok(port);
        }
    }

    anyhow::bail!(
        "No available ports found in range {}-{}",
        PORT_RANGE.start,
        PORT_RANGE.end - 1
    )
}

/// Arguments that make a worker process run with `config`
///
/// The seed base is always passed so every worker offsets the same value.
pub fn forward_args(config: &RunConfig, seed_base: u64, debug: bool) -> Vec<String> {
    let mut args = vec![
        config.total_samples.to_string(),
        "--seed".to_string(),
        seed_base.to_string(),
        "--format".to_string(),
        config.format.to_string(),
        "--join-timeout".to_string(),
        config.join_timeout_secs.to_string(),
    ];

    if config.timing {
        args.push("--timing".to_string());
    }
    if debug {
        args.push("--debug".to_string());
    }

    args
}

/// Spawn `workers` copies of this executable as a TCP group and wait for them
///
/// Only the designated worker's stdout is kept. If any worker fails, the
/// remaining ones are killed.
pub fn launch_processes(
    config: &RunConfig,
    workers: usize,
    seed_base: u64,
    debug: bool,
) -> Result<()> {
    let exe_path = std::env::current_exe().context("Failed to get current executable path")?;
    let port = find_available_port()?;
    let coordinator = format!("127.0.0.1:{}", port);
    let args = forward_args(config, seed_base, debug);

    let mut children: Vec<(usize, Child)> = Vec::with_capacity(workers);
    for rank in 0..workers {
        let mut cmd = Command::new(&exe_path);
        cmd.args(&args)
            .arg("--mode")
            .arg("worker")
            .arg("--rank")
            .arg(rank.to_string())
            .arg("--size")
            .arg(workers.to_string())
            .arg("--coordinator")
            .arg(&coordinator)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        if rank == 0 {
            cmd.stdout(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null());
        }

        match cmd.spawn() {
            Ok(child) => {
                debug!(rank, pid = child.id(), "worker launched");
                children.push((rank, child));
            }
            Err(e) => {
                kill_all(&mut children);
                return Err(e).context(format!("Failed to spawn worker {}", rank));
            }
        }
    }

    wait_all(children)
}

/// Wait for every child; on the first failure kill the rest
fn wait_all(mut children: Vec<(usize, Child)>) -> Result<()> {
    while !children.is_empty() {
        let mut failed: Option<(usize, ExitStatus)> = None;
        let mut i = 0;
        while i < children.len() {
            let (rank, child) = &mut children[i];
            match child.try_wait()? {
                Some(status) if status.success() => {
                    debug!(rank = *rank, "worker finished");
                    children.swap_remove(i);
                }
                Some(status) => {
                    failed = Some((*rank, status));
                    children.swap_remove(i);
                    break;
                }
                None => i += 1,
            }
        }

        if let Some((rank, status)) = failed {
            kill_all(&mut children);
            anyhow::bail!("Worker {} failed with status: {}", rank, status);
        }

        if !children.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
    }

    Ok(())
}

fn kill_all(children: &mut [(usize, Child)]) {
    for (rank, child) in children.iter_mut() {
        if let Err(e) = child.kill() {
            warn!(rank = *rank, error = %e, "failed to kill worker");
        }
        if let Err(e) = child.wait() {
            warn!(rank = *rank, error = %e, "failed to reap worker");
        }
    }
}
