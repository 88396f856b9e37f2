//! Per-worker run coordination
//!
//! Every worker in the group runs one `Coordinator` to completion. It
//! discovers its place in the group, takes its share of the samples, draws
//! them with a worker-unique seed, and joins the group-wide reductions. Only
//! the designated worker comes out with a `Report`.
//!
//! # Phases
//!
//! ```text
//! Unstarted -> GroupDiscovered -> Partitioned -> LocalEstimateComputed
//!           -> Reduced -> Finalized   (designated worker)
//!                      -> Idle        (everyone else)
//! ```
//!
//! Phases only move forward. Any error ends the run.

pub mod partition;

use crate::config::RunConfig;
use crate::group::{GroupError, ProcessGroup};
use crate::output::{Report, Timing};
use crate::sampler;
use crate::util::time::{calculate_rate, format_rate, format_secs};
use partition::Partition;
use thiserror::Error;
use tracing::debug;

/// Errors that end a coordinated run
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(
        "cannot split {total} samples across {group_size} workers: every worker needs at least one"
    )]
    DegeneratePartition { total: u64, group_size: usize },

    #[error(transparent)]
    Group(#[from] GroupError),
}

/// Lifecycle of one worker's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Unstarted,
    GroupDiscovered,
    Partitioned,
    LocalEstimateComputed,
    Reduced,
    Finalized,
    Idle,
}

/// How a worker's run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Designated worker: holds the global result
    Finalized(Report),
    /// Any other worker: contributed, nothing to report
    Idle,
}

impl RunOutcome {
    pub fn into_report(self) -> Option<Report> {
        match self {
            RunOutcome::Finalized(report) => Some(report),
            RunOutcome::Idle => None,
        }
    }
}

/// Seed for `rank`'s sample stream
///
/// Distinct for every rank of a run, even when all workers read the same
/// seed base.
pub fn derive_seed(seed_base: u64, rank: usize) -> u64 {
    seed_base.wrapping_add(rank as u64)
}

/// Global estimate from the reduced sum of local estimates
///
/// Unweighted mean: under unequal shares the last worker's estimate counts
/// the same as everyone else's.
pub fn finalize(estimate_sum: f64, group_size: usize) -> f64 {
    estimate_sum / group_size as f64
}

/// Drives one worker through a run
pub struct Coordinator<G: ProcessGroup> {
    group: G,
    total_samples: u64,
    timing: bool,
    seed_base: u64,
    started_at: f64,
    phase: Phase,
}

impl<G: ProcessGroup> Coordinator<G> {
    /// Create a coordinator over an already formed group
    ///
    /// `seed_base` is read once at process start and handed to every worker
    /// the same way, so sampling itself never consults the clock.
    pub fn new(group: G, config: &RunConfig, seed_base: u64) -> Self {
        let started_at = group.wtime();
        Self {
            group,
            total_samples: config.total_samples,
            timing: config.timing,
            seed_base,
            started_at,
            phase: Phase::Unstarted,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run to completion
    ///
    /// Every worker issues the same reductions in the same order. A
    /// degenerate partition is detected before the first one, identically
    /// on every worker, so nobody is left waiting in a collective.
    pub fn run(mut self) -> Result<RunOutcome, CoordinatorError> {
        let rank = self.group.rank();
        let size = self.group.size();
        self.advance(Phase::GroupDiscovered);

        let partition = Partition::new(self.total_samples, size)?;
        let share = partition
            .share(rank)
            .ok_or(GroupError::RankOutOfRange { rank, size })?;
        let seed = derive_seed(self.seed_base, rank);
        debug!(rank, size, share, seed, "partitioned");
        self.advance(Phase::Partitioned);

        let parallel_start = self.group.wtime();
        let local_estimate = sampler::estimate(share, seed);
        let parallel_secs = self.group.wtime() - parallel_start;
        debug!(
            rank,
            local_estimate,
            elapsed = %format_secs(parallel_secs),
            rate = %format_rate(calculate_rate(share, parallel_secs)),
            "sampling complete"
        );
        self.advance(Phase::LocalEstimateComputed);

        let estimate_sum = self.group.reduce_sum(local_estimate)?;

        let timing = if self.timing {
            let total_secs = self.group.wtime() - self.started_at;
            let max_parallel = self.group.reduce_max(parallel_secs)?;
            let max_total = self.group.reduce_max(total_secs)?;
            max_parallel.zip(max_total).map(|(parallel_secs, total_secs)| Timing {
                total_secs,
                parallel_secs,
            })
        } else {
            None
        };
        self.advance(Phase::Reduced);

        match estimate_sum {
            Some(sum) => {
                self.advance(Phase::Finalized);
                Ok(RunOutcome::Finalized(Report {
                    pi_estimate: finalize(sum, size),
                    total_samples: partition.total(),
                    group_size: size,
                    timing,
                }))
            }
            None => {
                self.advance(Phase::Idle);
                Ok(RunOutcome::Idle)
            }
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase {:?} after {:?}", next, self.phase);
        debug!(rank = self.group.rank(), from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{LocalGroup, ReduceOp};
    use std::thread;

    /// Stand-in member that records every collective it is asked for and
    /// answers as if it were the only contributor
    struct RecordingGroup {
        rank: usize,
        size: usize,
        calls: Vec<(ReduceOp, f64)>,
        clock: f64,
    }

    impl RecordingGroup {
        fn new(rank: usize, size: usize) -> Self {
            Self {
                rank,
                size,
                calls: Vec::new(),
                clock: 0.0,
            }
        }
    }

    impl ProcessGroup for &mut RecordingGroup {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn wtime(&self) -> f64 {
            self.clock
        }

        fn reduce(&mut self, op: ReduceOp, value: f64) -> Result<Option<f64>, GroupError> {
            self.calls.push((op, value));
            Ok(if self.rank == 0 { Some(value) } else { None })
        }
    }

    fn config(total_samples: u64, timing: bool) -> RunConfig {
        RunConfig {
            total_samples,
            timing,
            ..RunConfig::default()
        }
    }

    /// Run a full group on threads and return every worker's outcome
    fn run_group(size: usize, config: &RunConfig, seed_base: u64) -> Vec<RunOutcome> {
        let groups = LocalGroup::create(size).unwrap();
        thread::scope(|s| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| s.spawn(move || Coordinator::new(group, config, seed_base).run()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        })
    }

    fn expected_mean(shares: &[u64], seed_base: u64) -> f64 {
        let sum = ReduceOp::Sum.fold(
            shares
                .iter()
                .enumerate()
                .map(|(rank, &share)| sampler::estimate(share, derive_seed(seed_base, rank))),
        );
        finalize(sum, shares.len())
    }

    #[test]
    fn test_derive_seed_distinct_per_rank() {
        let seeds: Vec<u64> = (0..16).map(|rank| derive_seed(1_700_000_000, rank)).collect();
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_derive_seed_wraps() {
        assert_eq!(derive_seed(u64::MAX, 1), 0);
        assert_eq!(derive_seed(u64::MAX, 0), u64::MAX);
    }

    #[test]
    fn test_finalize_unweighted_mean() {
        let sum = ReduceOp::Sum.fold([3.10, 3.14, 3.16, 3.20]);
        assert!((finalize(sum, 4) - 3.15).abs() < 1e-12);
        assert_eq!(finalize(3.0, 1), 3.0);
    }

    #[test]
    fn test_single_worker_estimate_is_local_estimate() {
        let outcomes = run_group(1, &config(1_000_000, false), 42);
        let report = outcomes[0].clone().into_report().unwrap();
        let local = sampler::estimate(1_000_000, derive_seed(42, 0));
        assert_eq!(report.pi_estimate.to_bits(), local.to_bits());
        assert_eq!(report.group_size, 1);
        assert_eq!(report.total_samples, 1_000_000);
        assert_eq!(report.timing, None);
    }

    #[test]
    fn test_even_split_end_to_end() {
        let outcomes = run_group(4, &config(100, false), 7);
        let report = outcomes[0].clone().into_report().unwrap();
        assert_eq!(
            report.pi_estimate.to_bits(),
            expected_mean(&[25, 25, 25, 25], 7).to_bits()
        );
        assert!(outcomes[1..].iter().all(|o| *o == RunOutcome::Idle));
    }

    #[test]
    fn test_uneven_split_end_to_end() {
        let outcomes = run_group(3, &config(100, false), 7);
        let report = outcomes[0].clone().into_report().unwrap();
        assert_eq!(
            report.pi_estimate.to_bits(),
            expected_mean(&[33, 33, 34], 7).to_bits()
        );
        assert_eq!(report.group_size, 3);
        assert_eq!(report.total_samples, 100);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let config = config(200_000, false);
        let first = run_group(4, &config, 1234).remove(0);
        let second = run_group(4, &config, 1234).remove(0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_estimate_is_plausible() {
        let outcomes = run_group(4, &config(4_000_000, false), 99);
        let report = outcomes[0].clone().into_report().unwrap();
        assert!((report.pi_estimate - std::f64::consts::PI).abs() < 0.01);
    }

    #[test]
    fn test_timing_reported_only_when_enabled() {
        let outcomes = run_group(3, &config(30_000, true), 5);
        let timing = outcomes[0].clone().into_report().unwrap().timing.unwrap();
        assert!(timing.total_secs >= timing.parallel_secs);
        assert!(timing.parallel_secs >= 0.0);

        let outcomes = run_group(3, &config(30_000, false), 5);
        assert_eq!(outcomes[0].clone().into_report().unwrap().timing, None);
    }

    #[test]
    fn test_collective_order() {
        let mut group = RecordingGroup::new(0, 1);
        Coordinator::new(&mut group, &config(100, true), 1).run().unwrap();
        let ops: Vec<ReduceOp> = group.calls.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![ReduceOp::Sum, ReduceOp::Max, ReduceOp::Max]);

        let mut group = RecordingGroup::new(0, 1);
        Coordinator::new(&mut group, &config(100, false), 1).run().unwrap();
        let ops: Vec<ReduceOp> = group.calls.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![ReduceOp::Sum]);
    }

    #[test]
    fn test_non_designated_still_contributes() {
        let mut group = RecordingGroup::new(2, 3);
        let outcome = Coordinator::new(&mut group, &config(90, true), 1).run().unwrap();
        assert_eq!(outcome, RunOutcome::Idle);
        assert_eq!(group.calls.len(), 3);
        assert_eq!(
            group.calls[0].1.to_bits(),
            sampler::estimate(30, derive_seed(1, 2)).to_bits()
        );
    }

    #[test]
    fn test_degenerate_partition_fails_before_collectives() {
        let mut group = RecordingGroup::new(1, 4);
        let result = Coordinator::new(&mut group, &config(3, true), 1).run();
        assert!(matches!(
            result,
            Err(CoordinatorError::DegeneratePartition {
                total: 3,
                group_size: 4
            })
        ));
        assert!(group.calls.is_empty());
    }

    #[test]
    fn test_degenerate_partition_fails_on_every_worker() {
        let groups = LocalGroup::create(4).unwrap();
        let config = config(2, false);
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| s.spawn(|| Coordinator::new(group, &config, 0).run()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(CoordinatorError::DegeneratePartition { .. }))));
    }

    #[test]
    fn test_tcp_group_matches_local_group() {
        use crate::group::{RunTerms, TcpGroup, TcpGroupListener};
        use std::time::Duration;

        let config = config(1_000, true);
        let terms = RunTerms::from(&config);
        let listener = TcpGroupListener::bind("127.0.0.1:0", 3, terms).unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let tcp_report = thread::scope(|s| {
            let peers: Vec<_> = (1..3)
                .map(|rank| {
                    let (addr, config) = (&addr, &config);
                    s.spawn(move || {
                        let group =
                            TcpGroup::join(rank, 3, addr, terms, 0, Duration::from_secs(10))
                                .unwrap();
                        let seed_base = group.seed_base();
                        Coordinator::new(group, config, seed_base).run().unwrap()
                    })
                })
                .collect();

            let group = listener.form(21, Duration::from_secs(10)).unwrap();
            let outcome = Coordinator::new(group, &config, 21).run().unwrap();
            for peer in peers {
                assert_eq!(peer.join().unwrap(), RunOutcome::Idle);
            }
            outcome.into_report().unwrap()
        });

        let local_report = run_group(3, &config, 21).remove(0).into_report().unwrap();
        assert_eq!(
            tcp_report.pi_estimate.to_bits(),
            local_report.pi_estimate.to_bits()
        );
        assert!(tcp_report.timing.is_some());
    }

    #[test]
    fn test_new_coordinator_is_unstarted() {
        let mut group = RecordingGroup::new(0, 1);
        let coordinator = Coordinator::new(&mut group, &config(10, false), 0);
        assert_eq!(coordinator.phase(), Phase::Unstarted);
    }
}
