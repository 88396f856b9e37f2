//! pidist - distributed Monte Carlo estimation of π
//!
//! A fixed group of workers splits a sample budget, each draws its share of
//! random points in the unit square, and the group reduces the per-worker
//! estimates to one global estimate at the designated worker.
//!
//! # Architecture
//!
//! - **Sampler**: pure hit-or-miss estimator, deterministic per seed
//! - **Coordinator**: partitioning, seeding, reductions and finalization
//! - **Process groups**: in-process threads or worker processes over TCP
//! - **Launch**: run a whole group locally, as threads or child processes

pub mod config;
pub mod coordinator;
pub mod group;
pub mod launch;
pub mod output;
pub mod sampler;
pub mod util;

// Re-export commonly used types
pub use config::RunConfig;
pub use coordinator::{Coordinator, RunOutcome};
pub use group::ProcessGroup;
pub use output::Report;

/// Result type used throughout pidist
pub type Result<T> = anyhow::Result<T>;
