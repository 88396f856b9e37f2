//! Run reports and their renderings
//!
//! A `Report` exists only on the designated worker, after the final
//! reduction. `text` prints one value per line; `json` emits a single object.

pub mod json;
pub mod text;

use crate::config::OutputFormat;
use anyhow::Result;

/// Final result of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Unweighted mean of the workers' local estimates
    pub pi_estimate: f64,
    pub total_samples: u64,
    pub group_size: usize,
    /// Present when elapsed-time diagnostics were enabled
    pub timing: Option<Timing>,
}

/// Elapsed-time diagnostics, each the maximum over all workers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Whole run, from coordinator construction to the end of the estimate
    /// reduction
    pub total_secs: f64,
    /// Sampling phase only
    pub parallel_secs: f64,
}

impl Timing {
    /// Fraction of the run spent sampling, in `[0, 1]`
    pub fn parallel_share(&self) -> f64 {
        if self.total_secs > 0.0 {
            (self.parallel_secs / self.total_secs).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Fraction of the run spent outside sampling, in `[0, 1]`
    pub fn sequential_share(&self) -> f64 {
        1.0 - self.parallel_share()
    }
}

/// Print a report to stdout in the requested format
pub fn emit(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => text::print_report(report),
        OutputFormat::Json => json::print_report(report)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shares() {
        let timing = Timing {
            total_secs: 2.0,
            parallel_secs: 1.5,
        };
        assert_eq!(timing.parallel_share(), 0.75);
        assert_eq!(timing.sequential_share(), 0.25);
    }

    #[test]
    fn test_shares_clamped() {
        let timing = Timing {
            total_secs: 1.0,
            parallel_secs: 1.2,
        };
        assert_eq!(timing.parallel_share(), 1.0);
        assert_eq!(timing.sequential_share(), 0.0);
    }

    #[test]
    fn test_shares_zero_total() {
        let timing = Timing {
            total_secs: 0.0,
            parallel_secs: 0.0,
        };
        assert_eq!(timing.parallel_share(), 1.0);
        assert_eq!(timing.sequential_share(), 0.0);
    }
}
