//! JSON output

use super::Report;
use anyhow::{Context, Result};
use serde::Serialize;

/// JSON view of a report, with the derived time shares spelled out
#[derive(Debug, Serialize)]
struct JsonReport {
    pi_estimate: f64,
    total_samples: u64,
    group_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    timing: Option<JsonTiming>,
}

#[derive(Debug, Serialize)]
struct JsonTiming {
    total_secs: f64,
    parallel_secs: f64,
    sequential_share: f64,
    parallel_share: f64,
}

impl From<&Report> for JsonReport {
    fn from(report: &Report) -> Self {
        Self {
            pi_estimate: report.pi_estimate,
            total_samples: report.total_samples,
            group_size: report.group_size,
            timing: report.timing.map(|t| JsonTiming {
                total_secs: t.total_secs,
                parallel_secs: t.parallel_secs,
                sequential_share: t.sequential_share(),
                parallel_share: t.parallel_share(),
            }),
        }
    }
}

/// Render a report as pretty-printed JSON
pub fn render_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport::from(report))
        .context("Failed to serialize report to JSON")
}

/// Print a report to stdout as JSON
pub fn print_report(report: &Report) -> Result<()> {
    println!("{}", render_report(report)?);
    Ok(())
}
