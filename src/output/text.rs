//! Human-readable text output

use super::Report;

/// Render a report, one value per line
///
/// The estimate always comes first. Timing lines follow only when timing was
/// measured.
pub fn render_report(report: &Report) -> String {
    let mut lines = vec![format!("PI: {:.10}", report.pi_estimate)];

    if let Some(timing) = report.timing {
        lines.push(format!("Total time: {:.6} s", timing.total_secs));
        lines.push(format!("Parallel time: {:.6} s", timing.parallel_secs));
        lines.push(format!(
            "Sequential share: {:.2}%",
            timing.sequential_share() * 100.0
        ));
        lines.push(format!(
            "Parallel share: {:.2}%",
            timing.parallel_share() * 100.0
        ));
    }

    lines.join("\n")
}

/// Print a report to stdout
pub fn print_report(report: &Report) {
    println!("{}", render_report(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Timing;

    #[test]
    fn test_render_without_timing() {
        let report = Report {
            pi_estimate: 3.1415926536,
            total_samples: 1000,
            group_size: 2,
            timing: None,
        };
        assert_eq!(render_report(&report), "PI: 3.1415926536");
    }

    #[test]
    fn test_render_with_timing() {
        let report = Report {
            pi_estimate: 3.0,
            total_samples: 1000,
            group_size: 2,
            timing: Some(Timing {
                total_secs: 2.0,
                parallel_secs: 1.5,
            }),
        };
        let rendered = render_report(&report);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "PI: 3.0000000000",
                "Total time: 2.000000 s",
                "Parallel time: 1.500000 s",
                "Sequential share: 25.00%",
                "Parallel share: 75.00%",
            ]
        );
    }
}
