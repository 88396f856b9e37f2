//! Timing utilities
//!
//! Monotonic group clock, wall-clock seed source and human-readable
//! formatting helpers.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock reporting seconds since its creation
///
/// This is a thin wrapper around `std::time::Instant`. Readings never go
/// backwards and differences between two readings are elapsed seconds.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Start a clock at the current instant
    #[inline]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Seconds elapsed since the clock was created
    #[inline]
    pub fn wtime(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock seconds since the Unix epoch
///
/// Used once at process start as the base for per-worker seeds. A clock set
/// before 1970 yields 0 rather than failing.
pub fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format a duration with the largest fitting unit, ns through s
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2}us", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos as f64 / 1_000_000_000.0)
    }
}

/// Format a duration given in (possibly fractional) seconds
///
/// Negative or non-finite inputs are shown as zero.
pub fn format_secs(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return format_duration(Duration::ZERO);
    }
    format_duration(Duration::from_secs_f64(secs))
}

/// Format a sampling rate (per second) with a K/M/G suffix
pub fn format_rate(rate: f64) -> String {
    if rate < 1_000.0 {
        format!("{:.0}", rate)
    } else if rate < 1_000_000.0 {
        format!("{:.2}K", rate / 1_000.0)
    } else if rate < 1_000_000_000.0 {
        format!("{:.2}M", rate / 1_000_000.0)
    } else {
        format!("{:.2}G", rate / 1_000_000_000.0)
    }
}

/// Samples per second over `secs`, or 0 for an empty interval
pub fn calculate_rate(samples: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        samples as f64 / secs
    } else {
        0.0
    }
}
