//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Samples drawn across the whole group when none are requested
pub const DEFAULT_TOTAL_SAMPLES: u64 = 100_000_000;

/// Run configuration shared by every worker
///
/// Every field has a default, so a TOML file may set any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Total samples, split across the group
    pub total_samples: u64,
    /// Measure and report elapsed times
    pub timing: bool,
    /// Seed base override (wall-clock seconds when absent)
    pub seed: Option<u64>,
    /// Report format
    pub format: OutputFormat,
    /// Seconds a worker keeps trying to form the group
    pub join_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_samples: DEFAULT_TOTAL_SAMPLES,
            timing: false,
            seed: None,
            format: OutputFormat::default(),
            join_timeout_secs: 30,
        }
    }
}

/// Report format on standard output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One value per line
    #[default]
    Text,
    /// Single JSON object
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.total_samples, 100_000_000);
        assert!(!config.timing);
        assert_eq!(config.seed, None);
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.join_timeout_secs, 30);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }
}
