//! TOML configuration file parsing

use super::cli::Cli;
use super::RunConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<RunConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<RunConfig> {
    let config: RunConfig = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: RunConfig) -> RunConfig {
    if let Some(total_samples) = cli.total_samples {
        config.total_samples = total_samples;
    }
    if cli.timing {
        config.timing = true;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(join_timeout) = cli.join_timeout {
        config.join_timeout_secs = join_timeout;
    }

    config
}

/// Build the effective configuration: file (if any), then CLI overrides,
/// then validation
pub fn build_config(cli: &Cli) -> Result<RunConfig> {
    let base = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => RunConfig::default(),
    };

    let config = merge_cli_with_config(cli, base);
    super::validator::validate_config(&config).context("Configuration validation failed")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pidist").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = parse_toml_string("total_samples = 5000\ntiming = true\n").unwrap();
        assert_eq!(config.total_samples, 5000);
        assert!(config.timing);
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.join_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            total_samples = 1000000
            timing = false
            seed = 42
            format = "json"
            join_timeout_secs = 5
        "#;
        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.join_timeout_secs, 5);
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(parse_toml_string("samples = 10").is_err());
        assert!(parse_toml_string("total_samples = \"many\"").is_err());
        assert!(parse_toml_string("total_samples = -3").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = RunConfig {
            total_samples: 10,
            seed: Some(1),
            ..RunConfig::default()
        };
        let merged = merge_cli_with_config(&cli(&["777", "--seed", "2", "--timing"]), file);
        assert_eq!(merged.total_samples, 777);
        assert_eq!(merged.seed, Some(2));
        assert!(merged.timing);
    }

    #[test]
    fn test_file_values_kept_without_flags() {
        let file = RunConfig {
            total_samples: 10,
            timing: true,
            format: OutputFormat::Json,
            ..RunConfig::default()
        };
        let merged = merge_cli_with_config(&cli(&[]), file.clone());
        assert_eq!(merged, file);
    }

    #[test]
    fn test_build_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "total_samples = 2048\nformat = \"json\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = build_config(&cli(&["--config", &path, "--timing"])).unwrap();
        assert_eq!(config.total_samples, 2048);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.timing);
    }

    #[test]
    fn test_build_config_missing_file() {
        assert!(build_config(&cli(&["--config", "/nonexistent/pidist.toml"])).is_err());
    }

    #[test]
    fn test_build_config_rejects_zero_samples() {
        assert!(build_config(&cli(&["0"])).is_err());
    }
}
