//! Configuration validation
//!
//! Checks that do not depend on the group size. Whether the sample count can
//! be split across the group is decided by the coordinator once the size is
//! known.

use super::RunConfig;
use anyhow::Result;

/// Validate a run configuration
pub fn validate_config(config: &RunConfig) -> Result<()> {
    if config.total_samples == 0 {
        anyhow::bail!("total_samples must be at least 1");
    }

    if config.join_timeout_secs == 0 {
        anyhow::bail!("join_timeout_secs must be at least 1");
    }

    Ok(())
}
