//! Default configuration values for lincheck
//!
//! This module centralizes all default values to make them easy to find and modify.

/// Where the traffic drivers append their operation records
pub const DEFAULT_LOG_PATH: &str = "/opt/antithesis/local-txt-files/operations.txt";

/// Largest ambiguous set the resolver will enumerate subsets of (2^19 candidates)
pub const DEFAULT_MAX_AMBIGUOUS_OPERATIONS: usize = 19;

pub const DEFAULT_PARALLEL: bool = true;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Environment variable names
pub const ENV_LOG_PATH: &str = "LINCHECK_LOG_PATH";
pub const ENV_MAX_AMBIGUOUS: &str = "LINCHECK_MAX_AMBIGUOUS";
pub const ENV_WORKERS: &str = "LINCHECK_WORKERS";
pub const ENV_PARALLEL: &str = "LINCHECK_PARALLEL";
pub const ENV_LOG_LEVEL: &str = "LINCHECK_LOG_LEVEL";

pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}
