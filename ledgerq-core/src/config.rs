//! Adapter scheduling configuration.
//!
//! Maps to an `[indexer]`-style section of a host application's config
//! file. All fields are optional with production defaults, so an empty
//! section is a valid configuration.

use serde::{Deserialize, Serialize};

/// Scheduling configuration for a queue adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Seconds between regular scans.
    #[serde(default = "default_regular_interval_secs")]
    pub regular_interval_secs: u64,
    /// Seconds between extended (long-lookback) scans.
    #[serde(default = "default_extended_interval_secs")]
    pub extended_interval_secs: u64,
    /// When false, `run_cycle` never scans and only drives the queue.
    #[serde(default = "default_auto_scan")]
    pub auto_scan: bool,
}

fn default_regular_interval_secs() -> u64 {
    5 * 60
}

fn default_extended_interval_secs() -> u64 {
    60 * 60
}

fn default_auto_scan() -> bool {
    true
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            regular_interval_secs: default_regular_interval_secs(),
            extended_interval_secs: default_extended_interval_secs(),
            auto_scan: default_auto_scan(),
        }
    }
}

impl AdapterConfig {
    pub fn regular_interval(&self) -> time::Duration {
        time::Duration::seconds(self.regular_interval_secs as i64)
    }

    pub fn extended_interval(&self) -> time::Duration {
        time::Duration::seconds(self.extended_interval_secs as i64)
    }
}
