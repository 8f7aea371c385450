/// Scheduler and pipeline configuration.
///
/// Every field has a default, so an empty JSON object (or no config file at
/// all) gives the built-in behaviour.
use crate::error::ConfigError;
use crate::scheduler::eligibility::DEFAULT_RESERVED_META_ADDR_LIMIT;
use crate::scheduler::priority::PriorityRules;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of dequeued files between two progress updates.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ordered root-entry priority rules. First match wins.
    pub priority_rules: PriorityRules,
    /// Metadata addresses below this are reserved filesystem entries.
    pub reserved_meta_addr_limit: u64,
    /// Pipeline worker threads.
    pub workers: usize,
    /// Files dequeued between progress updates.
    pub progress_interval: u64,
    /// Keep a [`DeliveryRecord`](crate::report::DeliveryRecord) per dispatched task.
    pub record_deliveries: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            priority_rules: PriorityRules::default(),
            reserved_meta_addr_limit: DEFAULT_RESERVED_META_ADDR_LIMIT,
            workers: num_cpus::get(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            record_deliveries: false,
        }
    }
}

impl SchedulerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(index) = self.priority_rules.0.iter().position(|r| r.prefix.is_empty()) {
            return Err(ConfigError::EmptyPrefix { index });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}
