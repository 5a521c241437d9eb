use chrono::Duration;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("FLOWLINE")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("scheduler.workflow_lookahead_secs", 21_600)?
            .set_default("scheduler.task_lookahead_secs", 3_600)?
            .set_default("scheduler.dispatch_threshold_secs", 300)?
            .set_default("scheduler.min_eta_offset_secs", 10)?
            .set_default("scheduler.edit_guard_secs", 300)?
            .set_default("scheduler.scan_interval_secs", 300)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Scheduling thresholds.
///
/// The exact values are a product decision, not a correctness requirement;
/// the algorithms only assume they are positive. All fields are whole
/// seconds so they can be sourced from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How far ahead of `start_at` the periodic scan promotes a workflow
    /// from INITIATED to SCHEDULED and dispatches its start job.
    #[serde(default = "default_workflow_lookahead_secs")]
    pub workflow_lookahead_secs: u64,
    /// How far ahead of a task's expected start the periodic scan dispatches
    /// its start job.
    #[serde(default = "default_task_lookahead_secs")]
    pub task_lookahead_secs: u64,
    /// Below this delay an entity is dispatched immediately instead of being
    /// left for the next periodic scan. Matches the scan interval.
    #[serde(default = "default_dispatch_threshold_secs")]
    pub dispatch_threshold_secs: u64,
    /// Minimal positive offset applied to an ETA that would land in the past.
    #[serde(default = "default_min_eta_offset_secs")]
    pub min_eta_offset_secs: u64,
    /// Edits landing this close to an entity's start are rejected to avoid
    /// racing an already-dispatched job.
    #[serde(default = "default_edit_guard_secs")]
    pub edit_guard_secs: u64,
    /// Interval between periodic scans.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn workflow_lookahead(&self) -> Duration {
        Duration::seconds(self.workflow_lookahead_secs as i64)
    }

    pub fn task_lookahead(&self) -> Duration {
        Duration::seconds(self.task_lookahead_secs as i64)
    }

    pub fn dispatch_threshold(&self) -> Duration {
        Duration::seconds(self.dispatch_threshold_secs as i64)
    }

    pub fn min_eta_offset(&self) -> Duration {
        Duration::seconds(self.min_eta_offset_secs as i64)
    }

    pub fn edit_guard(&self) -> Duration {
        Duration::seconds(self.edit_guard_secs as i64)
    }

    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workflow_lookahead_secs: default_workflow_lookahead_secs(),
            task_lookahead_secs: default_task_lookahead_secs(),
            dispatch_threshold_secs: default_dispatch_threshold_secs(),
            min_eta_offset_secs: default_min_eta_offset_secs(),
            edit_guard_secs: default_edit_guard_secs(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

fn default_workflow_lookahead_secs() -> u64 {
    21_600
}

fn default_task_lookahead_secs() -> u64 {
    3_600
}

fn default_dispatch_threshold_secs() -> u64 {
    300
}

fn default_min_eta_offset_secs() -> u64 {
    10
}

fn default_edit_guard_secs() -> u64 {
    300
}

fn default_scan_interval_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.workflow_lookahead(), Duration::hours(6));
        assert_eq!(config.task_lookahead(), Duration::hours(1));
        assert_eq!(config.min_eta_offset(), Duration::seconds(10));
        assert_eq!(config.scan_interval().as_secs(), 300);
    }

    #[test]
    fn test_load_from_env_uses_defaults() {
        let config = AppConfig::load_from_env("FLOWLINE_TEST_UNSET").unwrap();
        assert_eq!(config.scheduler.dispatch_threshold_secs, 300);
    }
}
