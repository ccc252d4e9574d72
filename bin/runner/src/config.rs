//! Runner configuration.
//!
//! Loaded via the `config` crate from an optional file named by
//! `CHATFLOW_CONFIG`, overlaid by `CHATFLOW_*` environment variables
//! (nested keys use `__`, e.g. `CHATFLOW_SCHEDULER__TICK_INTERVAL_MS`).

use chatflow_scheduler::SchedulerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the optional configuration file.
pub const CONFIG_PATH_VAR: &str = "CHATFLOW_CONFIG";

/// Runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Path to the flow definition (JSON).
    #[serde(default = "default_flow_path")]
    pub flow_path: PathBuf,

    /// Tracing filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Timer driver settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_flow_path() -> PathBuf {
    PathBuf::from("flow.json")
}

fn default_log_filter() -> String {
    "info".to_owned()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            flow_path: default_flow_path(),
            log_filter: default_log_filter(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Loads configuration from `CHATFLOW_CONFIG` (if set) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let file = std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
        Self::load(file.as_deref())
    }

    /// Loads configuration from `file` (format chosen by extension) and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CHATFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.flow_path, PathBuf::from("flow.json"));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "flow_path = \"flows/support.json\"\nlog_filter = \"debug\"\n\n[scheduler]\ntick_interval_ms = 250"
        )
        .expect("write config");

        let config = RunnerConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.flow_path, PathBuf::from("flows/support.json"));
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.scheduler.tick_interval_ms, 250);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(RunnerConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
