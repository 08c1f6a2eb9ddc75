//! Node configuration.
//!
//! Settings are read from an optional file (path in `STEWARD_CONFIG`, default
//! [`DEFAULT_CONFIG_PATH`]) and overridden by `STEWARD_*` environment
//! variables, nested keys separated by `__`, e.g.
//! `STEWARD_MONITORING__TICK_INTERVAL_SECS=30`.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::ApiToken;
use crate::monitor::MonitorConfig;
use crate::recovery::RecoveryConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fleet-steward/config.toml";

#[derive(Debug, thiserror::Error)]
#[error("failed to load configuration: {0}")]
pub struct Error(#[from] ::config::ConfigError);

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    #[serde(default = "default_docker_socket")]
    pub docker_socket: PathBuf,
    /// Where the host filesystem is visible to this process.
    #[serde(default = "default_host_root")]
    pub host_root: PathBuf,
    /// Prefix of runtime names of node-managed containers.
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    /// JSON list of installed workload specs.
    #[serde(default = "default_workload_specs")]
    pub workload_specs: PathBuf,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub recovery: RecoverySettings,
    #[serde(default)]
    pub api_tokens: Vec<ApiToken>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringSettings {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RecoverySettings {
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            restart_delay_secs: default_restart_delay(),
        }
    }
}

fn default_docker_socket() -> PathBuf {
    PathBuf::from("/var/run/docker.sock")
}

fn default_host_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_container_prefix() -> String {
    "flux".to_owned()
}

fn default_workload_specs() -> PathBuf {
    PathBuf::from("/etc/fleet-steward/workloads.json")
}

fn default_listen_addr() -> String {
    "0.0.0.0:16127".to_owned()
}

fn default_tick_interval() -> u64 {
    60
}

fn default_restart_delay() -> u64 {
    2
}

impl Settings {
    /// Loads the settings from the file named by `STEWARD_CONFIG` and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or a variable cannot be parsed.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("STEWARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Loads the settings from `path`, if it exists, and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or a variable cannot be parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        log::debug!("Loading configuration from `{}`", path.display());
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("STEWARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick_interval: Duration::from_secs(self.monitoring.tick_interval_secs.max(1)),
            ..MonitorConfig::default()
        }
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            restart_delay: Duration::from_secs(self.recovery.restart_delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(settings.docker_socket, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(settings.container_prefix, "flux");
        assert_eq!(settings.monitor_config().tick_interval, Duration::from_secs(60));
        assert_eq!(settings.recovery_config().restart_delay, Duration::from_secs(2));
        assert!(settings.api_tokens.is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
host_root = "/rootfs"
container_prefix = "zel"

[monitoring]
tick_interval_secs = 30

[[api_tokens]]
token = "secret"
principal = "ops"
role = "team"
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.host_root, PathBuf::from("/rootfs"));
        assert_eq!(settings.container_prefix, "zel");
        assert_eq!(settings.monitor_config().tick_interval, Duration::from_secs(30));
        assert_eq!(settings.recovery.restart_delay_secs, 2);
        assert_eq!(settings.api_tokens.len(), 1);
        assert_eq!(settings.api_tokens[0].role, Role::Team);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[monitoring]\ntick_interval_secs = \"soon\"\n").unwrap();
        assert!(Settings::load_from(file.path()).is_err());
    }
}
