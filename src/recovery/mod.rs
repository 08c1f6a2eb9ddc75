//! Restart recovery of node-managed containers at node boot.
//!
//! Two situations leave containers in a state the runtime does not repair by
//! itself:
//!
//! - the whole host rebooted and the runtime auto-started containers before
//!   the node's storage was in place; every managed container is restarted;
//! - individual containers started before the storage behind their mounts
//!   became ready; only those are restarted.
//!
//! Restarts always run one at a time with a pause in between, and never fail
//! the caller: each pass returns a [`RecoveryReport`].
use std::sync::Arc;
use std::time::Duration;

mod detector;

pub use detector::MountDriftDetector;

use crate::host::UptimeSource;
use crate::monitor::MonitoringRegistry;
use crate::runtime::{self, RuntimeGateway};
use crate::workload::ContainerIdentity;

/// The host must have booted at most this long ago to count as a fresh boot.
pub const OS_UPTIME_THRESHOLD: Duration = Duration::from_secs(15 * 60);
/// Maximum gap between OS and process uptime within one boot.
pub const MAX_UPTIME_DIFFERENCE: Duration = Duration::from_secs(5 * 60);

/// Whether the host OS and this process came up in the same boot.
///
/// ```
/// # use std::time::Duration;
/// # use fleet_steward::recovery::is_same_boot;
/// assert!(is_same_boot(Duration::from_secs(600), Duration::from_secs(580)));
/// assert!(!is_same_boot(Duration::from_secs(1200), Duration::from_secs(1190)));
/// ```
pub fn is_same_boot(os_uptime: Duration, process_uptime: Duration) -> bool {
    os_uptime < OS_UPTIME_THRESHOLD && os_uptime.abs_diff(process_uptime) < MAX_UPTIME_DIFFERENCE
}

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Pause between two consecutive restarts.
    pub restart_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RestartFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of one batch of restarts, by runtime container name.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RestartResult {
    pub restarted: Vec<String>,
    pub failed: Vec<RestartFailure>,
}

/// Summary of one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Whether the pass found anything to restart.
    pub triggered: bool,
    pub checked: usize,
    pub needing_restart: usize,
    pub result: RestartResult,
    /// Set when the pass could not run to completion.
    pub error: Option<String>,
}

impl RecoveryReport {
    fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootRecoveryReport {
    pub os_restart: RecoveryReport,
    /// `None` when the OS-restart pass already restarted everything.
    pub mount_drift: Option<RecoveryReport>,
}

pub struct RecoveryOrchestrator {
    runtime: Arc<dyn RuntimeGateway>,
    registry: Arc<MonitoringRegistry>,
    detector: MountDriftDetector,
    uptime: Arc<dyn UptimeSource>,
    prefix: String,
    config: RecoveryConfig,
}

impl RecoveryOrchestrator {
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        registry: Arc<MonitoringRegistry>,
        detector: MountDriftDetector,
        uptime: Arc<dyn UptimeSource>,
        prefix: impl Into<String>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            detector,
            uptime,
            prefix: prefix.into(),
            config,
        }
    }

    /// Restarts every running managed container if the host OS booted
    /// together with this process.
    pub async fn recover_from_os_restart(&self) -> RecoveryReport {
        let os_uptime = match self.uptime.os_uptime() {
            Ok(os_uptime) => os_uptime,
            Err(err) => {
                log::error!("OS restart check failed: {}", err);
                return RecoveryReport::failed(err);
            }
        };
        let process_uptime = self.uptime.process_uptime();
        if !is_same_boot(os_uptime, process_uptime) {
            log::debug!(
                "no OS restart detected (OS up {:?}, process up {:?})",
                os_uptime,
                process_uptime
            );
            return RecoveryReport::default();
        }

        let targets = match self.running_managed().await {
            Ok(targets) => targets,
            Err(err) => {
                log::error!("OS restart recovery failed: {}", err);
                return RecoveryReport::failed(err);
            }
        };
        log::info!(
            "OS restart detected, restarting {} managed containers",
            targets.len()
        );
        RecoveryReport {
            triggered: !targets.is_empty(),
            checked: targets.len(),
            needing_restart: targets.len(),
            result: self.restart_sequentially(&targets).await,
            error: None,
        }
    }

    /// Restarts the running managed containers that started before their
    /// mounts were ready.
    pub async fn recover_from_mount_drift(&self) -> RecoveryReport {
        let candidates = match self.running_managed().await {
            Ok(candidates) => candidates,
            Err(err) => {
                log::error!("mount drift recovery failed: {}", err);
                return RecoveryReport::failed(err);
            }
        };

        let mut targets = Vec::new();
        for identity in &candidates {
            if self.detector.started_before_mounts(identity).await {
                targets.push(identity.clone());
            }
        }
        if !targets.is_empty() {
            log::info!(
                "{} of {} managed containers started before their mounts",
                targets.len(),
                candidates.len()
            );
        }
        RecoveryReport {
            triggered: !targets.is_empty(),
            checked: candidates.len(),
            needing_restart: targets.len(),
            result: self.restart_sequentially(&targets).await,
            error: None,
        }
    }

    /// Runs both recovery passes, skipping mount drift when the OS-restart
    /// pass already restarted everything.
    pub async fn recover_on_boot(&self) -> BootRecoveryReport {
        let os_restart = self.recover_from_os_restart().await;
        let mount_drift = if os_restart.triggered {
            None
        } else {
            Some(self.recover_from_mount_drift().await)
        };
        BootRecoveryReport {
            os_restart,
            mount_drift,
        }
    }

    async fn restart_sequentially(&self, targets: &[ContainerIdentity]) -> RestartResult {
        let mut result = RestartResult::default();
        for (i, identity) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.restart_delay).await;
            }
            let name = identity.runtime_name(&self.prefix);
            match self.registry.restart_container(identity).await {
                Ok(()) => {
                    log::info!("restarted `{}`", name);
                    result.restarted.push(name);
                }
                Err(err) => {
                    log::error!("failed to restart `{}`: {}", name, err);
                    result.failed.push(RestartFailure {
                        name,
                        error: err.to_string(),
                    });
                }
            }
        }
        result
    }

    async fn running_managed(&self) -> runtime::Result<Vec<ContainerIdentity>> {
        let containers = self.runtime.list_containers(false).await?;
        Ok(containers
            .iter()
            .filter(|container| container.is_running())
            .filter_map(|container| {
                container
                    .names
                    .iter()
                    .find_map(|name| ContainerIdentity::from_runtime_name(name, &self.prefix))
            })
            .collect())
    }
}
