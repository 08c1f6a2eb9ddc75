//! Fleet Steward: container lifecycle and consistency recovery for an
//! application-hosting node.
//!
//! This library samples the resource usage of every container the node runs
//! on behalf of its workloads, exposes the collected history through a small
//! HTTP API, and repairs containers that the runtime brought up in an
//! inconsistent state after a host reboot or a late storage mount.
use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod command;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod host;
pub mod monitor;
pub mod recovery;
pub mod runtime;
pub mod stats;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;

use api::MonitoringOrchestrator;
use auth::{TokenVerifier, Verifier};
use error::ResultOkLogExt;
use monitor::MonitoringRegistry;
use recovery::{MountDriftDetector, RecoveryOrchestrator};
use runtime::{DockerGateway, RuntimeGateway};
use stats::{DuMeasurer, StatsCollector, UsageMeasurer};
use workload::{FileSpecRegistry, WorkloadSpecRegistry};

/// Runs the Fleet Steward node service.
///
/// Loads the configuration, recovers containers left inconsistent by the
/// last boot, starts monitoring every installed workload and serves the API.
///
/// # Errors
///
/// Possible errors include:
/// - An unparsable configuration file or environment variable.
/// - Failure to set up the container runtime client.
/// - Failure to bind or serve the API listener.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = config::Settings::load()?;
    let uptime = Arc::new(host::HostUptime::new(&settings.host_root));
    log::debug!("Host root: {}", settings.host_root.display());
    log::debug!("Docker socket: {}", settings.docker_socket.display());

    let runtime: Arc<dyn RuntimeGateway> = Arc::new(DockerGateway::connect(&settings.docker_socket)?);
    let measurer: Arc<dyn UsageMeasurer> =
        Arc::new(DuMeasurer::new(Arc::new(command::CommandLocks::default())));
    let collector = StatsCollector::new(
        Arc::clone(&runtime),
        measurer,
        &settings.host_root,
        &settings.container_prefix,
    );
    let registry = Arc::new(MonitoringRegistry::new(
        Arc::clone(&runtime),
        collector,
        settings.monitor_config(),
    ));

    let recovery = RecoveryOrchestrator::new(
        Arc::clone(&runtime),
        Arc::clone(&registry),
        MountDriftDetector::new(
            Arc::clone(&runtime),
            &settings.host_root,
            &settings.container_prefix,
        ),
        uptime,
        &settings.container_prefix,
        settings.recovery_config(),
    );
    let report = recovery.recover_on_boot().await;
    log::info!(
        "Boot recovery: {}",
        serde_json::to_string(&report).unwrap_or_default()
    );

    let specs: Arc<dyn WorkloadSpecRegistry> =
        Arc::new(FileSpecRegistry::new(&settings.workload_specs));
    let verifier: Arc<dyn Verifier> = Arc::new(TokenVerifier::new(
        settings.api_tokens.iter().cloned(),
        Arc::clone(&specs),
    ));
    let orchestrator = Arc::new(MonitoringOrchestrator::new(registry, specs, verifier));
    monitor_on_boot(&orchestrator).await;

    api::ApiServer::new(orchestrator)
        .listen(settings.listen_addr.as_str())
        .await?;
    Ok(())
}

/// Starts monitoring the installed workloads, returning how many containers
/// are now sampled.
///
/// An unreadable workload list is logged; the API can start monitoring later.
async fn monitor_on_boot(orchestrator: &MonitoringOrchestrator) -> usize {
    orchestrator
        .monitor_installed()
        .await
        .ok_log("installed workloads not monitored on boot")
        .map_or(0, |identities| identities.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MonitoringFixture;

    #[tokio::test]
    async fn test_boot_survives_unreadable_workload_list() {
        let fixture = MonitoringFixture::new();
        fixture.specs.set_unavailable(true);
        assert_eq!(monitor_on_boot(&fixture.orchestrator).await, 0);
        assert!(fixture.registry().monitored().is_empty());

        fixture.specs.set_unavailable(false);
        assert_eq!(monitor_on_boot(&fixture.orchestrator).await, 3);
        assert_eq!(fixture.registry().monitored().len(), 3);
    }
}
