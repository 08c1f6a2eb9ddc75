//! In-memory collaborators for unit tests.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::MonitoringOrchestrator;
use crate::auth::{ApiToken, Role, TokenVerifier, Verifier};
use crate::fsutil::FileOpenError;
use crate::monitor::{MonitorConfig, MonitoringRegistry};
use crate::runtime::{
    self, ContainerDetails, ContainerSummary, MountKind, MountPoint, RuntimeGateway, RuntimeStats,
};
use crate::stats::StatsCollector;
use crate::stats::measure::{self, UsageMeasurer};
use crate::workload::{self, ComponentSpec, WorkloadSpec, WorkloadSpecRegistry};

#[derive(Debug, Default)]
struct RuntimeState {
    containers: BTreeMap<String, ContainerDetails>,
    failing_restarts: HashSet<String>,
    unreachable: bool,
    calls: Vec<String>,
}

/// A container runtime whose containers live in a map.
#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub const NANO_CPUS: i64 = 1_500_000_000;
    pub const ROOTFS_SIZE: u64 = 4096;

    pub fn add_running(&self, name: &str, started_at: DateTime<Utc>, mounts: Vec<MountPoint>) {
        let details = ContainerDetails {
            id: format!("id-{name}"),
            name: format!("/{name}"),
            running: true,
            started_at: Some(started_at),
            mounts,
            nano_cpus: Some(Self::NANO_CPUS),
            size_root_fs: None,
        };
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(name.to_owned(), details);
    }

    pub fn add_stopped(&self, name: &str) {
        self.add_running(name, Utc::now(), Vec::new());
        if let Some(details) = self.state.lock().unwrap().containers.get_mut(name) {
            details.running = false;
        }
    }

    pub fn remove(&self, name: &str) {
        self.state.lock().unwrap().containers.remove(name);
    }

    pub fn fail_restart(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_restarts
            .insert(name.to_owned());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn enter(&self, call: String) -> runtime::Result<std::sync::MutexGuard<'_, RuntimeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.unreachable {
            return Err(runtime::Error::Request {
                request: call_name(&state.calls),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into(),
            });
        }
        Ok(state)
    }
}

fn call_name(calls: &[String]) -> String {
    calls.last().cloned().unwrap_or_default()
}

fn not_found(name: &str) -> runtime::Error {
    runtime::Error::NotFound {
        name: name.to_owned(),
    }
}

#[async_trait]
impl RuntimeGateway for FakeRuntime {
    async fn list_containers(&self, all: bool) -> runtime::Result<Vec<ContainerSummary>> {
        let state = self.enter(format!("list:{all}"))?;
        Ok(state
            .containers
            .iter()
            .filter(|(_, details)| all || details.is_running())
            .map(|(name, details)| ContainerSummary {
                id: details.id.clone(),
                names: vec![format!("/{name}")],
                state: if details.is_running() {
                    "running".to_owned()
                } else {
                    "exited".to_owned()
                },
            })
            .collect())
    }

    async fn inspect(&self, name: &str, size: bool) -> runtime::Result<ContainerDetails> {
        let state = self.enter(format!("inspect:{name}:{size}"))?;
        let mut details = state.containers.get(name).cloned().ok_or_else(|| not_found(name))?;
        if size {
            details.size_root_fs = Some(Self::ROOTFS_SIZE);
        }
        Ok(details)
    }

    async fn stats(&self, name: &str) -> runtime::Result<RuntimeStats> {
        let state = self.enter(format!("stats:{name}"))?;
        if !state.containers.contains_key(name) {
            return Err(not_found(name));
        }
        Ok(RuntimeStats {
            cpu_total_usage: 1_000,
            system_cpu_usage: 100_000,
            online_cpus: 2,
            memory_usage: 64 << 20,
            memory_limit: 1 << 30,
            network_rx_bytes: 10,
            network_tx_bytes: 20,
        })
    }

    async fn restart(&self, name: &str) -> runtime::Result<()> {
        let mut state = self.enter(format!("restart:{name}"))?;
        if state.failing_restarts.contains(name) {
            return Err(runtime::Error::Api {
                request: format!("/containers/{name}/restart"),
                status: 500,
                message: "restart failed".to_owned(),
            });
        }
        let details = state.containers.get_mut(name).ok_or_else(|| not_found(name))?;
        details.running = true;
        details.started_at = Some(Utc::now());
        Ok(())
    }
}

/// Measures paths from a fixed table; unknown paths fail.
#[derive(Debug, Default)]
pub(crate) struct FakeMeasurer {
    sizes: Mutex<HashMap<PathBuf, u64>>,
    measured: Mutex<Vec<PathBuf>>,
}

impl FakeMeasurer {
    pub fn set(&self, path: impl Into<PathBuf>, size: u64) {
        self.sizes.lock().unwrap().insert(path.into(), size);
    }

    pub fn measured(&self) -> Vec<PathBuf> {
        self.measured.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageMeasurer for FakeMeasurer {
    async fn measure(&self, path: &Path, _kind: &MountKind) -> measure::Result<u64> {
        self.measured.lock().unwrap().push(path.to_path_buf());
        self.sizes
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| measure::Error::Parse {
                path: path.to_path_buf(),
                output: String::new(),
            })
    }
}

/// Installed workload specs held in memory.
#[derive(Debug, Default)]
pub(crate) struct FakeSpecs {
    specs: Mutex<Vec<WorkloadSpec>>,
    unavailable: Mutex<bool>,
}

impl FakeSpecs {
    pub fn install(&self, spec: WorkloadSpec) {
        self.specs.lock().unwrap().push(spec);
    }

    /// Makes listing fail as if the spec file were missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl WorkloadSpecRegistry for FakeSpecs {
    async fn get_spec(&self, name: &str) -> workload::Result<Option<WorkloadSpec>> {
        Ok(self
            .specs
            .lock()
            .unwrap()
            .iter()
            .find(|spec| spec.name == name)
            .cloned())
    }

    async fn installed(&self) -> workload::Result<Vec<WorkloadSpec>> {
        if *self.unavailable.lock().unwrap() {
            return Err(workload::Error::FileOpen(FileOpenError {
                path: PathBuf::from("/etc/fleet-steward/workloads.json"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }));
        }
        Ok(self.specs.lock().unwrap().clone())
    }
}

/// A single-container workload.
pub(crate) fn single_spec(name: &str, owner: Option<&str>) -> WorkloadSpec {
    WorkloadSpec {
        name: name.to_owned(),
        version: 3,
        components: Vec::new(),
        owner: owner.map(str::to_owned),
    }
}

/// A composed workload with the given components.
pub(crate) fn composed_spec(name: &str, components: &[&str], owner: Option<&str>) -> WorkloadSpec {
    WorkloadSpec {
        name: name.to_owned(),
        version: 4,
        components: components
            .iter()
            .map(|component| ComponentSpec {
                name: (*component).to_owned(),
            })
            .collect(),
        owner: owner.map(str::to_owned),
    }
}

/// A façade over fake collaborators with three installed containers:
/// `polkadot` and the components `web_app1` and `db_app1`, all owned by
/// alice.
pub(crate) struct MonitoringFixture {
    pub specs: Arc<FakeSpecs>,
    pub orchestrator: Arc<MonitoringOrchestrator>,
}

impl MonitoringFixture {
    pub const ALICE: &'static str = "alice-token";
    pub const BOB: &'static str = "bob-token";
    pub const TEAM: &'static str = "team-token";

    pub fn new() -> Self {
        let runtime = Arc::new(FakeRuntime::default());
        for name in ["fluxpolkadot", "fluxweb_app1", "fluxdb_app1"] {
            runtime.add_running(name, Utc::now(), Vec::new());
        }
        let specs = Arc::new(FakeSpecs::default());
        specs.install(single_spec("polkadot", Some("alice")));
        specs.install(composed_spec("app1", &["web", "db"], Some("alice")));

        let gateway = Arc::clone(&runtime) as Arc<dyn RuntimeGateway>;
        let collector = StatsCollector::new(
            Arc::clone(&gateway),
            Arc::new(FakeMeasurer::default()) as Arc<dyn UsageMeasurer>,
            "/",
            "flux",
        );
        let registry = Arc::new(MonitoringRegistry::new(
            gateway,
            collector,
            MonitorConfig::default(),
        ));
        let tokens = [
            (Self::ALICE, "alice", Role::User),
            (Self::BOB, "bob", Role::User),
            (Self::TEAM, "ops", Role::Team),
        ]
        .map(|(token, principal, role)| ApiToken {
            token: token.to_owned(),
            principal: principal.to_owned(),
            role,
        });
        let verifier = TokenVerifier::new(tokens, Arc::clone(&specs) as Arc<dyn WorkloadSpecRegistry>);
        let orchestrator = Arc::new(MonitoringOrchestrator::new(
            registry,
            Arc::clone(&specs) as Arc<dyn WorkloadSpecRegistry>,
            Arc::new(verifier) as Arc<dyn Verifier>,
        ));

        Self {
            specs,
            orchestrator,
        }
    }

    pub fn registry(&self) -> &Arc<MonitoringRegistry> {
        self.orchestrator.registry()
    }
}
