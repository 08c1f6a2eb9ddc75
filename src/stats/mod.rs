//! Per-container resource sampling.
//!
//! A [`StatsCollector`] turns one runtime stats snapshot plus a storage walk
//! of the container's mounts into a [`ResourceSample`].
//!
//! Two kinds of samples exist:
//!
//! - regular samples inspect the container cheaply, only to discover its
//!   mounts;
//! - full samples ask the runtime for the size of the container's root
//!   filesystem as well and record the configured CPU quota.
//!
//! Storage accounting is best effort: a mount that cannot be measured counts
//! as zero and never fails the sample.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod measure;

pub use measure::{DuMeasurer, UsageMeasurer};

use crate::error::ResultOkLogExt;
use crate::runtime::{self, MountKind, RuntimeGateway};
use crate::workload::ContainerIdentity;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("container `{identity}` no longer exists")]
    ContainerGone { identity: ContainerIdentity },
    #[error("failed to sample container `{identity}`: {source}")]
    Runtime {
        identity: ContainerIdentity,
        #[source]
        source: runtime::Error,
    },
}

impl Error {
    fn from_runtime(identity: &ContainerIdentity, source: runtime::Error) -> Self {
        if source.is_not_found() {
            Error::ContainerGone {
                identity: identity.clone(),
            }
        } else {
            Error::Runtime {
                identity: identity.clone(),
                source,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CpuUsage {
    pub total_usage: u64,
    pub system_usage: u64,
    pub online_cpus: u32,
    /// Configured CPU limit in billionths of a CPU; only on full samples.
    pub nano_cpus: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MemoryUsage {
    pub usage: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct NetworkUsage {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Storage footprint in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DiskUsage {
    pub bind: u64,
    pub volume: u64,
    /// Root filesystem size. Only full samples measure it; the registry
    /// carries the last measured value into regular samples.
    pub rootfs: u64,
    pub used: u64,
}

impl DiskUsage {
    /// Replaces the root filesystem size and updates `used` to match.
    pub fn set_rootfs(&mut self, rootfs: u64) {
        self.rootfs = rootfs;
        self.recompute_used();
    }

    fn recompute_used(&mut self) {
        self.used = self.bind + self.volume + self.rootfs;
    }
}

/// One immutable resource usage observation of a container.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResourceSample {
    /// UNIX epoch milliseconds.
    pub timestamp: u64,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub network: NetworkUsage,
    pub disk: DiskUsage,
}

/// Current wall clock time in UNIX epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Samples resource usage of containers through the runtime.
pub struct StatsCollector {
    runtime: Arc<dyn RuntimeGateway>,
    measurer: Arc<dyn UsageMeasurer>,
    host_root: PathBuf,
    prefix: String,
}

impl StatsCollector {
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        measurer: Arc<dyn UsageMeasurer>,
        host_root: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            measurer,
            host_root: host_root.into(),
            prefix: prefix.into(),
        }
    }

    /// Prefix of the runtime names of node-managed containers.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Takes one sample of `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerGone`] if the runtime no longer knows the
    /// container and [`Error::Runtime`] for any other runtime failure.
    pub async fn sample(&self, identity: &ContainerIdentity, full: bool) -> Result<ResourceSample> {
        let name = identity.runtime_name(&self.prefix);
        let stats = self
            .runtime
            .stats(&name)
            .await
            .map_err(|err| Error::from_runtime(identity, err))?;
        let details = self
            .runtime
            .inspect(&name, full)
            .await
            .map_err(|err| Error::from_runtime(identity, err))?;

        let mut disk = DiskUsage::default();
        for mount in &details.mounts {
            let counter = match mount.kind {
                MountKind::Bind => &mut disk.bind,
                MountKind::Volume => &mut disk.volume,
                MountKind::Unsupported => {
                    log::debug!(
                        "skipping unsupported mount `{}` of `{}`",
                        mount.destination.display(),
                        identity
                    );
                    continue;
                }
            };
            let path = mount.host_path(&self.host_root);
            let measured = self.measurer.measure(&path, &mount.kind).await;
            *counter += measured
                .ok_log(format_args!("storage of `{}` counted as zero", identity))
                .unwrap_or(0);
        }

        let nano_cpus = if full {
            disk.rootfs = details.size_root_fs.unwrap_or(0);
            details
                .nano_cpus
                .filter(|nano_cpus| *nano_cpus > 0)
        } else {
            None
        };
        disk.recompute_used();

        Ok(ResourceSample {
            timestamp: now_millis(),
            cpu: CpuUsage {
                total_usage: stats.cpu_total_usage,
                system_usage: stats.system_cpu_usage,
                online_cpus: stats.online_cpus,
                nano_cpus,
            },
            memory: MemoryUsage {
                usage: stats.memory_usage,
                limit: stats.memory_limit,
            },
            network: NetworkUsage {
                rx_bytes: stats.network_rx_bytes,
                tx_bytes: stats.network_tx_bytes,
            },
            disk,
        })
    }
}
