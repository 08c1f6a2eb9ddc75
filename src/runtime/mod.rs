//! Boundary to the container runtime.
//!
//! The rest of the crate only talks to the runtime through
//! [`RuntimeGateway`] and the views defined here. [`DockerGateway`]
//! implements it on top of `bollard`.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, MountPointTypeEnum};
use chrono::{DateTime, Utc};

mod docker;

pub use docker::DockerGateway;

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such container `{name}`")]
    NotFound { name: String },
    #[error("failed to set up runtime client for `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("container runtime request `{request}` failed with {status}: {message}")]
    Api {
        request: String,
        status: u16,
        message: String,
    },
    #[error("container runtime request `{request}` failed: {source}")]
    Request {
        request: String,
        #[source]
        source: bollard::errors::Error,
    },
}

impl Error {
    /// Whether the runtime definitively reported the container as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Primitives the node consumes from the container runtime.
///
/// Containers are addressed by their runtime name.
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// Lists containers; running ones only unless `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Inspects a container. With `size` set the runtime also computes the
    /// size of the container's root filesystem, which is expensive.
    async fn inspect(&self, name: &str, size: bool) -> Result<ContainerDetails>;

    /// Returns a one-shot snapshot of the container's resource counters.
    async fn stats(&self, name: &str) -> Result<RuntimeStats>;

    async fn restart(&self, name: &str) -> Result<()>;
}

/// A container as reported by a runtime listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

impl From<bollard::models::ContainerSummary> for ContainerSummary {
    fn from(value: bollard::models::ContainerSummary) -> Self {
        Self {
            id: value.id.unwrap_or_default(),
            names: value.names.unwrap_or_default(),
            state: value.state.unwrap_or_default(),
        }
    }
}

/// Kind of a container mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    Volume,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub kind: MountKind,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl MountPoint {
    /// Where the data backing this mount lives, as seen from this process.
    ///
    /// Runtimes report bind and volume sources as host paths, so both are
    /// re-rooted under `host_root`.
    pub fn host_path(&self, host_root: &Path) -> PathBuf {
        match self.kind {
            MountKind::Bind | MountKind::Volume => fsutil::under_root(host_root, &self.source),
            MountKind::Unsupported => self.source.clone(),
        }
    }
}

impl From<&bollard::models::MountPoint> for MountPoint {
    fn from(value: &bollard::models::MountPoint) -> Self {
        let kind = match value.typ {
            Some(MountPointTypeEnum::BIND) => MountKind::Bind,
            Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
            _ => MountKind::Unsupported,
        };
        Self {
            kind,
            source: value.source.as_deref().map(PathBuf::from).unwrap_or_default(),
            destination: value
                .destination
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_default(),
        }
    }
}

/// Read-only view of an inspected container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub running: bool,
    /// Start time of the current run; `None` if the container never started.
    pub started_at: Option<DateTime<Utc>>,
    pub mounts: Vec<MountPoint>,
    /// Configured CPU limit in billionths of a CPU.
    pub nano_cpus: Option<i64>,
    /// Only reported when inspected with `size`.
    pub size_root_fs: Option<u64>,
}

impl ContainerDetails {
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Parses a runtime start timestamp. Never-started containers report the
/// zero time, which maps to `None`.
fn parse_started_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|started_at| started_at.with_timezone(&Utc))
        .filter(|started_at| started_at.timestamp() > 0)
}

impl From<ContainerInspectResponse> for ContainerDetails {
    fn from(value: ContainerInspectResponse) -> Self {
        let state = value.state.unwrap_or_default();
        Self {
            id: value.id.unwrap_or_default(),
            name: value.name.unwrap_or_default(),
            running: state.running.unwrap_or(false),
            started_at: state.started_at.as_deref().and_then(parse_started_at),
            mounts: value
                .mounts
                .unwrap_or_default()
                .iter()
                .map(MountPoint::from)
                .collect(),
            nano_cpus: value.host_config.and_then(|host_config| host_config.nano_cpus),
            size_root_fs: value
                .size_root_fs
                .and_then(|size| u64::try_from(size).ok()),
        }
    }
}

/// Resource counters of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub cpu_total_usage: u64,
    pub system_cpu_usage: u64,
    pub online_cpus: u32,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}
