use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::fsutil;
use crate::runtime::{MountKind, RuntimeGateway};
use crate::workload::ContainerIdentity;

/// Detects containers that started before the storage behind their mounts
/// was in place, e.g. after the daemon raced a late filesystem mount at boot.
pub struct MountDriftDetector {
    runtime: Arc<dyn RuntimeGateway>,
    host_root: PathBuf,
    prefix: String,
}

impl MountDriftDetector {
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        host_root: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            host_root: host_root.into(),
            prefix: prefix.into(),
        }
    }

    /// Whether the running container `identity` started before any of its
    /// mounts became ready.
    ///
    /// Failures to reach or inspect the container yield `false`. A mount that
    /// cannot be statted while the container runs yields `true`: the
    /// container is then most likely looking at the wrong filesystem.
    pub async fn started_before_mounts(&self, identity: &ContainerIdentity) -> bool {
        let details = match self
            .runtime
            .inspect(&identity.runtime_name(&self.prefix), false)
            .await
        {
            Ok(details) => details,
            Err(err) => {
                log::warn!("mount check of `{}` skipped: {}", identity, err);
                return false;
            }
        };
        if !details.is_running() || details.mounts.is_empty() {
            return false;
        }
        let Some(started_at) = details.started_at else {
            log::debug!("`{}` reports no start time", identity);
            return false;
        };
        let started_at = SystemTime::from(started_at);

        for mount in &details.mounts {
            if mount.kind == MountKind::Unsupported {
                continue;
            }
            let path = mount.host_path(&self.host_root);
            match fsutil::ready_since(&path) {
                Ok(ready_since) if started_at < ready_since => {
                    log::info!(
                        "`{}` started before its mount `{}` was ready",
                        identity,
                        path.display()
                    );
                    return true;
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("{}; treating `{}` as started too early", err, identity);
                    return true;
                }
            }
        }
        false
    }
}
