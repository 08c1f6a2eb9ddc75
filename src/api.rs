//! Monitoring façade and its HTTP surface.
//!
//! [`MonitoringOrchestrator`] maps start/stop/snapshot requests onto the
//! [`MonitoringRegistry`]. A request either names no target, meaning every
//! installed workload, or names a workload or a single component of one
//! (`component_workload`). Authorization is delegated to a [`Verifier`]:
//!
//! - the no-target form requires [`Tier::AdminOrTeam`];
//! - a named target requires [`Tier::OwnerOrAbove`] for its workload.
//!
//! Every operation answers with an [`Envelope`], which the HTTP handlers
//! return as is and internal callers can inspect.
use std::fmt;
use std::sync::Arc;

mod http;
mod models;

pub use http::{ApiServer, router};
pub use models::{Envelope, ErrorKind, Status};

use crate::auth::{Caller, Tier, Verifier};
use crate::monitor::MonitoringRegistry;
use crate::workload::{self, ContainerIdentity, WorkloadSpec, WorkloadSpecRegistry};

/// What a named request operates on.
enum Target {
    Workload(WorkloadSpec),
    Component {
        spec: WorkloadSpec,
        identity: ContainerIdentity,
    },
}

impl Target {
    fn spec(&self) -> &WorkloadSpec {
        match self {
            Target::Workload(spec) | Target::Component { spec, .. } => spec,
        }
    }

    fn identities(&self) -> Vec<ContainerIdentity> {
        match self {
            Target::Workload(spec) => workload::resolve(spec),
            Target::Component { identity, .. } => vec![identity.clone()],
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Workload(spec) => f.write_str(&spec.name),
            Target::Component { identity, .. } => write!(f, "{identity}"),
        }
    }
}

fn internal(err: impl fmt::Display) -> Envelope {
    log::error!("{}", err);
    Envelope::error(ErrorKind::Internal, err.to_string())
}

fn parse_identity(raw: &str) -> Result<ContainerIdentity, Envelope> {
    ContainerIdentity::new(raw).map_err(|err| Envelope::error(ErrorKind::BadRequest, err.to_string()))
}

pub struct MonitoringOrchestrator {
    registry: Arc<MonitoringRegistry>,
    specs: Arc<dyn WorkloadSpecRegistry>,
    verifier: Arc<dyn Verifier>,
}

impl MonitoringOrchestrator {
    pub fn new(
        registry: Arc<MonitoringRegistry>,
        specs: Arc<dyn WorkloadSpecRegistry>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self {
            registry,
            specs,
            verifier,
        }
    }

    pub fn registry(&self) -> &Arc<MonitoringRegistry> {
        &self.registry
    }

    /// Starts monitoring `target`, or every installed workload.
    ///
    /// The containers of the target are stopped before they are started
    /// again, so no stale task survives a re-start.
    pub async fn start_monitoring(&self, caller: &Caller, target: Option<&str>) -> Envelope {
        let Some(raw) = target else {
            if !self.verifier.verify(Tier::AdminOrTeam, caller, None).await {
                return Envelope::unauthorized();
            }
            return match self.monitor_installed().await {
                Ok(identities) => Envelope::message(format!(
                    "Monitoring started for {} containers",
                    identities.len()
                )),
                Err(err) => internal(err),
            };
        };

        let target = match self.authorize(caller, raw).await {
            Ok(target) => target,
            Err(envelope) => return envelope,
        };
        for identity in target.identities() {
            self.registry.stop_monitoring(&identity, false);
            self.registry.start_monitoring(&identity);
        }
        Envelope::message(format!("Monitoring started for {target}"))
    }

    /// Stops monitoring `target`, or every installed workload, dropping the
    /// collected history if `delete_data` is set.
    pub async fn stop_monitoring(
        &self,
        caller: &Caller,
        target: Option<&str>,
        delete_data: bool,
    ) -> Envelope {
        let Some(raw) = target else {
            if !self.verifier.verify(Tier::AdminOrTeam, caller, None).await {
                return Envelope::unauthorized();
            }
            return match self.unmonitor_installed(delete_data).await {
                Ok(identities) => Envelope::message(format!(
                    "Monitoring stopped for {} containers",
                    identities.len()
                )),
                Err(err) => internal(err),
            };
        };

        let target = match self.authorize(caller, raw).await {
            Ok(target) => target,
            Err(envelope) => return envelope,
        };
        for identity in target.identities() {
            self.registry.stop_monitoring(&identity, delete_data);
        }
        if delete_data {
            Envelope::message(format!("Monitoring stopped for {target}. Monitoring data deleted"))
        } else {
            Envelope::message(format!("Monitoring stopped for {target}. Monitoring data kept"))
        }
    }

    /// Returns the collected history of one container.
    pub async fn monitoring_snapshot(&self, caller: &Caller, raw: &str) -> Envelope {
        if let Err(envelope) = self.authorize(caller, raw).await {
            return envelope;
        }
        let identity = match parse_identity(raw) {
            Ok(identity) => identity,
            Err(envelope) => return envelope,
        };
        match self.registry.snapshot(&identity) {
            Some(snapshot) => Envelope::success(snapshot),
            None => Envelope::error(ErrorKind::NotFound, format!("`{raw}` is not monitored")),
        }
    }

    /// Starts monitoring every container of every installed workload.
    ///
    /// # Errors
    ///
    /// Returns an error if the installed workloads cannot be listed.
    pub async fn monitor_installed(&self) -> workload::Result<Vec<ContainerIdentity>> {
        let identities = self.installed_identities().await?;
        for identity in &identities {
            self.registry.stop_monitoring(identity, false);
            self.registry.start_monitoring(identity);
        }
        log::info!("Monitoring {} installed containers", identities.len());
        Ok(identities)
    }

    /// Stops monitoring every container of every installed workload.
    ///
    /// # Errors
    ///
    /// Returns an error if the installed workloads cannot be listed.
    pub async fn unmonitor_installed(&self, delete_data: bool) -> workload::Result<Vec<ContainerIdentity>> {
        let identities = self.installed_identities().await?;
        for identity in &identities {
            self.registry.stop_monitoring(identity, delete_data);
        }
        Ok(identities)
    }

    async fn installed_identities(&self) -> workload::Result<Vec<ContainerIdentity>> {
        Ok(self
            .specs
            .installed()
            .await?
            .iter()
            .flat_map(workload::resolve)
            .collect())
    }

    /// Locates `raw` and checks that `caller` may operate on its workload.
    ///
    /// Unknown targets are only reported as such to callers that would be
    /// allowed to see them.
    async fn authorize(&self, caller: &Caller, raw: &str) -> Result<Target, Envelope> {
        let identity = parse_identity(raw)?;
        let located = self.locate(&identity).await.map_err(internal)?;
        let workload = located
            .as_ref()
            .map_or(identity.workload(), |target| target.spec().name.as_str());
        if !self
            .verifier
            .verify(Tier::OwnerOrAbove, caller, Some(workload))
            .await
        {
            return Err(Envelope::unauthorized());
        }
        located.ok_or_else(|| {
            Envelope::error(ErrorKind::NotFound, format!("`{raw}` is not installed"))
        })
    }

    async fn locate(&self, identity: &ContainerIdentity) -> workload::Result<Option<Target>> {
        if let Some(spec) = self.specs.get_spec(identity.as_str()).await? {
            return Ok(Some(Target::Workload(spec)));
        }
        let Some((_, workload)) = identity.split() else {
            return Ok(None);
        };
        let Some(spec) = self.specs.get_spec(workload).await? else {
            return Ok(None);
        };
        if workload::resolve(&spec).contains(identity) {
            Ok(Some(Target::Component {
                spec,
                identity: identity.clone(),
            }))
        } else {
            Ok(None)
        }
    }
}
