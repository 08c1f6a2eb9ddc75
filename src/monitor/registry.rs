use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::MissedTickBehavior;

use crate::runtime::{self, RuntimeGateway};
use crate::stats::{self, ResourceSample, StatsCollector};
use crate::workload::ContainerIdentity;

use super::entry::{MonitoredEntry, TaskHandle};

/// Scheduling and retention settings of the registry.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between two samples of the same container.
    pub tick_interval: Duration,
    /// Every n-th tick takes a full sample and feeds the long-term store.
    pub full_sample_every: u64,
    pub stats_retention: Duration,
    pub last_hour_retention: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            full_sample_every: 3,
            stats_retention: Duration::from_secs(7 * 24 * 60 * 60),
            last_hour_retention: Duration::from_secs(60 * 60),
        }
    }
}

/// Copy of the sampling history of one container.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSnapshot {
    pub stats_store: Vec<ResourceSample>,
    pub last_hour_store: Vec<ResourceSample>,
}

/// Owns every container under observation and its sampling task.
///
/// Each entry is only ever mutated under its map shard lock and never across
/// an await, so ticks of different containers run independently.
pub struct MonitoringRegistry {
    entries: DashMap<ContainerIdentity, MonitoredEntry>,
    runtime: Arc<dyn RuntimeGateway>,
    collector: StatsCollector,
    config: MonitorConfig,
    generations: AtomicU64,
}

impl MonitoringRegistry {
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        collector: StatsCollector,
        config: MonitorConfig,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            runtime,
            collector,
            config,
            generations: AtomicU64::new(0),
        }
    }

    /// Starts (or restarts) periodic sampling of `identity`.
    ///
    /// Any task already scheduled for the identity is aborted, retained
    /// history is kept and the tick counter starts over.
    pub fn start_monitoring(self: &Arc<Self>, identity: &ContainerIdentity) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let task = self.spawn_ticker(identity.clone(), generation);

        let mut entry = self.entries.entry(identity.clone()).or_insert_with(|| {
            MonitoredEntry::new(self.config.stats_retention, self.config.last_hour_retention)
        });
        entry.run_count = 0;
        entry.generation = generation;
        entry.task = Some(task);
        log::info!("Monitoring of `{}` started", identity);
    }

    /// Stops sampling `identity`.
    ///
    /// With `delete_data` the entry and its history are dropped, otherwise the
    /// history is kept for a later [`start_monitoring`](Self::start_monitoring).
    /// Returns whether the identity had an entry.
    pub fn stop_monitoring(&self, identity: &ContainerIdentity, delete_data: bool) -> bool {
        let existed = if delete_data {
            self.entries.remove(identity).is_some()
        } else {
            self.entries
                .get_mut(identity)
                .map(|mut entry| entry.task.take())
                .is_some()
        };
        if existed {
            log::info!(
                "Monitoring of `{}` stopped (data {})",
                identity,
                if delete_data { "deleted" } else { "kept" }
            );
        }
        existed
    }

    /// Restarts the container behind `identity`, pausing its monitoring
    /// around the restart.
    ///
    /// Monitoring resumes even when the restart fails.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error if the restart failed.
    pub async fn restart_container(self: &Arc<Self>, identity: &ContainerIdentity) -> runtime::Result<()> {
        self.stop_monitoring(identity, false);
        let result = self
            .runtime
            .restart(&identity.runtime_name(self.collector.prefix()))
            .await;
        self.start_monitoring(identity);
        result
    }

    /// Returns the retained history of `identity`, pruned to the retention
    /// windows at the current time.
    pub fn snapshot(&self, identity: &ContainerIdentity) -> Option<MonitoringSnapshot> {
        let now = stats::now_millis();
        self.entries.get_mut(identity).map(|mut entry| {
            entry.stats_store.prune(now);
            entry.last_hour_store.prune(now);
            MonitoringSnapshot {
                stats_store: entry.stats_store.to_vec(),
                last_hour_store: entry.last_hour_store.to_vec(),
            }
        })
    }

    /// Whether `identity` has an entry, scheduled or not.
    pub fn contains(&self, identity: &ContainerIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn is_monitored(&self, identity: &ContainerIdentity) -> bool {
        self.entries
            .get(identity)
            .is_some_and(|entry| entry.is_scheduled())
    }

    /// Identities with an active sampling task, sorted.
    pub fn monitored(&self) -> Vec<ContainerIdentity> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.is_scheduled())
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        out
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    fn spawn_ticker(self: &Arc<Self>, identity: ContainerIdentity, generation: u64) -> TaskHandle {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.config.tick_interval;
        TaskHandle::new(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if !registry.tick(&identity, generation).await {
                    break;
                }
            }
        }))
    }

    /// Runs one sampling tick. Returns whether the task should keep going.
    ///
    /// Regular samples report the rootfs size of the latest full sample, or
    /// zero before the first one.
    async fn tick(&self, identity: &ContainerIdentity, generation: u64) -> bool {
        let full = {
            let Some(mut entry) = self.entries.get_mut(identity) else {
                log::debug!("entry of `{}` removed, cancelling its task", identity);
                return false;
            };
            if entry.generation != generation {
                return false;
            }
            entry.run_count += 1;
            entry.run_count % self.config.full_sample_every.max(1) == 0
        };

        match self.collector.sample(identity, full).await {
            Ok(mut sample) => {
                let Some(mut entry) = self.entries.get_mut(identity) else {
                    return false;
                };
                if entry.generation != generation {
                    return false;
                }
                if full {
                    entry.last_rootfs = Some(sample.disk.rootfs);
                    entry.stats_store.push(sample.clone());
                } else if let Some(rootfs) = entry.last_rootfs {
                    sample.disk.set_rootfs(rootfs);
                }
                entry.last_hour_store.push(sample);
                true
            }
            Err(stats::Error::ContainerGone { .. }) => {
                log::warn!(
                    "container `{}` no longer exists, dropping its monitoring data",
                    identity
                );
                self.entries
                    .remove_if(identity, |_, entry| entry.generation == generation);
                false
            }
            Err(err) => {
                log::error!("{}", err);
                true
            }
        }
    }
}
