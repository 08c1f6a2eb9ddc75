use std::collections::VecDeque;
use std::time::Duration;

use crate::stats::ResourceSample;

/// Time-ordered samples bounded by age.
#[derive(Debug, Clone)]
pub struct SampleStore {
    samples: VecDeque<ResourceSample>,
    retention: Duration,
}

impl SampleStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            retention,
        }
    }

    /// Appends `sample` and drops everything older than the retention window
    /// relative to the new sample.
    pub fn push(&mut self, sample: ResourceSample) {
        let now = sample.timestamp;
        self.samples.push_back(sample);
        self.prune(now);
    }

    /// Drops samples older than the retention window relative to `now`
    /// (UNIX epoch milliseconds).
    pub fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.retention.as_millis() as u64);
        while self
            .samples
            .front()
            .is_some_and(|sample| sample.timestamp < cutoff)
        {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ResourceSample> {
        self.samples.iter().cloned().collect()
    }
}

/// Handle of an entry's repeating sampling task; aborts the task when dropped.
#[derive(Debug)]
pub(super) struct TaskHandle(tokio::task::JoinHandle<()>);

impl TaskHandle {
    pub fn new(handle: tokio::task::JoinHandle<()>) -> Self {
        Self(handle)
    }

    pub fn is_active(&self) -> bool {
        !self.0.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Sampling history and scheduling state of one container identity.
#[derive(Debug)]
pub struct MonitoredEntry {
    pub(super) stats_store: SampleStore,
    pub(super) last_hour_store: SampleStore,
    pub(super) run_count: u64,
    pub(super) generation: u64,
    pub(super) task: Option<TaskHandle>,
    /// Root filesystem size of the latest full sample.
    pub(super) last_rootfs: Option<u64>,
}

impl MonitoredEntry {
    pub(super) fn new(stats_retention: Duration, last_hour_retention: Duration) -> Self {
        Self {
            stats_store: SampleStore::new(stats_retention),
            last_hour_store: SampleStore::new(last_hour_retention),
            run_count: 0,
            generation: 0,
            task: None,
            last_rootfs: None,
        }
    }

    pub fn stats_store(&self) -> &SampleStore {
        &self.stats_store
    }

    pub fn last_hour_store(&self) -> &SampleStore {
        &self.last_hour_store
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Whether a sampling task is scheduled for this entry.
    pub fn is_scheduled(&self) -> bool {
        self.task.as_ref().is_some_and(TaskHandle::is_active)
    }
}
