//! Registry of monitored containers.
//!
//! Every container identity under observation owns a [`MonitoredEntry`]
//! holding two bounded sample histories and at most one repeating sampling
//! task. A short-term store receives every sample; the long-term store only
//! receives full samples.
mod entry;
mod registry;

pub use entry::{MonitoredEntry, SampleStore};
pub use registry::{MonitorConfig, MonitoringRegistry, MonitoringSnapshot};
