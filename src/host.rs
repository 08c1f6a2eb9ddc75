//! Uptime of the host OS and of this process.
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid uptime in `{path}`: {content:?}")]
    Parse { path: PathBuf, content: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Source of the two uptimes compared by OS-restart detection.
pub trait UptimeSource: Send + Sync {
    /// Time since the host OS booted.
    fn os_uptime(&self) -> Result<Duration>;

    /// Time since this node process started.
    fn process_uptime(&self) -> Duration;
}

/// Reads the OS uptime from `<host_root>/proc/uptime`.
#[derive(Debug, Clone)]
pub struct HostUptime {
    proc_uptime: PathBuf,
    started: Instant,
}

impl HostUptime {
    /// Creates an uptime source whose process uptime counts from now.
    pub fn new(host_root: impl AsRef<Path>) -> Self {
        Self::with_start(host_root, Instant::now())
    }

    pub fn with_start(host_root: impl AsRef<Path>, started: Instant) -> Self {
        Self {
            proc_uptime: fsutil::under_root(host_root, "/proc/uptime"),
            started,
        }
    }
}

impl UptimeSource for HostUptime {
    fn os_uptime(&self) -> Result<Duration> {
        let mut reader = fsutil::open_file_reader(&self.proc_uptime)?;
        let mut line = String::with_capacity(64);
        reader.read_line(&mut line).map_err(|source| Error::Read {
            path: self.proc_uptime.clone(),
            source,
        })?;

        parse_uptime(&line).ok_or_else(|| Error::Parse {
            path: self.proc_uptime.clone(),
            content: line.trim().to_owned(),
        })
    }

    fn process_uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Parses the first field of `/proc/uptime`, e.g. `"350735.47 234388.90"`.
fn parse_uptime(line: &str) -> Option<Duration> {
    line.split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
