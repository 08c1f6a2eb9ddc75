use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{self, CommandLocks};
use crate::runtime::MountKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to measure `{path}`: {source}")]
    Command {
        path: PathBuf,
        #[source]
        source: command::Error,
    },
    #[error("unexpected size output for `{path}`: {output:?}")]
    Parse { path: PathBuf, output: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Measures the disk usage of the data behind a mount.
#[async_trait]
pub trait UsageMeasurer: Send + Sync {
    /// Returns the recursive size in bytes of everything below `path`.
    async fn measure(&self, path: &Path, kind: &MountKind) -> Result<u64>;
}

/// Measures disk usage with `du -sb`, one run per path at a time.
#[derive(Debug, Clone)]
pub struct DuMeasurer {
    locks: Arc<CommandLocks>,
}

impl DuMeasurer {
    pub fn new(locks: Arc<CommandLocks>) -> Self {
        Self { locks }
    }
}

#[async_trait]
impl UsageMeasurer for DuMeasurer {
    async fn measure(&self, path: &Path, _kind: &MountKind) -> Result<u64> {
        let path_str = path.to_string_lossy();
        let output = self
            .locks
            .run_exclusive("du", &["-sb", &*path_str])
            .await
            .map_err(|source| Error::Command {
                path: path.to_path_buf(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_du_output(&stdout).ok_or_else(|| Error::Parse {
            path: path.to_path_buf(),
            output: stdout.trim().to_owned(),
        })
    }
}

/// Parses the byte count from `du -sb` output (`<bytes>\t<path>`).
fn parse_du_output(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}
