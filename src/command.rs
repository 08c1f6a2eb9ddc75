//! Exclusive execution of external commands.
//!
//! Every command is keyed by its full command line. Two callers running the
//! same command line are serialized, so e.g. two storage measurements of the
//! same path never overlap.
use std::process::Output;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Named locks keyed by command line.
#[derive(Debug, Default)]
pub struct CommandLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CommandLocks {
    /// Acquires the lock for `key`, waiting for any holder to release it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }

    /// Runs `program` with `args` while holding the lock for that command line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the program cannot be started and
    /// [`Error::Failed`] if it exits unsuccessfully.
    pub async fn run_exclusive(&self, program: &str, args: &[&str]) -> Result<Output> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let guard = self.lock(&command).await;
        let result = Self::run(program, args, command.clone()).await;
        drop(guard);
        self.release(&command);
        result
    }

    /// Forgets the lock for `key` once nobody holds or awaits it.
    fn release(&self, key: &str) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn run(program: &str, args: &[&str], command: String) -> Result<Output> {
        log::trace!("running `{}`", command);

        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(output)
    }
}
