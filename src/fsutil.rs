use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when reading the metadata of a path fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to stat `{path}`: {source}")]
pub struct MetadataError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use fleet_steward::fsutil;
/// let reader = fsutil::open_file_reader("/proc/uptime")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Returns the point in time since which `path` exists in its current form.
///
/// Uses the creation (birth) time where the filesystem exposes it and falls
/// back to the modification time otherwise.
///
/// # Errors
///
/// Returns a [`MetadataError`] if the path cannot be statted or exposes
/// neither timestamp.
pub fn ready_since(path: impl AsRef<Path>) -> Result<SystemTime, MetadataError> {
    let path = path.as_ref();
    let wrap = |source| MetadataError {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(wrap)?;

    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map_err(wrap)
}

/// Re-roots an absolute host path under `host_root`.
///
/// ```
/// # use std::path::{Path, PathBuf};
/// # use fleet_steward::fsutil::under_root;
/// assert_eq!(under_root("/rootfs", "/var/data"), PathBuf::from("/rootfs/var/data"));
/// assert_eq!(under_root("/", "/var/data"), PathBuf::from("/var/data"));
/// ```
pub fn under_root(host_root: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    host_root
        .as_ref()
        .join(path.strip_prefix("/").unwrap_or(path))
}
