//! Crash-safe publishing of snapshots.
//!
//! A snapshot is written to `<file>.swp` next to the output file, flushed to
//! disk, then renamed over the output file. The rename stays on one
//! filesystem, so readers see either the old or the new file, never a partial
//! one. Any failure leaves the existing output file untouched.
//!
//! Only one process may publish to a given path; there is no file locking.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::PublishError;
use crate::state::PublishedSnapshot;

/// Suffix of the temporary file written before the rename.
pub const TEMP_SUFFIX: &str = ".swp";

/// Persists snapshots.
pub trait Publisher: Send + Sync + 'static {
    /// Writes `snapshot` to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the snapshot is not in place. The previous
    /// content of `path` must then be unchanged.
    fn publish(&self, path: &Path, snapshot: &PublishedSnapshot) -> Result<(), PublishError>;
}

/// [`Publisher`] writing YAML files with write-to-temp and rename.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilePublisher;

impl Publisher for FilePublisher {
    fn publish(&self, path: &Path, snapshot: &PublishedSnapshot) -> Result<(), PublishError> {
        publish(path, snapshot)
    }
}

/// Serializes `snapshot` and atomically replaces `path` with it.
///
/// # Errors
///
/// Returns [`PublishError`] on serialization, write or rename failure.
pub fn publish(path: &Path, snapshot: &PublishedSnapshot) -> Result<(), PublishError> {
    let data = snapshot.to_yaml()?;
    write_atomic(path, data.as_bytes())
}

/// Sibling temporary path used while publishing `path`.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PublishError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    fs::create_dir_all(parent).map_err(|source| PublishError::Write {
        path: parent.to_path_buf(),
        source,
    })?;

    let tmp = temp_path(path);

    if let Err(source) = write_synced(&tmp, data) {
        let _ = fs::remove_file(&tmp);
        return Err(PublishError::Write { path: tmp, source });
    }

    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(PublishError::Rename {
            from: tmp,
            to: path.to_path_buf(),
            source,
        });
    }

    // The rename is only durable once the directory entry is flushed
    sync_dir(parent).map_err(|source| PublishError::Sync {
        path: parent.to_path_buf(),
        source,
    })
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
