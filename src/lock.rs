//! Single-instance lock file.
//!
//! The file holds the owner's PID. A lock older than the grace period is
//! considered left behind by a crashed run and is taken over. The guard
//! removes the file when dropped, on success and error paths alike.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::config::LockOptions;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Take the lock at `path`, or fail with [`Error::Locked`] when a lock
    /// younger than `grace` exists.
    pub fn acquire(path: &Path, grace: Duration) -> Result<LockGuard> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match std::fs::metadata(path) {
            Ok(meta) => {
                let modified = meta.modified()?;
                let age = SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or(Duration::ZERO);
                if age < grace {
                    return Err(Error::Locked(path.to_path_buf()));
                }
                let since: DateTime<Local> = modified.into();
                warn!(
                    "taking over stale lock file {} (last touched {})",
                    path.display(),
                    since.format("%Y-%m-%d %H:%M:%S")
                );
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // create_new: a concurrent run that got here first wins.
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Locked(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        write!(file, "{}", std::process::id())?;
        debug!("lock file is {}", path.display());

        Ok(LockGuard {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("cannot remove lock file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Acquire per `options`; `None` when the lock is ignored.
pub fn acquire(options: &LockOptions) -> Result<Option<LockGuard>> {
    if options.ignore {
        debug!("lock file is ignored, continuing");
        return Ok(None);
    }
    LockGuard::acquire(&options.path, options.grace).map(Some)
}
