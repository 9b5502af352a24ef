//! Advisory file lock giving a processing pass exclusive use of the store.
//!
//! One pass runs to completion before another may start. The lock is a
//! plain file created with `create_new` semantics; a second invocation that
//! finds it held exits early with a busy status and performs no mutation.
//! Locks older than the stale horizon are treated as leftovers from a
//! crashed pass and taken over.

use crate::core::error::InstinctError;
use crate::core::time;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = "observe.lock";

/// Seconds after which a held lock is considered abandoned.
const STALE_AFTER_SECS: i64 = 15 * 60;

pub struct PassLock {
    path: PathBuf,
}

impl PassLock {
    /// Acquire the pass lock under `root`, or fail with `Busy`.
    pub fn acquire(root: &Path) -> Result<Self, InstinctError> {
        let path = root.join(LOCK_FILE_NAME);

        if let Ok(raw) = fs::read_to_string(&path) {
            let held_since: i64 = raw.trim().trim_end_matches('Z').parse().unwrap_or(0);
            if time::epoch_secs() - held_since < STALE_AFTER_SECS {
                return Err(InstinctError::Busy(format!(
                    "lock held since {} at {}",
                    raw.trim(),
                    path.display()
                )));
            }
            // Stale lock from a crashed pass; reclaim it.
            fs::remove_file(&path).map_err(InstinctError::IoError)?;
        }

        let mut f = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    InstinctError::Busy(format!("lock contested at {}", path.display()))
                } else {
                    InstinctError::IoError(e)
                }
            })?;
        writeln!(f, "{}", time::now_epoch_z()).map_err(InstinctError::IoError)?;

        Ok(Self { path })
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
