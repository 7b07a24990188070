//! File locking and atomic writes for the local task store
//!
//! The local backend keeps its whole collection in one file, so every
//! read-modify-write must hold an exclusive lock on `<file>.lock`:
//! - Advisory lock via fs2/flock, retried until a timeout
//! - Writes go to a temp file that is renamed over the target
//! - The lock is released when the guard drops

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

const LOCK_RETRY_INTERVAL_MS: u64 = 25;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // Windows reports sharing/lock violations as raw OS errors 32 and 33.
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Path of the lock file guarding `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", path.display()))
}

/// Exclusive lock guard over a data file's sidecar lock file.
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Lock the sidecar of `data_path`, waiting up to `timeout_ms`.
    pub fn acquire(data_path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = lock_path_for(data_path.as_ref());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { file, path }),
                Err(e) if is_lock_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockFailed(path));
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_INTERVAL_MS));
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Read a file, treating a missing file as `None`.
pub fn read_if_exists(path: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
    match fs::read(path.as_ref()) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Write `data` to a temp file beside `path`, then rename it into place.
///
/// Does not lock; callers hold a [`StoreLock`] around the read-modify-write.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        std::process::id()
    ));

    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, path)?;
    Ok(())
}
