//! Named cross-process device lock
//!
//! An advisory exclusive lock on `<dir>/<name>.lock` taken with
//! `flock`/`LockFileEx`. The OS drops it with the owning process, so a
//! crashed service never blocks the next one. Each `DeviceLock` holds its
//! own file handle, which makes two locks in the same process exclude each
//! other as well.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{LedError, Result};

/// Interval between two acquisition attempts
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A named, process-external mutex guarding one serial port
#[derive(Debug)]
pub struct DeviceLock {
    name: String,
    path: PathBuf,
    file: Option<File>,
    /// Whether this instance currently holds the lock
    owns: bool,
}

impl DeviceLock {
    /// Describe a lock without touching the filesystem
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: dir.join(format!("{}.lock", name)),
            file: None,
            owns: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this instance holds the lock
    pub fn is_owned(&self) -> bool {
        self.owns
    }

    /// Try once without waiting
    ///
    /// Returns `Ok(false)` when another holder has it.
    pub fn try_acquire(&mut self) -> Result<bool> {
        if self.owns {
            return Ok(true);
        }

        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            self.file = Some(file);
        }

        let Some(file) = self.file.as_ref() else {
            return Ok(false);
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                self.owns = true;
                tracing::debug!("Acquired device lock {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(false),
            Err(e) => Err(LedError::Io(e)),
        }
    }

    /// Acquire the lock, polling until `timeout` elapses
    pub async fn acquire(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::debug!("Timed out waiting for device lock {:?}", self.path);
                return Err(LedError::LockContention {
                    lock: self.name.clone(),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    /// Release the lock; a no-op when not owned
    pub fn release(&mut self) {
        if !self.owns {
            return;
        }
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!("Failed to unlock {:?}: {}", self.path, e);
            }
        }
        self.owns = false;
        tracing::debug!("Released device lock {:?}", self.path);
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = DeviceLock::new(dir.path(), "led");
        let mut second = DeviceLock::new(dir.path(), "led");

        first.acquire(Duration::from_millis(100)).await.unwrap();
        assert!(first.is_owned());

        let result = second.acquire(Duration::from_millis(250)).await;
        assert!(matches!(result, Err(LedError::LockContention { .. })));
        assert!(!second.is_owned());

        first.release();
        second.acquire(Duration::from_millis(100)).await.unwrap();
        assert!(second.is_owned());
    }

    #[tokio::test]
    async fn test_release_when_not_owned_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut holder = DeviceLock::new(dir.path(), "led");
        let mut other = DeviceLock::new(dir.path(), "led");
        holder.acquire(Duration::ZERO).await.unwrap();

        other.release();
        assert!(holder.is_owned());
        assert!(!other.try_acquire().unwrap());
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut held = DeviceLock::new(dir.path(), "led");
            held.acquire(Duration::ZERO).await.unwrap();
        }
        let mut next = DeviceLock::new(dir.path(), "led");
        assert!(next.try_acquire().unwrap());
    }

    #[test]
    fn test_lock_path() {
        let lock = DeviceLock::new(Path::new("/tmp"), "minipc-led-device");
        assert_eq!(lock.path(), Path::new("/tmp/minipc-led-device.lock"));
        assert_eq!(lock.name(), "minipc-led-device");
    }
}
