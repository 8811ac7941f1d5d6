//! Exclusive lock file guarding manifest appends.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Held for the duration of a single manifest append; the lock file is
/// removed on drop.
pub struct ManifestLock {
    lock_file: PathBuf,
}

impl ManifestLock {
    /// Try to take the lock, waiting briefly for a concurrent holder.
    pub fn acquire(lock_file: PathBuf) -> Result<Self> {
        const MAX_ATTEMPTS: u32 = 50;
        const RETRY_DELAY: Duration = Duration::from_millis(100);

        for _ in 0..MAX_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_file)
            {
                Ok(mut file) => {
                    // Record the holder so a stale lock can be diagnosed.
                    let token = Uuid::new_v4();
                    let _ = writeln!(file, "{} {}", std::process::id(), token);
                    return Ok(Self { lock_file });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            format!("manifest lock busy: {}", lock_file.display()),
        )))
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_and_drop_removes_lock_file() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("manifest.lock");

        let guard = ManifestLock::acquire(lock_path.clone()).unwrap();
        assert!(lock_path.exists());

        drop(guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn reacquire_after_release_succeeds() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("manifest.lock");

        drop(ManifestLock::acquire(lock_path.clone()).unwrap());
        let second = ManifestLock::acquire(lock_path.clone());
        assert!(second.is_ok());
    }
}
