//! Process-level lock on the database
//!
//! Only one cycle runner may work against a database at a time. The lock file
//! sits next to the database, holds the owner's PID and is released on drop.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{EngineError, EngineResult};

pub struct CycleLock {
    /// Kept open to hold the lock
    file: File,
    path: PathBuf,
    pid: u32,
}

impl CycleLock {
    /// Lock file used for a database at `db_path`
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "netguard.db".into());
        name.push(".lock");
        db_path.with_file_name(name)
    }

    /// Take the lock without blocking; fails if another process holds it
    pub fn acquire(lock_path: &Path) -> EngineResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| {
                EngineError::storage(format!(
                    "Failed to create lock file {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(EngineError::storage(match Self::read_existing_pid(lock_path) {
                Some(pid) => format!(
                    "Database already in use by process {} ({})",
                    pid,
                    lock_path.display()
                ),
                None => format!("Database already in use ({})", lock_path.display()),
            }));
        }

        let pid = std::process::id();
        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", pid))
            .and_then(|_| file.sync_all())
            .map_err(|e| EngineError::storage(format!("Failed to write PID to lock file: {}", e)))?;

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_sits_next_to_database() {
        let path = CycleLock::path_for(Path::new("/var/lib/netguard/netguard.db"));
        assert_eq!(path, PathBuf::from("/var/lib/netguard/netguard.db.lock"));
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netguard.db.lock");

        let first = CycleLock::acquire(&path).expect("first lock");
        assert_eq!(first.pid(), std::process::id());

        let err = CycleLock::acquire(&path).err().expect("second lock must fail");
        assert!(err.to_string().contains("already in use"));

        drop(first);
        assert!(!path.exists());
        CycleLock::acquire(&path).expect("lock is free after drop");
    }
}
