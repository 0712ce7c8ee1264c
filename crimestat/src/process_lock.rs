//! Process-level locks guarding the store.
//!
//! Lock strategy:
//! - `crimestat-store.lock` is scoped to the database path.
//! - `load` and `reset` hold it exclusively; read commands hold it shared.
//! - Locks are advisory OS file locks (flock), held for process lifetime.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const STORE_LOCK_FILE: &str = "crimestat-store.lock";

/// How a command uses the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers; any number may run together.
    Shared,
    /// Writers; excludes every other process.
    Exclusive,
}

impl LockMode {
    fn flag(self) -> i32 {
        const LOCK_SH: i32 = 1;
        const LOCK_EX: i32 = 2;
        match self {
            LockMode::Shared => LOCK_SH,
            LockMode::Exclusive => LOCK_EX,
        }
    }
}

/// Guard held for the duration of a command.
pub struct StoreGuard {
    _lock: ProcessLock,
    pub mode: LockMode,
}

/// Acquire the store lock for a writing command.
///
/// Fails if any other crimestat process is using the same store.
pub fn acquire_exclusive(db_path: &Path) -> Result<StoreGuard> {
    acquire(db_path, LockMode::Exclusive).with_context(|| {
        "refusing to write: another crimestat process is using this store"
    })
}

/// Acquire the store lock for a reading command.
///
/// Fails only while a load or reset is running on the same store.
pub fn acquire_shared(db_path: &Path) -> Result<StoreGuard> {
    acquire(db_path, LockMode::Shared)
        .with_context(|| "store is being loaded or reset; try again when it finishes")
}

fn acquire(db_path: &Path, mode: LockMode) -> Result<StoreGuard> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create runtime lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(STORE_LOCK_FILE, db_path));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file, mode) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), ?mode, "Store lock acquired");
            Ok(StoreGuard {
                _lock: ProcessLock { file },
                mode,
            })
        }
        Err(e) if is_lock_busy(&e) => anyhow::bail!("lock is already held: {}", path.display()),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

// The lock file stays on disk: other holders of a shared lock still
// reference it.
struct ProcessLock {
    file: File,
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("crimestat");
    dir
}

fn scoped_lock_filename(base_filename: &str, db_path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    db_path.to_string_lossy().hash(&mut hasher);
    let digest = hasher.finish();
    format!("{base_filename}.{digest:016x}")
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File, mode: LockMode) -> io::Result<()> {
    const LOCK_NB: i32 = 4;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, mode.flag() | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("crimestat process locks currently require Unix (macOS/Linux)");

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("shared.db");
        let first = acquire_shared(&db).unwrap();
        let second = acquire_shared(&db).unwrap();
        assert_eq!(first.mode, LockMode::Shared);
        assert_eq!(second.mode, LockMode::Shared);
    }

    #[test]
    fn test_exclusive_lock_excludes_readers() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("exclusive.db");
        let writer = acquire_exclusive(&db).unwrap();
        assert!(acquire_shared(&db).is_err());
        assert!(acquire_exclusive(&db).is_err());
        drop(writer);
        assert!(acquire_shared(&db).is_ok());
    }

    #[test]
    fn test_locks_are_scoped_to_database_path() {
        let a = scoped_lock_filename(STORE_LOCK_FILE, Path::new("/tmp/a.db"));
        let b = scoped_lock_filename(STORE_LOCK_FILE, Path::new("/tmp/b.db"));
        assert_ne!(a, b);
        assert!(a.starts_with(STORE_LOCK_FILE));
    }
}
