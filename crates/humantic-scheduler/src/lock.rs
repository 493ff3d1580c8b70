//! Run lease: at most one run per checkpoint, across processes.
//!
//! File-backed stores take an OS advisory lock on a `.lock` file next to their
//! data, so `humantic run` and `humantic serve` exclude each other. The lock is
//! released on drop and by the OS if the process dies.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fs4::fs_std::FileExt;
use humantic_core::error::Result;

/// Held for the whole run.
#[derive(Debug)]
pub struct RunLock {
    held: Held,
}

#[derive(Debug)]
enum Held {
    File(File),
    Flag(Arc<AtomicBool>),
}

impl RunLock {
    /// Exclusive lock on `path` (created if missing). `None` when someone else holds it.
    pub fn try_file(path: &Path) -> Result<Option<Self>> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self {
                held: Held::File(file),
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// In-process lease for stores without a file, e.g. an in-memory database.
    pub fn try_flag(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                held: Held::Flag(flag.clone()),
            })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match &self.held {
            Held::File(file) => {
                if let Err(e) = FileExt::unlock(file) {
                    tracing::warn!("⚠️ Could not release run lock: {e}");
                }
            }
            Held::Flag(flag) => flag.store(false, Ordering::Release),
        }
    }
}

/// EWOULDBLOCK on unix, ERROR_LOCK_VIOLATION (33) on Windows.
fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock || (cfg!(windows) && e.raw_os_error() == Some(33))
}

/// `<path>.lock`, next to the data it guards.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
