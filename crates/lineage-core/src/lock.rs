//! Per-dataset read/write exclusion.
//!
//! Scans, history and diffs take the read side and run concurrently with
//! each other. Restore and revert take the write side for their whole
//! duration, so no reader ever observes a half-written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Process-wide registry handing out one lock per dataset root.
#[derive(Debug, Default, Clone)]
pub struct DatasetLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>>,
}

impl DatasetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `root`, created on first use.
    pub fn lock_for(&self, root: &Path) -> DatasetLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = locks.entry(root.to_path_buf()).or_default().clone();
        DatasetLock { inner }
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle on one dataset's lock.
#[derive(Debug, Clone, Default)]
pub struct DatasetLock {
    inner: Arc<RwLock<()>>,
}

impl DatasetLock {
    pub async fn read(&self) -> OwnedRwLockReadGuard<()> {
        self.inner.clone().read_owned().await
    }

    pub async fn write(&self) -> OwnedRwLockWriteGuard<()> {
        self.inner.clone().write_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_root_shares_one_lock() {
        let locks = DatasetLocks::new();
        let a = locks.lock_for(Path::new("/data/one"));
        let b = locks.lock_for(Path::new("/data/one"));
        let _other = locks.lock_for(Path::new("/data/two"));
        assert_eq!(locks.len(), 2);

        let _w = a.write().await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), b.read()).await;
        assert!(blocked.is_err(), "reader must wait for the writer");
    }

    #[tokio::test]
    async fn test_readers_do_not_block_each_other() {
        let lock = DatasetLocks::new().lock_for(Path::new("/data/one"));
        let _r1 = lock.read().await;
        let r2 = tokio::time::timeout(Duration::from_millis(50), lock.read()).await;
        assert!(r2.is_ok());
    }

    #[tokio::test]
    async fn test_different_roots_are_independent() {
        let locks = DatasetLocks::new();
        let one = locks.lock_for(Path::new("/data/one"));
        let two = locks.lock_for(Path::new("/data/two"));
        let _w = one.write().await;
        let r = tokio::time::timeout(Duration::from_millis(50), two.write()).await;
        assert!(r.is_ok());
    }
}
