//! Per-path-name mutex table. Two operations against the *same* path
//! name must never interleave (e.g. a CreatePath racing a DeletePath),
//! while operations against different names must never block each
//! other (spec §5).

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

#[derive(Default)]
pub struct NameLockTable {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutex for `name`, creating it on first use. Double
    /// checks under the write lock so two callers racing to create the
    /// same name's entry don't end up with two distinct mutexes.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard {
        let existing = {
            let guard = self.locks.read().await;
            guard.get(name).cloned()
        };
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut guard = self.locks.write().await;
                guard
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };
        OwnedMutexGuard::new(entry).await
    }

    /// Drops the table entry for `name` once no operation holds it, so
    /// a long-lived process doesn't accumulate one mutex per name it
    /// has ever seen across path churn.
    pub async fn evict_if_idle(&self, name: &str) {
        let mut guard = self.locks.write().await;
        if let Some(entry) = guard.get(name) {
            if Arc::strong_count(entry) == 1 {
                guard.remove(name);
            }
        }
    }

    pub async fn tracked_names(&self) -> usize {
        self.locks.read().await.len()
    }
}

/// A mutex guard that owns its `Arc<Mutex<()>>`, so it can outlive the
/// block that looked it up in the table.
pub struct OwnedMutexGuard {
    _mutex: Arc<Mutex<()>>,
    guard: tokio::sync::OwnedMutexGuard<()>,
}

impl OwnedMutexGuard {
    async fn new(mutex: Arc<Mutex<()>>) -> Self {
        let guard = mutex.clone().lock_owned().await;
        Self { _mutex: mutex, guard }
    }
}

impl std::ops::Deref for OwnedMutexGuard {
    type Target = ();
    fn deref(&self) -> &() {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    #[tokio::test]
    async fn same_name_operations_serialize() {
        let table = StdArc::new(NameLockTable::new());
        let counter = StdArc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let table = table.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = table.lock("camera0").await;
                let before = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                assert_eq!(counter.load(Ordering::SeqCst), before + 1);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_names_do_not_block_each_other() {
        let table = NameLockTable::new();
        let _g0 = table.lock("camera0").await;
        // Acquiring a distinct name's lock must not deadlock while the
        // first guard is still held.
        let _g1 = tokio::time::timeout(Duration::from_millis(100), table.lock("camera1"))
            .await
            .expect("lock on a different name must not be blocked");
    }

    #[tokio::test]
    async fn evict_if_idle_removes_unused_entries() {
        let table = NameLockTable::new();
        {
            let _guard = table.lock("camera0").await;
        }
        table.evict_if_idle("camera0").await;
        assert_eq!(table.tracked_names().await, 0);
    }
}
