//! Keyed mutex registry with refcounted entries and bounded capacity.
//!
//! Each `(groupId, artifactId)` maps to at most one mutex, so at most one
//! upstream probe per coordinate runs at any instant, no matter how many
//! foreground queries and background sweeps want it. Entries are
//! refcounted: the last holder or waiter to release evicts the entry,
//! keeping the registry proportional to in-flight work. Total capacity is
//! bounded by a semaphore; acquisitions for new keys wait in FIFO order
//! when the bound is reached.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use vtrack_core::artifact::ArtifactKey;

struct LockEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus queued waiters. The entry is evicted at zero.
    refs: usize,
    /// Capacity permit, released with the entry.
    _permit: OwnedSemaphorePermit,
}

struct Registry {
    capacity: Arc<Semaphore>,
    entries: Mutex<HashMap<ArtifactKey, LockEntry>>,
}

impl Registry {
    fn release(&self, key: &ArtifactKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(key);
            }
        }
    }
}

#[derive(Clone)]
pub struct SharedLockCache {
    registry: Arc<Registry>,
}

impl SharedLockCache {
    pub fn new(max_locks: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                capacity: Arc::new(Semaphore::new(max_locks.max(1))),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Acquire the mutex for `key`, creating its entry if needed. The
    /// returned guard releases on drop along every exit path, including
    /// task abort; a waiter cancelled while queued also releases its
    /// reference.
    pub async fn lock(&self, key: &ArtifactKey) -> KeyGuard {
        let (lock, reference) = loop {
            // Fast paths: the entry exists, or capacity is free right now.
            {
                let mut entries = self.registry.entries.lock();
                if let Some(entry) = entries.get_mut(key) {
                    entry.refs += 1;
                    break (entry.lock.clone(), RefHandle::new(&self.registry, key));
                }
                if let Ok(permit) = self.registry.capacity.clone().try_acquire_owned() {
                    break (
                        insert_entry(&mut entries, key, permit),
                        RefHandle::new(&self.registry, key),
                    );
                }
            }

            // Capacity exhausted: wait for an eviction, then re-check the
            // map, since the key may have been created meanwhile.
            let permit = match self.registry.capacity.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => continue,
            };
            let mut entries = self.registry.entries.lock();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.refs += 1;
                    break (entry.lock.clone(), RefHandle::new(&self.registry, key));
                }
                None => {
                    break (
                        insert_entry(&mut entries, key, permit),
                        RefHandle::new(&self.registry, key),
                    );
                }
            }
        };

        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _reference: reference,
        }
    }

    /// Number of live entries; proportional to in-flight work.
    pub fn len(&self) -> usize {
        self.registry.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_entry(
    entries: &mut HashMap<ArtifactKey, LockEntry>,
    key: &ArtifactKey,
    permit: OwnedSemaphorePermit,
) -> Arc<tokio::sync::Mutex<()>> {
    let lock = Arc::new(tokio::sync::Mutex::new(()));
    entries.insert(
        key.clone(),
        LockEntry {
            lock: lock.clone(),
            refs: 1,
            _permit: permit,
        },
    );
    lock
}

/// Decrements the entry refcount on drop, whether the owner ever obtained
/// the mutex or was cancelled while queued.
struct RefHandle {
    registry: Arc<Registry>,
    key: ArtifactKey,
}

impl RefHandle {
    fn new(registry: &Arc<Registry>, key: &ArtifactKey) -> Self {
        Self {
            registry: registry.clone(),
            key: key.clone(),
        }
    }
}

impl Drop for RefHandle {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

/// RAII guard for one keyed critical section.
///
/// Field order matters: the mutex guard is released before the refcount,
/// so a queued waiter can never observe an evicted entry while the lock is
/// still held.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
    _reference: RefHandle,
}
