//! Write-behind caching decorator over any [`VersionStore`].
//!
//! All entries are loaded into an [`ArtifactIndex`] on first use. Reads
//! are served from memory as owned snapshots; writes update memory and
//! mark the key dirty. A flusher thread pushes the dirty set to the
//! delegate every flush interval, retrying a failed flush once and keeping
//! the keys dirty otherwise. `close()` flushes synchronously before
//! closing the delegate.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use vtrack_core::artifact::ArtifactKey;
use vtrack_core::index::ArtifactIndex;
use vtrack_core::version_info::VersionInfo;
use vtrack_util::errors::{VtrackError, VtrackResult};

use crate::store::{StoreStatistics, VersionStore};

struct CacheState {
    index: ArtifactIndex<VersionInfo>,
    dirty: BTreeSet<ArtifactKey>,
    loaded: bool,
    closed: bool,
    last_flush: Option<DateTime<Utc>>,
}

struct Shared {
    delegate: Arc<dyn VersionStore>,
    state: Mutex<CacheState>,
    stop: Mutex<bool>,
    wakeup: Condvar,
}

pub struct CachingStore {
    shared: Arc<Shared>,
    flusher: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl CachingStore {
    pub fn new(delegate: Arc<dyn VersionStore>, flush_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            delegate,
            state: Mutex::new(CacheState {
                index: ArtifactIndex::new(),
                dirty: BTreeSet::new(),
                loaded: false,
                closed: false,
                last_flush: None,
            }),
            stop: Mutex::new(false),
            wakeup: Condvar::new(),
        });

        let flusher_shared = shared.clone();
        let flusher = std::thread::Builder::new()
            .name("store-flusher".to_string())
            .spawn(move || flusher_loop(flusher_shared, flush_interval))
            .ok();
        if flusher.is_none() {
            tracing::warn!("Failed to spawn store flusher thread; writes flush only on close");
        }

        Self {
            shared,
            flusher: Mutex::new(flusher),
        }
    }

    /// Time of the last successful flush to the delegate.
    pub fn last_flush_time(&self) -> Option<DateTime<Utc>> {
        self.shared.state.lock().last_flush
    }

    /// Group ids currently in the index, for autocompletion.
    pub fn complete_group_ids(&self, prefix: &str) -> VtrackResult<Vec<String>> {
        let mut state = self.shared.state.lock();
        self.shared.ensure_loaded(&mut state)?;
        Ok(state
            .index
            .group_ids()
            .filter(|g| g.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    /// Artifact ids under `group_id`, for autocompletion.
    pub fn complete_artifact_ids(&self, group_id: &str, prefix: &str) -> VtrackResult<Vec<String>> {
        let mut state = self.shared.state.lock();
        self.shared.ensure_loaded(&mut state)?;
        Ok(state
            .index
            .artifact_ids(group_id)
            .filter(|a| a.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    fn stop_flusher(&self) {
        {
            let mut stop = self.shared.stop.lock();
            *stop = true;
            self.shared.wakeup.notify_all();
        }
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Shared {
    fn ensure_loaded(&self, state: &mut CacheState) -> VtrackResult<()> {
        if state.closed {
            return Err(VtrackError::Storage {
                message: "store is closed".to_string(),
            }
            .into());
        }
        if state.loaded {
            return Ok(());
        }
        for info in self.delegate.get_all_versions()? {
            let key = info.key();
            state.index.put(&key, info);
        }
        state.loaded = true;
        Ok(())
    }

    /// Push the dirty set to the delegate. Keys re-dirtied by concurrent
    /// writes during the flush stay dirty for the next round.
    fn flush(&self) -> VtrackResult<()> {
        let (keys, batch) = {
            let mut state = self.state.lock();
            if !state.loaded || state.dirty.is_empty() {
                return Ok(());
            }
            let keys: Vec<ArtifactKey> = state.dirty.iter().cloned().collect();
            let batch: Vec<VersionInfo> = keys
                .iter()
                .filter_map(|k| state.index.get(&k.group_id, &k.artifact_id).cloned())
                .collect();
            state.dirty.clear();
            (keys, batch)
        };

        let mut result = self.delegate.save_or_update_all(&batch);
        if result.is_err() {
            tracing::warn!("Store flush failed, retrying once: {:?}", result);
            result = self.delegate.save_or_update_all(&batch);
        }

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.last_flush = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                // Keep the entries dirty so the next interval retries them.
                state.dirty.extend(keys);
                Err(e)
            }
        }
    }
}

fn flusher_loop(shared: Arc<Shared>, interval: Duration) {
    loop {
        {
            let mut stop = shared.stop.lock();
            if *stop {
                return;
            }
            let timed_out = shared.wakeup.wait_for(&mut stop, interval).timed_out();
            if *stop {
                return;
            }
            if !timed_out {
                continue;
            }
        }
        if let Err(e) = shared.flush() {
            tracing::warn!("Periodic store flush failed: {e:?}");
        }
    }
}

impl VersionStore for CachingStore {
    fn get_all_versions(&self) -> VtrackResult<Vec<VersionInfo>> {
        let mut state = self.shared.state.lock();
        self.shared.ensure_loaded(&mut state)?;
        let mut all = Vec::with_capacity(state.index.len());
        state.index.visit_values(|info| all.push(info.clone()));
        Ok(all)
    }

    fn get_version_info(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> VtrackResult<Option<VersionInfo>> {
        let mut state = self.shared.state.lock();
        self.shared.ensure_loaded(&mut state)?;
        Ok(state.index.get(group_id, artifact_id).cloned())
    }

    fn save_or_update(&self, info: &VersionInfo) -> VtrackResult<()> {
        let mut state = self.shared.state.lock();
        self.shared.ensure_loaded(&mut state)?;
        let key = info.key();
        state.index.put(&key, info.clone());
        state.dirty.insert(key);
        Ok(())
    }

    fn save_or_update_all(&self, infos: &[VersionInfo]) -> VtrackResult<()> {
        let mut state = self.shared.state.lock();
        self.shared.ensure_loaded(&mut state)?;
        let upserts: Vec<(ArtifactKey, VersionInfo)> =
            infos.iter().map(|i| (i.key(), i.clone())).collect();
        for (key, _) in &upserts {
            state.dirty.insert(key.clone());
        }
        state.index.replace_all(&[], upserts);
        Ok(())
    }

    fn statistics(&self) -> VtrackResult<StoreStatistics> {
        let entry_count = {
            let mut state = self.shared.state.lock();
            self.shared.ensure_loaded(&mut state)?;
            state.index.len()
        };
        let delegate_stats = self.shared.delegate.statistics()?;
        Ok(StoreStatistics {
            entry_count,
            file_size_bytes: delegate_stats.file_size_bytes,
            last_load_duration: delegate_stats.last_load_duration,
        })
    }

    fn close(&self) -> VtrackResult<()> {
        self.stop_flusher();
        self.shared.flush()?;
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        self.shared.delegate.close()
    }
}

impl Drop for CachingStore {
    fn drop(&mut self) {
        self.stop_flusher();
    }
}
