//! Batched version lookups with coalesced upstream fetches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use vtrack_core::artifact::{Artifact, ArtifactKey};
use vtrack_core::version_info::VersionInfo;
use vtrack_maven::{UpdateOutcome, UpstreamProvider};
use vtrack_store::VersionStore;
use vtrack_util::errors::VtrackResult;

/// Decides whether a stored entry is stale for a given request artifact.
pub type StalePredicate = Arc<dyn Fn(&VersionInfo, &Artifact) -> bool + Send + Sync>;

/// Freshness windows: one delay after a successful poll, a shorter one
/// after a failure so broken coordinates recover quickly.
#[derive(Debug, Clone, Copy)]
pub struct StalePolicy {
    pub after_success: Duration,
    pub after_failure: Duration,
}

impl StalePolicy {
    pub fn is_stale(&self, info: &VersionInfo, now: DateTime<Utc>) -> bool {
        let Some(polled) = info.last_polled_date() else {
            return true;
        };
        let delay = if info.last_poll_failed() {
            self.after_failure
        } else {
            self.after_success
        };
        let delay = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(polled) >= delay
    }

    pub fn as_predicate(self) -> StalePredicate {
        Arc::new(move |info, _| self.is_stale(info, Utc::now()))
    }
}

/// The query engine. Shared by the API facade and the background
/// refresher, so both funnel through the same keyed locks and worker pool.
pub struct VersionTracker {
    storage: Arc<dyn VersionStore>,
    provider: Arc<dyn UpstreamProvider>,
    locks: crate::lock_cache::SharedLockCache,
    workers: Arc<Semaphore>,
    batch_deadline: Duration,
}

impl VersionTracker {
    /// `worker_count` bounds concurrent upstream fetches. When every
    /// permit is taken, further fetch tasks block on the semaphore until
    /// one frees up; submissions are never rejected.
    pub fn new(
        storage: Arc<dyn VersionStore>,
        provider: Arc<dyn UpstreamProvider>,
        locks: crate::lock_cache::SharedLockCache,
        worker_count: usize,
        batch_deadline: Duration,
    ) -> Self {
        Self {
            storage,
            provider,
            locks,
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            batch_deadline,
        }
    }

    /// Serve a batch lookup.
    ///
    /// Coordinates present in storage and not stale are answered from the
    /// store. The rest fan out to the worker pool, one coalesced fetch per
    /// distinct `(groupId, artifactId)`, each under its keyed lock with a
    /// double-checked re-read. Tasks still running at the batch deadline
    /// are aborted and their coordinates answered with the pre-fetch
    /// snapshot. The returned map is keyed by the caller's original
    /// artifacts.
    pub async fn get_version_info(
        &self,
        artifacts: &[Artifact],
        is_stale: StalePredicate,
    ) -> VtrackResult<HashMap<Artifact, VersionInfo>> {
        for artifact in artifacts {
            artifact.validate()?;
        }
        let now = Utc::now();

        // One snapshot (stored or synthesized) per distinct key, plus the
        // version strings the callers asked about for date scraping.
        let mut snapshots: HashMap<ArtifactKey, VersionInfo> = HashMap::new();
        let mut existed: HashSet<ArtifactKey> = HashSet::new();
        let mut representative: HashMap<ArtifactKey, Artifact> = HashMap::new();
        let mut wanted_dates: HashMap<ArtifactKey, Vec<String>> = HashMap::new();
        for artifact in artifacts {
            let key = artifact.key();
            wanted_dates
                .entry(key.clone())
                .or_default()
                .push(artifact.version.clone());
            if snapshots.contains_key(&key) {
                continue;
            }
            representative.insert(key.clone(), artifact.clone());
            match self
                .storage
                .get_version_info(&key.group_id, &key.artifact_id)?
            {
                Some(info) => {
                    existed.insert(key.clone());
                    snapshots.insert(key, info);
                }
                None => {
                    snapshots.insert(key, VersionInfo::new(artifact.clone(), now));
                }
            }
        }

        // Partition: a key is fetched if it was absent from storage or any
        // requesting artifact considers it stale.
        let mut to_fetch: Vec<ArtifactKey> = Vec::new();
        for (key, info) in &snapshots {
            let stale = !existed.contains(key)
                || artifacts
                    .iter()
                    .filter(|a| a.key() == *key)
                    .any(|a| is_stale(info, a));
            if stale {
                to_fetch.push(key.clone());
            }
        }

        let mut tasks: JoinSet<(ArtifactKey, VersionInfo)> = JoinSet::new();
        for key in to_fetch {
            let storage = Arc::clone(&self.storage);
            let provider = Arc::clone(&self.provider);
            let locks = self.locks.clone();
            let workers = Arc::clone(&self.workers);
            let is_stale = Arc::clone(&is_stale);
            let artifact = representative[&key].clone();
            let fallback = snapshots[&key].clone();
            let wanted = wanted_dates.remove(&key).unwrap_or_default();

            tasks.spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (artifact.key(), fallback),
                };
                let guard = locks.lock(&artifact.key()).await;

                // Double-checked lookup: a concurrent query or background
                // sweep may have refreshed the entry while we queued.
                let stored = storage
                    .get_version_info(&artifact.group_id, &artifact.artifact_id)
                    .ok()
                    .flatten();
                let mut info = match stored {
                    Some(current) if !is_stale(&current, &artifact) => {
                        drop(guard);
                        return (artifact.key(), current);
                    }
                    Some(current) => current,
                    None => fallback,
                };

                provider.update(&mut info, &wanted).await;
                if let Err(e) = storage.save_or_update(&info) {
                    tracing::warn!("Failed to persist {}: {e:?}", artifact.key());
                }
                drop(guard);
                (artifact.key(), info)
            });
        }

        // Join with the batch deadline; timed-out coordinates fall back to
        // their pre-fetch snapshots.
        let mut fetched: HashMap<ArtifactKey, VersionInfo> = HashMap::new();
        let deadline = tokio::time::sleep(self.batch_deadline);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(
                        "Batch deadline of {:?} elapsed with {} fetches outstanding",
                        self.batch_deadline,
                        tasks.len()
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((key, info))) => {
                        fetched.insert(key, info);
                    }
                    Some(Err(e)) => {
                        if e.is_panic() {
                            tracing::warn!("Fetch task panicked: {e}");
                        }
                    }
                }
            }
        }

        // Merge, stamp the request time, and write back. Entries that were
        // never committed to storage (synthesized, fetch timed out) stay
        // uncommitted until their first completed fetch.
        let request_time = Utc::now();
        let mut merged = snapshots;
        let fetched_keys: HashSet<ArtifactKey> = fetched.keys().cloned().collect();
        for (key, info) in fetched {
            merged.insert(key, info);
        }
        for (key, info) in merged.iter_mut() {
            info.last_request_date = Some(request_time);
            if existed.contains(key) || fetched_keys.contains(key) {
                if let Err(e) = self.storage.save_or_update(info) {
                    tracing::warn!("Failed to persist {key}: {e:?}");
                }
            }
        }

        let mut results = HashMap::with_capacity(artifacts.len());
        for artifact in artifacts {
            let key = artifact.key();
            if let Some(info) = merged.get(&key) {
                results.insert(artifact.clone(), info.clone());
            }
        }
        Ok(results)
    }

    /// Refresh a single coordinate, bypassing any staleness check.
    ///
    /// `version`, when given, names a version whose publication date
    /// should be scraped along with the refresh.
    pub async fn force_update(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: Option<&str>,
    ) -> VtrackResult<UpdateOutcome> {
        let key = ArtifactKey::new(group_id, artifact_id);
        let _permit = self.workers.clone().acquire_owned().await.map_err(|_| {
            vtrack_util::errors::VtrackError::Cancelled {
                message: "worker pool is shut down".to_string(),
            }
        })?;
        let guard = self.locks.lock(&key).await;

        let mut info = match self.storage.get_version_info(group_id, artifact_id)? {
            Some(info) => info,
            None => VersionInfo::new(Artifact::new(group_id, artifact_id, ""), Utc::now()),
        };
        let wanted: Vec<String> = version.map(str::to_string).into_iter().collect();
        let outcome = self.provider.update(&mut info, &wanted).await;
        self.storage.save_or_update(&info)?;
        drop(guard);
        Ok(outcome)
    }

    /// Refresh one coordinate if it is still stale under `policy`. Used by
    /// the background sweep; shares the keyed locks and worker pool with
    /// foreground queries, so the at-most-one-probe guarantee holds across
    /// both.
    pub async fn refresh_stale(
        &self,
        key: &ArtifactKey,
        policy: StalePolicy,
    ) -> Option<UpdateOutcome> {
        let _permit = self.workers.clone().acquire_owned().await.ok()?;
        let guard = self.locks.lock(key).await;

        let stored = self
            .storage
            .get_version_info(&key.group_id, &key.artifact_id)
            .ok()
            .flatten()?;
        if !policy.is_stale(&stored, Utc::now()) {
            return None;
        }
        let mut info = stored;
        let outcome = self.provider.update(&mut info, &[]).await;
        if let Err(e) = self.storage.save_or_update(&info) {
            tracing::warn!("Failed to persist {key}: {e:?}");
        }
        drop(guard);
        Some(outcome)
    }
}
