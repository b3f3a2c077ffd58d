//! Concurrency properties of the fetch pipeline: coalescing, the
//! at-most-one-probe invariant, and deadline fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use vtrack_core::artifact::Artifact;
use vtrack_core::version::Version;
use vtrack_core::version_info::VersionInfo;
use vtrack_maven::{UpdateOutcome, UpstreamProvider};
use vtrack_store::{CachingStore, FlatFileStore, StoreFormat, VersionStore};
use vtrack_tracker::tracker::StalePredicate;
use vtrack_tracker::{SharedLockCache, VersionTracker};

/// Scripted provider: sleeps, then reports one new version. Tracks total
/// and concurrent invocations per run.
struct BlockingProvider {
    delay: Duration,
    version: String,
    invocations: AtomicUsize,
    concurrent: AtomicUsize,
    peak_concurrent: AtomicUsize,
}

impl BlockingProvider {
    fn new(delay: Duration, version: &str) -> Self {
        Self {
            delay,
            version: version.to_string(),
            invocations: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            peak_concurrent: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UpstreamProvider for BlockingProvider {
    async fn update(&self, info: &mut VersionInfo, _wanted_dates: &[String]) -> UpdateOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrent.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.concurrent.fetch_sub(1, Ordering::SeqCst);

        info.add_version(Version::first_seen(&self.version, Utc::now()));
        info.recompute_latest();
        info.last_success_date = Some(Utc::now());
        UpdateOutcome::Updated
    }
}

fn temp_store(dir: &tempfile::TempDir) -> Arc<dyn VersionStore> {
    let flat = FlatFileStore::open(&dir.path().join("data.bin"), StoreFormat::Binary).unwrap();
    Arc::new(CachingStore::new(Arc::new(flat), Duration::from_secs(3600)))
}

fn tracker_with(
    storage: Arc<dyn VersionStore>,
    provider: Arc<dyn UpstreamProvider>,
    deadline: Duration,
) -> Arc<VersionTracker> {
    Arc::new(VersionTracker::new(
        storage,
        provider,
        SharedLockCache::new(64),
        8,
        deadline,
    ))
}

fn stale_when_never_polled() -> StalePredicate {
    Arc::new(|info: &VersionInfo, _: &Artifact| info.last_success_date.is_none())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_queries_coalesce_to_one_probe() {
    let dir = tempfile::tempdir().unwrap();
    let storage = temp_store(&dir);
    let provider = Arc::new(BlockingProvider::new(Duration::from_millis(500), "1.0.1"));
    let tracker = tracker_with(storage, provider.clone(), Duration::from_secs(30));

    let artifact = Artifact::new("de.codesourcery", "test", "1.0.0");
    let mut queries = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let tracker = tracker.clone();
        let artifact = artifact.clone();
        queries.spawn(async move {
            tracker
                .get_version_info(&[artifact], stale_when_never_polled())
                .await
                .unwrap()
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = queries.join_next().await {
        results.push(joined.unwrap());
    }

    assert_eq!(provider.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 10);

    // Every query observed the same record, modulo its own request stamp.
    let mut normalized: Vec<VersionInfo> = results
        .into_iter()
        .map(|mut map| {
            let mut info = map.remove(&artifact).unwrap();
            info.last_request_date = None;
            info
        })
        .collect();
    let first = normalized.pop().unwrap();
    assert!(first.version("1.0.1").is_some());
    for other in normalized {
        assert_eq!(other, first);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_probe_per_key_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let storage = temp_store(&dir);
    let provider = Arc::new(BlockingProvider::new(Duration::from_millis(50), "2.0.0"));
    let tracker = tracker_with(storage, provider.clone(), Duration::from_secs(30));

    // Overlapping batches over the same three coordinates.
    let coords: Vec<Artifact> = (0..3)
        .map(|i| Artifact::new("org.example", &format!("lib{i}"), "1.0.0"))
        .collect();
    let mut queries = tokio::task::JoinSet::new();
    for _ in 0..6 {
        let tracker = tracker.clone();
        let batch = coords.clone();
        queries.spawn(async move {
            tracker
                .get_version_info(&batch, stale_when_never_polled())
                .await
                .unwrap()
        });
    }
    while let Some(joined) = queries.join_next().await {
        joined.unwrap();
    }

    // Never more than one probe in flight per key: with three keys the
    // global peak is at most three, and each key was probed exactly once,
    // so three probes total.
    assert_eq!(provider.invocations.load(Ordering::SeqCst), 3);
    assert!(provider.peak_concurrent.load(Ordering::SeqCst) <= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_returns_prefetch_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let storage = temp_store(&dir);
    let provider = Arc::new(BlockingProvider::new(Duration::from_secs(60), "1.0.1"));
    let tracker = tracker_with(storage.clone(), provider, Duration::from_millis(200));

    let artifact = Artifact::new("de.codesourcery", "slow", "1.0.0");
    let started = std::time::Instant::now();
    let results = tracker
        .get_version_info(std::slice::from_ref(&artifact), stale_when_never_polled())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    // Best-effort answer: the synthesized snapshot, no versions yet.
    let info = results.get(&artifact).unwrap();
    assert!(info.versions.is_empty());
    assert!(info.creation_date.is_some());

    // Never-fetched coordinates are not committed to storage.
    assert!(storage
        .get_version_info("de.codesourcery", "slow")
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn monotone_observation_after_force_update() {
    let dir = tempfile::tempdir().unwrap();
    let storage = temp_store(&dir);
    let provider = Arc::new(BlockingProvider::new(Duration::from_millis(10), "3.1.4"));
    let tracker = tracker_with(storage, provider, Duration::from_secs(30));

    let outcome = tracker
        .force_update("org.example", "pi", Some("3.1.4"))
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);

    // Any later lookup sees at least the reported version.
    let artifact = Artifact::new("org.example", "pi", "3.0.0");
    let results = tracker
        .get_version_info(
            std::slice::from_ref(&artifact),
            Arc::new(|_: &VersionInfo, _: &Artifact| false),
        )
        .await
        .unwrap();
    let info = results.get(&artifact).unwrap();
    assert!(info.version("3.1.4").is_some());
    assert_eq!(
        info.latest_release_version.as_ref().unwrap().version_string,
        "3.1.4"
    );
}
