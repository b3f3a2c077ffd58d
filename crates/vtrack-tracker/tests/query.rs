//! End-to-end query behavior through the API facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use vtrack_core::artifact::Artifact;
use vtrack_core::blacklist::{Blacklist, VersionMatcher};
use vtrack_core::version::Version;
use vtrack_core::version_info::VersionInfo;
use vtrack_maven::{UpdateOutcome, UpstreamProvider};
use vtrack_store::{CachingStore, FlatFileStore, StoreFormat, VersionStore};
use vtrack_tracker::proto::{QueryRequest, UpdateAvailable, COMMAND_QUERY};
use vtrack_tracker::{ApiFacade, SharedLockCache, StalePolicy, VersionTracker};

/// Provider that answers NoChange and counts invocations; queries against
/// fresh entries must never reach it.
#[derive(Default)]
struct IdleProvider {
    invocations: AtomicUsize,
}

#[async_trait]
impl UpstreamProvider for IdleProvider {
    async fn update(&self, info: &mut VersionInfo, _wanted_dates: &[String]) -> UpdateOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        info.last_success_date = Some(Utc::now());
        UpdateOutcome::NoChange
    }
}

fn seeded_store(dir: &tempfile::TempDir) -> Arc<dyn VersionStore> {
    let flat = FlatFileStore::open(&dir.path().join("data.bin"), StoreFormat::Binary).unwrap();

    let mut info = VersionInfo::new(
        Artifact::new("de.codesourcery", "test", "1.0.0"),
        Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap(),
    );
    let mut v100 = Version::first_seen("1.0.0", Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap());
    v100.release_date = Some(Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap());
    let mut v101 = Version::first_seen("1.0.1", Utc.with_ymd_and_hms(2022, 7, 20, 0, 0, 0).unwrap());
    v101.release_date = Some(Utc.with_ymd_and_hms(2022, 7, 20, 0, 0, 0).unwrap());
    info.add_version(v100);
    info.add_version(v101);
    info.recompute_latest();
    // Polled moments ago, so the default policy treats it as fresh.
    info.last_success_date = Some(Utc::now());
    flat.save_or_update(&info).unwrap();

    Arc::new(CachingStore::new(Arc::new(flat), Duration::from_secs(3600)))
}

fn facade(storage: Arc<dyn VersionStore>, provider: Arc<dyn UpstreamProvider>) -> ApiFacade {
    let tracker = Arc::new(VersionTracker::new(
        storage,
        provider,
        SharedLockCache::new(64),
        8,
        Duration::from_secs(30),
    ));
    let policy = StalePolicy {
        after_success: Duration::from_secs(24 * 3600),
        after_failure: Duration::from_secs(600),
    };
    ApiFacade::new(tracker, Blacklist::new(), policy)
}

fn query_for(artifacts: Vec<Artifact>, blacklist: Option<Blacklist>) -> QueryRequest {
    QueryRequest {
        command: COMMAND_QUERY.to_string(),
        client_version: "1.0".to_string(),
        artifacts,
        blacklist,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stored_newer_release_yields_update_available() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(IdleProvider::default());
    let api = facade(seeded_store(&dir), provider.clone());

    let request = query_for(vec![Artifact::new("de.codesourcery", "test", "1.0.0")], None);
    let response = api.process_query(request).await.unwrap();

    assert_eq!(response.artifacts.len(), 1);
    let entry = &response.artifacts[0];
    assert_eq!(entry.update_available, UpdateAvailable::Yes);
    assert_eq!(
        entry.current_version.as_ref().unwrap().version_string,
        "1.0.0"
    );
    assert_eq!(
        entry.latest_version.as_ref().unwrap().version_string,
        "1.0.1"
    );
    // The entry was fresh; no upstream probe happened.
    assert_eq!(provider.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn up_to_date_version_yields_no() {
    let dir = tempfile::tempdir().unwrap();
    let api = facade(seeded_store(&dir), Arc::new(IdleProvider::default()));

    let request = query_for(vec![Artifact::new("de.codesourcery", "test", "1.0.1")], None);
    let response = api.process_query(request).await.unwrap();
    assert_eq!(response.artifacts[0].update_available, UpdateAvailable::No);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_blacklist_masks_the_latest_release() {
    let dir = tempfile::tempdir().unwrap();
    let api = facade(seeded_store(&dir), Arc::new(IdleProvider::default()));

    let mut blacklist = Blacklist::new();
    blacklist.add_artifact(
        "de.codesourcery",
        "test",
        VersionMatcher::Exact("1.0.1".to_string()),
    );
    let request = query_for(
        vec![Artifact::new("de.codesourcery", "test", "1.0.0")],
        Some(blacklist),
    );
    let response = api.process_query(request).await.unwrap();

    let entry = &response.artifacts[0];
    // With 1.0.1 masked, the request version is already the latest.
    assert_eq!(entry.update_available, UpdateAvailable::No);
    assert_eq!(
        entry.latest_version.as_ref().unwrap().version_string,
        "1.0.0"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_coordinate_with_failing_upstream_is_not_found() {
    let dir = tempfile::tempdir().unwrap();

    /// Provider whose probes always fail terminally.
    struct DownProvider;
    #[async_trait]
    impl UpstreamProvider for DownProvider {
        async fn update(&self, info: &mut VersionInfo, _wanted: &[String]) -> UpdateOutcome {
            info.last_failure_date = Some(Utc::now());
            UpdateOutcome::Error
        }
    }

    let api = facade(seeded_store(&dir), Arc::new(DownProvider));
    let request = query_for(vec![Artifact::new("org.unknown", "nothing", "1.0")], None);
    let response = api.process_query(request).await.unwrap();
    assert_eq!(
        response.artifacts[0].update_available,
        UpdateAvailable::NotFound
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsupported_command_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let api = facade(seeded_store(&dir), Arc::new(IdleProvider::default()));

    let mut request = query_for(vec![Artifact::new("g", "a", "1.0")], None);
    request.command = "purge".to_string();
    let err = api.process_query(request).await.unwrap_err();
    assert!(err.to_string().contains("Bad request"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_coordinate_fields_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let api = facade(seeded_store(&dir), Arc::new(IdleProvider::default()));

    let request = query_for(vec![Artifact::new("", "a", "1.0")], None);
    assert!(api.process_query(request).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_entry_is_refreshed_before_answering() {
    let dir = tempfile::tempdir().unwrap();
    let flat = FlatFileStore::open(&dir.path().join("data.bin"), StoreFormat::Binary).unwrap();

    // Seed an entry last polled long before the freshness window.
    let mut info = VersionInfo::new(
        Artifact::new("de.codesourcery", "aging", "1.0.0"),
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
    );
    info.add_version(Version::first_seen(
        "1.0.0",
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
    ));
    info.recompute_latest();
    info.last_success_date = Some(Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap());
    flat.save_or_update(&info).unwrap();
    let storage: Arc<dyn VersionStore> =
        Arc::new(CachingStore::new(Arc::new(flat), Duration::from_secs(3600)));

    /// Provider that publishes 1.1.0 when probed.
    struct FreshProvider;
    #[async_trait]
    impl UpstreamProvider for FreshProvider {
        async fn update(&self, info: &mut VersionInfo, _wanted: &[String]) -> UpdateOutcome {
            info.add_version(Version::first_seen("1.1.0", Utc::now()));
            info.recompute_latest();
            info.last_success_date = Some(Utc::now());
            UpdateOutcome::Updated
        }
    }

    let api = facade(storage.clone(), Arc::new(FreshProvider));
    let request = query_for(vec![Artifact::new("de.codesourcery", "aging", "1.0.0")], None);
    let response = api.process_query(request).await.unwrap();

    let entry = &response.artifacts[0];
    assert_eq!(entry.update_available, UpdateAvailable::Yes);
    assert_eq!(
        entry.latest_version.as_ref().unwrap().version_string,
        "1.1.0"
    );

    // The refreshed record was written back.
    let stored = storage
        .get_version_info("de.codesourcery", "aging")
        .unwrap()
        .unwrap();
    assert!(stored.version("1.1.0").is_some());
    assert!(stored.last_request_date.is_some());
}
