//! The storage capability set.

use std::time::Duration;

use serde::Serialize;
use vtrack_core::version_info::VersionInfo;
use vtrack_util::errors::VtrackResult;

/// Storage contract shared by the flat-file backend and the caching
/// decorator. Implementations return owned deep copies and deep-copy every
/// input, so callers can never mutate stored state through a reference.
pub trait VersionStore: Send + Sync {
    /// All stored entries; order unspecified.
    fn get_all_versions(&self) -> VtrackResult<Vec<VersionInfo>>;

    /// The entry with matching `(groupId, artifactId)`, if any.
    fn get_version_info(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> VtrackResult<Option<VersionInfo>>;

    /// Upsert by `(groupId, artifactId)`.
    fn save_or_update(&self, info: &VersionInfo) -> VtrackResult<()>;

    /// Upsert every entry in `infos` under one critical section. Entries
    /// not named by the list are retained.
    fn save_or_update_all(&self, infos: &[VersionInfo]) -> VtrackResult<()>;

    fn statistics(&self) -> VtrackResult<StoreStatistics>;

    /// Flush pending writes. After close, further operations fail.
    fn close(&self) -> VtrackResult<()>;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub entry_count: usize,
    pub file_size_bytes: u64,
    pub last_load_duration: Duration,
}
