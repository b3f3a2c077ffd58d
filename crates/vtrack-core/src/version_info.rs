//! Per-coordinate tracking record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactKey};
use crate::blacklist::Blacklist;
use crate::serde_millis;
use crate::version::{compare_versions, Version};

/// Everything the server knows about one `(groupId, artifactId)`.
///
/// `versions` is an ordered set, unique by version string. The
/// `latest_*_version` fields are recomputed copies of members of
/// `versions`; callers receive owned snapshots and never references into
/// shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub artifact: Artifact,
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub last_request_date: Option<DateTime<Utc>>,
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub last_success_date: Option<DateTime<Utc>>,
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub last_failure_date: Option<DateTime<Utc>>,
    /// The upstream-reported metadata mtime, not the local fetch time.
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub last_repository_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_release_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_snapshot_version: Option<Version>,
    #[serde(default)]
    pub versions: Vec<Version>,
}

impl VersionInfo {
    pub fn new(artifact: Artifact, creation_date: DateTime<Utc>) -> Self {
        Self {
            artifact,
            creation_date: Some(creation_date),
            last_request_date: None,
            last_success_date: None,
            last_failure_date: None,
            last_repository_update: None,
            latest_release_version: None,
            latest_snapshot_version: None,
            versions: Vec::new(),
        }
    }

    pub fn key(&self) -> ArtifactKey {
        self.artifact.key()
    }

    pub fn has_versions(&self) -> bool {
        !self.versions.is_empty()
    }

    /// `max(last_success_date, last_failure_date)`, absent counting as
    /// minus infinity.
    pub fn last_polled_date(&self) -> Option<DateTime<Utc>> {
        match (self.last_success_date, self.last_failure_date) {
            (Some(s), Some(f)) => Some(s.max(f)),
            (Some(s), None) => Some(s),
            (None, Some(f)) => Some(f),
            (None, None) => None,
        }
    }

    /// True iff the most recent poll was a failure.
    pub fn last_poll_failed(&self) -> bool {
        match (self.last_success_date, self.last_failure_date) {
            (Some(s), Some(f)) => f > s,
            (None, Some(_)) => true,
            _ => false,
        }
    }

    pub fn version(&self, version_string: &str) -> Option<&Version> {
        self.versions
            .iter()
            .find(|v| v.version_string == version_string)
    }

    pub fn version_mut(&mut self, version_string: &str) -> Option<&mut Version> {
        self.versions
            .iter_mut()
            .find(|v| v.version_string == version_string)
    }

    /// Insert a version unless one with the same string already exists.
    /// Existing entries keep their `release_date` and
    /// `first_seen_by_server`. Returns true iff the version was new.
    pub fn add_version(&mut self, version: Version) -> bool {
        if self.version(&version.version_string).is_some() {
            return false;
        }
        self.versions.push(version);
        true
    }

    /// Recompute `latest_release_version` and `latest_snapshot_version`
    /// from `versions`.
    pub fn recompute_latest(&mut self) {
        self.latest_release_version = self
            .versions
            .iter()
            .filter(|v| v.is_release())
            .max_by(|a, b| compare_versions(&a.version_string, &b.version_string))
            .cloned();
        self.latest_snapshot_version = self
            .versions
            .iter()
            .filter(|v| !v.is_release())
            .max_by(|a, b| compare_versions(&a.version_string, &b.version_string))
            .cloned();
    }

    /// Greatest non-blacklisted release version.
    pub fn find_latest_release_version(&self, blacklist: &Blacklist) -> Option<&Version> {
        self.find_latest(blacklist, true)
    }

    /// Greatest non-blacklisted snapshot/qualifier version.
    pub fn find_latest_snapshot_version(&self, blacklist: &Blacklist) -> Option<&Version> {
        self.find_latest(blacklist, false)
    }

    fn find_latest(&self, blacklist: &Blacklist, release: bool) -> Option<&Version> {
        let group_id = &self.artifact.group_id;
        let artifact_id = &self.artifact.artifact_id;
        self.versions
            .iter()
            .filter(|v| v.is_release() == release)
            .filter(|v| !blacklist.is_version_blacklisted(group_id, artifact_id, &v.version_string))
            .max_by(|a, b| compare_versions(&a.version_string, &b.version_string))
    }

    /// Backfill `first_seen_by_server` on versions loaded from a format
    /// that predates the field.
    pub fn materialize_first_seen(&mut self, loaded_at: DateTime<Utc>) {
        for v in self
            .versions
            .iter_mut()
            .chain(self.latest_release_version.iter_mut())
            .chain(self.latest_snapshot_version.iter_mut())
        {
            if v.first_seen_by_server.is_none() {
                v.first_seen_by_server = Some(loaded_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info() -> VersionInfo {
        VersionInfo::new(
            Artifact::new("de.codesourcery", "test", "1.0.0"),
            Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn add_version_deduplicates() {
        let mut i = info();
        let seen = Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap();
        assert!(i.add_version(Version::first_seen("1.0.0", seen)));
        assert!(!i.add_version(Version::new("1.0.0")));
        assert_eq!(i.versions.len(), 1);
        // The original first_seen survives the duplicate add.
        assert_eq!(i.versions[0].first_seen_by_server, Some(seen));
    }

    #[test]
    fn recompute_latest_partitions_releases_and_snapshots() {
        let mut i = info();
        for v in ["1.0.0", "1.0.1", "1.1-SNAPSHOT", "1.0-beta"] {
            i.add_version(Version::new(v));
        }
        i.recompute_latest();
        assert_eq!(
            i.latest_release_version.as_ref().unwrap().version_string,
            "1.0.1"
        );
        assert_eq!(
            i.latest_snapshot_version.as_ref().unwrap().version_string,
            "1.1-SNAPSHOT"
        );
    }

    #[test]
    fn find_latest_skips_blacklisted() {
        let mut i = info();
        i.add_version(Version::new("1.0.0"));
        i.add_version(Version::new("1.0.1"));
        let mut bl = Blacklist::new();
        bl.add_artifact(
            "de.codesourcery",
            "test",
            crate::blacklist::VersionMatcher::Exact("1.0.1".to_string()),
        );
        assert_eq!(
            i.find_latest_release_version(&bl).unwrap().version_string,
            "1.0.0"
        );
    }

    #[test]
    fn never_blacklist_hides_all_versions() {
        let mut i = info();
        i.add_version(Version::new("1.0.0"));
        i.add_version(Version::new("2.0-SNAPSHOT"));
        let mut bl = Blacklist::new();
        bl.add_group("de.codesourcery", crate::blacklist::VersionMatcher::Never);
        assert!(bl.is_all_versions_blacklisted("de.codesourcery", "test"));
        assert!(i.find_latest_release_version(&bl).is_none());
        assert!(i.find_latest_snapshot_version(&bl).is_none());
    }

    #[test]
    fn last_polled_is_max_of_success_and_failure() {
        let mut i = info();
        assert_eq!(i.last_polled_date(), None);
        let success = Utc.with_ymd_and_hms(2022, 7, 2, 0, 0, 0).unwrap();
        let failure = Utc.with_ymd_and_hms(2022, 7, 3, 0, 0, 0).unwrap();
        i.last_success_date = Some(success);
        assert_eq!(i.last_polled_date(), Some(success));
        assert!(!i.last_poll_failed());
        i.last_failure_date = Some(failure);
        assert_eq!(i.last_polled_date(), Some(failure));
        assert!(i.last_poll_failed());
    }

    #[test]
    fn materialize_first_seen_fills_gaps_only() {
        let mut i = info();
        let seen = Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap();
        let loaded = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        i.add_version(Version::first_seen("1.0.0", seen));
        i.add_version(Version::new("1.0.1"));
        i.recompute_latest();
        i.materialize_first_seen(loaded);
        assert_eq!(i.version("1.0.0").unwrap().first_seen_by_server, Some(seen));
        assert_eq!(
            i.version("1.0.1").unwrap().first_seen_by_server,
            Some(loaded)
        );
        assert_eq!(
            i.latest_release_version
                .as_ref()
                .unwrap()
                .first_seen_by_server,
            Some(loaded)
        );
    }
}
