//! In-process dispatcher behind the query endpoint.

use std::sync::Arc;

use vtrack_core::artifact::Artifact;
use vtrack_core::blacklist::Blacklist;
use vtrack_core::version::{compare_versions, is_release_version, Version};
use vtrack_core::version_info::VersionInfo;
use vtrack_util::errors::{VtrackError, VtrackResult};

use crate::proto::{
    ArtifactResponse, QueryRequest, QueryResponse, UpdateAvailable, VersionDto, COMMAND_QUERY,
};
use crate::tracker::{StalePolicy, VersionTracker};

/// Version string reported in every response.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wires the tracker, the server-side blacklist and the staleness policy
/// into the fixed query protocol.
pub struct ApiFacade {
    tracker: Arc<VersionTracker>,
    server_blacklist: Blacklist,
    policy: StalePolicy,
}

impl ApiFacade {
    pub fn new(tracker: Arc<VersionTracker>, server_blacklist: Blacklist, policy: StalePolicy) -> Self {
        Self {
            tracker,
            server_blacklist,
            policy,
        }
    }

    /// Answer one batch query. Per-artifact upstream failures degrade the
    /// answer (`MAYBE`/`NOT_FOUND`); only a malformed request fails.
    pub async fn process_query(&self, request: QueryRequest) -> VtrackResult<QueryResponse> {
        if request.command != COMMAND_QUERY {
            return Err(VtrackError::BadRequest {
                message: format!("unsupported command '{}'", request.command),
            }
            .into());
        }
        tracing::debug!(
            "Query from client {} for {} artifacts",
            request.client_version,
            request.artifacts.len()
        );

        let mut blacklist = self.server_blacklist.clone();
        if let Some(ref requested) = request.blacklist {
            blacklist.merge(requested);
        }

        let results = self
            .tracker
            .get_version_info(&request.artifacts, self.policy.as_predicate())
            .await?;

        let mut artifacts = Vec::with_capacity(request.artifacts.len());
        for artifact in &request.artifacts {
            let entry = match results.get(artifact) {
                Some(info) => classify(info, artifact, &blacklist),
                None => ArtifactResponse {
                    artifact: artifact.clone(),
                    current_version: None,
                    latest_version: None,
                    update_available: UpdateAvailable::NotFound,
                },
            };
            artifacts.push(entry);
        }

        Ok(QueryResponse {
            server_version: SERVER_VERSION.to_string(),
            artifacts,
        })
    }
}

/// Resolve one artifact against its tracking record.
///
/// The latest version is picked from the release or snapshot partition
/// according to the request version, honoring the blacklist. The request
/// version compares against it with `>= 0` meaning no update; an absent
/// side yields `MAYBE`.
fn classify(info: &VersionInfo, artifact: &Artifact, blacklist: &Blacklist) -> ArtifactResponse {
    if !info.has_versions() {
        return ArtifactResponse {
            artifact: artifact.clone(),
            current_version: None,
            latest_version: None,
            update_available: UpdateAvailable::NotFound,
        };
    }

    let latest = if is_release_version(&artifact.version) {
        info.find_latest_release_version(blacklist)
    } else {
        info.find_latest_snapshot_version(blacklist)
    };

    let current = info
        .version(&artifact.version)
        .cloned()
        .unwrap_or_else(|| Version::new(&artifact.version));

    let update_available = match latest {
        None => UpdateAvailable::Maybe,
        Some(latest) => {
            if compare_versions(&artifact.version, &latest.version_string).is_ge() {
                UpdateAvailable::No
            } else {
                UpdateAvailable::Yes
            }
        }
    };

    ArtifactResponse {
        artifact: artifact.clone(),
        current_version: Some(VersionDto::from(&current)),
        latest_version: latest.map(VersionDto::from),
        update_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vtrack_core::blacklist::VersionMatcher;

    fn record(versions: &[&str]) -> VersionInfo {
        let mut info = VersionInfo::new(Artifact::new("g", "a", "1.0.0"), Utc::now());
        for v in versions {
            info.add_version(Version::first_seen(v, Utc::now()));
        }
        info.recompute_latest();
        info
    }

    #[test]
    fn empty_record_is_not_found() {
        let info = record(&[]);
        let response = classify(&info, &Artifact::new("g", "a", "1.0.0"), &Blacklist::new());
        assert_eq!(response.update_available, UpdateAvailable::NotFound);
        assert!(response.current_version.is_none());
        assert!(response.latest_version.is_none());
    }

    #[test]
    fn newer_release_is_yes() {
        let info = record(&["1.0.0", "1.0.1"]);
        let response = classify(&info, &Artifact::new("g", "a", "1.0.0"), &Blacklist::new());
        assert_eq!(response.update_available, UpdateAvailable::Yes);
        assert_eq!(
            response.latest_version.unwrap().version_string,
            "1.0.1"
        );
    }

    #[test]
    fn equal_or_newer_request_is_no() {
        let info = record(&["1.0.0", "1.0.1"]);
        for version in ["1.0.1", "1.0.2"] {
            let response = classify(&info, &Artifact::new("g", "a", version), &Blacklist::new());
            assert_eq!(response.update_available, UpdateAvailable::No, "{version}");
        }
    }

    #[test]
    fn snapshot_request_resolves_against_snapshots() {
        let info = record(&["1.0.0", "1.0.1", "1.1-SNAPSHOT"]);
        let response = classify(
            &info,
            &Artifact::new("g", "a", "1.0-SNAPSHOT"),
            &Blacklist::new(),
        );
        assert_eq!(response.update_available, UpdateAvailable::Yes);
        assert_eq!(
            response.latest_version.unwrap().version_string,
            "1.1-SNAPSHOT"
        );
    }

    #[test]
    fn fully_blacklisted_latest_is_maybe() {
        let info = record(&["1.0.0", "1.0.1"]);
        let mut blacklist = Blacklist::new();
        blacklist.add_group("g", VersionMatcher::Never);
        let response = classify(&info, &Artifact::new("g", "a", "1.0.0"), &blacklist);
        assert_eq!(response.update_available, UpdateAvailable::Maybe);
        assert!(response.latest_version.is_none());
    }

    #[test]
    fn unknown_request_version_still_gets_a_current_version() {
        let info = record(&["1.0.0", "1.0.1"]);
        let response = classify(&info, &Artifact::new("g", "a", "0.9.9"), &Blacklist::new());
        assert_eq!(
            response.current_version.unwrap().version_string,
            "0.9.9"
        );
        assert_eq!(response.update_available, UpdateAvailable::Yes);
    }
}
