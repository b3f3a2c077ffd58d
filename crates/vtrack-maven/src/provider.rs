//! The upstream provider: probe one coordinate and fold the result into
//! its tracking record.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use vtrack_core::blacklist::Blacklist;
use vtrack_core::version::Version;
use vtrack_core::version_info::VersionInfo;
use vtrack_util::time::parse_last_updated;

use crate::fetch;
use crate::listing;
use crate::metadata;
use crate::repository::MavenRepository;

/// Terminal classification of one upstream probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The fetch succeeded and changed the record.
    Updated,
    /// The fetch succeeded and nothing changed.
    NoChange,
    /// Upstream has no such coordinate.
    NotFound,
    /// Every version of the coordinate is blacklisted; upstream was not
    /// contacted.
    Blacklisted,
    /// Terminal failure after retries; the record keeps its previous
    /// versions.
    Error,
}

/// Seam between the tracker and the network. The production implementation
/// is [`MavenRepoClient`]; tests substitute scripted providers.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Probe upstream for `info`'s coordinate and merge the result into
    /// `info`. `wanted_dates` names version strings whose release dates
    /// the caller would like scraped from the listing pages.
    async fn update(&self, info: &mut VersionInfo, wanted_dates: &[String]) -> UpdateOutcome;
}

/// Fetches `maven-metadata.xml` and listing pages from one repository.
pub struct MavenRepoClient {
    repository: MavenRepository,
    client: Client,
    blacklist: Blacklist,
}

impl MavenRepoClient {
    pub fn new(repository: MavenRepository, blacklist: Blacklist) -> miette::Result<Self> {
        Ok(Self {
            repository,
            client: fetch::build_client()?,
            blacklist,
        })
    }

    /// Scrape the publication date of one version from its directory
    /// listing. Failures here are per-version and non-fatal.
    async fn fetch_release_date(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        packaging: &str,
    ) -> Option<chrono::DateTime<Utc>> {
        let url = self
            .repository
            .version_dir_url(group_id, artifact_id, version);
        let html = match fetch::fetch_text(&self.client, &url).await {
            Ok(Some(html)) => html,
            Ok(None) => {
                tracing::debug!("No listing page at {url}");
                return None;
            }
            Err(e) => {
                tracing::debug!("Failed to fetch listing {url}: {e}");
                return None;
            }
        };

        let primary = format!("{artifact_id}-{version}.{packaging}");
        listing::parse_last_modified(&html, &primary).or_else(|| {
            let pom = format!("{artifact_id}-{version}.pom");
            listing::parse_last_modified(&html, &pom)
        })
    }
}

#[async_trait]
impl UpstreamProvider for MavenRepoClient {
    async fn update(&self, info: &mut VersionInfo, wanted_dates: &[String]) -> UpdateOutcome {
        let group_id = info.artifact.group_id.clone();
        let artifact_id = info.artifact.artifact_id.clone();
        let packaging = info.artifact.packaging.clone();

        if self
            .blacklist
            .is_all_versions_blacklisted(&group_id, &artifact_id)
        {
            return UpdateOutcome::Blacklisted;
        }

        let url = self.repository.metadata_url(&group_id, &artifact_id);
        let body = match fetch::fetch_text(&self.client, &url).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!("{group_id}:{artifact_id} not found upstream");
                info.last_failure_date = Some(Utc::now());
                return UpdateOutcome::NotFound;
            }
            Err(e) => {
                tracing::warn!("Probe of {group_id}:{artifact_id} failed: {e}");
                info.last_failure_date = Some(Utc::now());
                return UpdateOutcome::Error;
            }
        };

        let meta = match metadata::parse_metadata(&body) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Unparseable metadata for {group_id}:{artifact_id}: {e}");
                info.last_failure_date = Some(Utc::now());
                return UpdateOutcome::Error;
            }
        };

        let now = Utc::now();
        let mut changed = false;

        if let Some(updated) = meta.last_updated.as_deref().and_then(parse_last_updated) {
            if info.last_repository_update != Some(updated) {
                info.last_repository_update = Some(updated);
                changed = true;
            }
        }

        for version in &meta.versions {
            if info.add_version(Version::first_seen(version, now)) {
                changed = true;
            }
        }
        info.recompute_latest();

        // Scrape publication dates for the versions the caller asked
        // about, plus the freshly resolved latests.
        let mut to_date: BTreeSet<String> = wanted_dates.iter().cloned().collect();
        for latest in [&info.latest_release_version, &info.latest_snapshot_version] {
            if let Some(v) = latest {
                to_date.insert(v.version_string.clone());
            }
        }
        for version_string in to_date {
            let missing = info
                .version(&version_string)
                .is_some_and(|v| v.release_date.is_none());
            if !missing {
                continue;
            }
            if let Some(date) = self
                .fetch_release_date(&group_id, &artifact_id, &version_string, &packaging)
                .await
            {
                if let Some(v) = info.version_mut(&version_string) {
                    v.release_date = Some(date);
                    changed = true;
                }
            }
        }
        if changed {
            // Propagate scraped dates into the latest-version copies.
            info.recompute_latest();
        }

        info.last_success_date = Some(Utc::now());
        if changed {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::NoChange
        }
    }
}
