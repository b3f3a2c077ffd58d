//! Three-tier version blacklist: global, per-group, per-(group, artifact).
//!
//! Matchers are exact strings, regular expressions, or the distinguished
//! NEVER matcher that ignores every version of a coordinate. Evaluation
//! order is global, then group, then artifact tier, short-circuiting on the
//! first match. The group tier covers the named group and its dotted
//! subgroups, so a NEVER matcher under `com.voipfuture` also silences
//! `com.voipfuture.test`.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// A single version pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "MatcherRepr", into = "MatcherRepr")]
pub enum VersionMatcher {
    Exact(String),
    Pattern(RegexPattern),
    /// Matches every version. Serialized as regex `.*`.
    Never,
}

/// Regex matcher whose compilation is memoized after first use.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    pattern: String,
    compiled: OnceCell<Option<Regex>>,
}

impl RegexPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            compiled: OnceCell::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn matches(&self, version: &str) -> bool {
        let compiled = self.compiled.get_or_init(|| match Regex::new(&self.pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Ignoring unparseable blacklist pattern '{}': {e}", self.pattern);
                None
            }
        });
        compiled
            .as_ref()
            .map(|re| re.is_match(version))
            .unwrap_or(false)
    }
}

impl VersionMatcher {
    pub fn regex(pattern: &str) -> Self {
        if pattern == ".*" {
            VersionMatcher::Never
        } else {
            VersionMatcher::Pattern(RegexPattern::new(pattern))
        }
    }

    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionMatcher::Exact(p) => p == version,
            VersionMatcher::Pattern(p) => p.matches(version),
            VersionMatcher::Never => true,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, VersionMatcher::Never)
    }
}

/// Equality by (kind, pattern); compiled state is irrelevant.
impl PartialEq for VersionMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VersionMatcher::Exact(a), VersionMatcher::Exact(b)) => a == b,
            (VersionMatcher::Pattern(a), VersionMatcher::Pattern(b)) => a.pattern == b.pattern,
            (VersionMatcher::Never, VersionMatcher::Never) => true,
            _ => false,
        }
    }
}

impl Eq for VersionMatcher {}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatcherRepr {
    pattern: String,
    kind: MatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Regex,
}

impl From<MatcherRepr> for VersionMatcher {
    fn from(repr: MatcherRepr) -> Self {
        match repr.kind {
            MatchKind::Exact => VersionMatcher::Exact(repr.pattern),
            MatchKind::Regex => VersionMatcher::regex(&repr.pattern),
        }
    }
}

impl From<VersionMatcher> for MatcherRepr {
    fn from(matcher: VersionMatcher) -> Self {
        match matcher {
            VersionMatcher::Exact(pattern) => MatcherRepr {
                pattern,
                kind: MatchKind::Exact,
            },
            VersionMatcher::Pattern(p) => MatcherRepr {
                pattern: p.pattern,
                kind: MatchKind::Regex,
            },
            VersionMatcher::Never => MatcherRepr {
                pattern: ".*".to_string(),
                kind: MatchKind::Regex,
            },
        }
    }
}

/// The three matcher tiers. Fields stay private; every query takes the
/// tiers in evaluation order through the methods below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Blacklist {
    global: Vec<VersionMatcher>,
    groups: BTreeMap<String, Vec<VersionMatcher>>,
    artifacts: BTreeMap<String, BTreeMap<String, Vec<VersionMatcher>>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add under the global tier. Duplicate (pattern, kind) adds are no-ops.
    pub fn add_global(&mut self, matcher: VersionMatcher) {
        push_unique(&mut self.global, matcher);
    }

    pub fn add_group(&mut self, group_id: &str, matcher: VersionMatcher) {
        push_unique(self.groups.entry(group_id.to_string()).or_default(), matcher);
    }

    pub fn add_artifact(&mut self, group_id: &str, artifact_id: &str, matcher: VersionMatcher) {
        push_unique(
            self.artifacts
                .entry(group_id.to_string())
                .or_default()
                .entry(artifact_id.to_string())
                .or_default(),
            matcher,
        );
    }

    pub fn is_version_blacklisted(&self, group_id: &str, artifact_id: &str, version: &str) -> bool {
        self.applicable(group_id, artifact_id)
            .any(|m| m.matches(version))
    }

    pub fn is_artifact_blacklisted(&self, artifact: &Artifact) -> bool {
        self.is_version_blacklisted(&artifact.group_id, &artifact.artifact_id, &artifact.version)
    }

    /// True iff any applicable tier contains the NEVER matcher.
    pub fn is_all_versions_blacklisted(&self, group_id: &str, artifact_id: &str) -> bool {
        self.applicable(group_id, artifact_id).any(|m| m.is_never())
    }

    /// Fold another blacklist into this one (request blacklists are merged
    /// over the server defaults).
    pub fn merge(&mut self, other: &Blacklist) {
        for m in &other.global {
            self.add_global(m.clone());
        }
        for (group, matchers) in &other.groups {
            for m in matchers {
                self.add_group(group, m.clone());
            }
        }
        for (group, by_artifact) in &other.artifacts {
            for (artifact, matchers) in by_artifact {
                for m in matchers {
                    self.add_artifact(group, artifact, m.clone());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.groups.is_empty() && self.artifacts.is_empty()
    }

    pub fn global_matchers(&self) -> &[VersionMatcher] {
        &self.global
    }

    pub fn group_entries(&self) -> impl Iterator<Item = (&str, &[VersionMatcher])> {
        self.groups.iter().map(|(g, m)| (g.as_str(), m.as_slice()))
    }

    pub fn artifact_entries(&self) -> impl Iterator<Item = (&str, &str, &[VersionMatcher])> {
        self.artifacts.iter().flat_map(|(g, by_artifact)| {
            by_artifact
                .iter()
                .map(move |(a, m)| (g.as_str(), a.as_str(), m.as_slice()))
        })
    }

    /// Matchers in evaluation order: global, group tier, artifact tier.
    fn applicable<'a>(
        &'a self,
        group_id: &'a str,
        artifact_id: &'a str,
    ) -> impl Iterator<Item = &'a VersionMatcher> {
        let group_tier = self
            .groups
            .iter()
            .filter(move |(entry, _)| group_covers(entry, group_id))
            .flat_map(|(_, matchers)| matchers.iter());
        let artifact_tier = self
            .artifacts
            .iter()
            .filter(move |(entry, _)| group_covers(entry, group_id))
            .flat_map(move |(_, by_artifact)| {
                by_artifact
                    .get(artifact_id)
                    .into_iter()
                    .flat_map(|matchers| matchers.iter())
            });
        self.global.iter().chain(group_tier).chain(artifact_tier)
    }
}

fn push_unique(matchers: &mut Vec<VersionMatcher>, matcher: VersionMatcher) {
    if !matchers.contains(&matcher) {
        matchers.push(matcher);
    }
}

/// A group tier entry covers the group itself and its dotted subgroups.
fn group_covers(entry: &str, group_id: &str) -> bool {
    group_id == entry
        || group_id
            .strip_prefix(entry)
            .is_some_and(|rest| rest.starts_with('.'))
}
