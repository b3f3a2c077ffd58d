//! Version values and the ordering used to pick "latest".
//!
//! The ordering splits version strings on `.`, `-` and `_` and compares
//! component-wise: numeric components compare numerically, alphabetic ones
//! lexicographically, and a numeric component sorts below an alphabetic one
//! (so `1.0.0-jdk9 < 1.1`). When all shared components are equal the longer
//! version wins. `-SNAPSHOT` is an ordinary alphabetic component.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::serde_millis;

static RELEASE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)*$").expect("release version pattern"));

/// A single upstream version with the timestamps we know about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version_string: String,
    /// When this version was first published upstream, if we scraped it.
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    /// When this server first observed the version. Set once, never updated.
    #[serde(default, with = "serde_millis", skip_serializing_if = "Option::is_none")]
    pub first_seen_by_server: Option<DateTime<Utc>>,
}

impl Version {
    pub fn new(version_string: &str) -> Self {
        Self {
            version_string: version_string.to_string(),
            release_date: None,
            first_seen_by_server: None,
        }
    }

    pub fn first_seen(version_string: &str, seen: DateTime<Utc>) -> Self {
        Self {
            version_string: version_string.to_string(),
            release_date: None,
            first_seen_by_server: Some(seen),
        }
    }

    pub fn is_release(&self) -> bool {
        is_release_version(&self.version_string)
    }
}

/// True iff `version` is a pure dotted numeric (`1`, `1.0`, `1.0.0`).
pub fn is_release_version(version: &str) -> bool {
    RELEASE_VERSION.is_match(version)
}

/// Total order on version strings; see the module docs for the rules.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = split_components(a);
    let right: Vec<&str> = split_components(b);

    for (lc, rc) in left.iter().zip(right.iter()) {
        let ord = compare_component(lc, rc);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

fn split_components(version: &str) -> Vec<&str> {
    version.split(['.', '-', '_']).collect()
}

fn compare_component(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_numeric(a, b),
        // Numeric sorts below alphabetic: 1.0.0-jdk9 < 1.1
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn is_numeric(component: &str) -> bool {
    !component.is_empty() && component.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric comparison without parsing, so arbitrarily long digit runs
/// cannot overflow: strip leading zeros, then longer wins, then lexicographic.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
