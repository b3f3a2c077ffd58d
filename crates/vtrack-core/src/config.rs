//! Server configuration from a Java-properties-style file.
//!
//! The file location comes from `versiontracker.config.file` (checked as a
//! literal environment variable first, then as the conventional
//! `VERSIONTRACKER_CONFIG_FILE` spelling). All keys are optional; missing
//! keys fall back to the defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vtrack_util::errors::VtrackError;
use vtrack_util::time::parse_duration;

use crate::blacklist::{Blacklist, VersionMatcher};

/// Property/environment names for the config file location.
pub const CONFIG_FILE_PROPERTY: &str = "versiontracker.config.file";
pub const CONFIG_FILE_ENV: &str = "VERSIONTRACKER_CONFIG_FILE";

/// Property/environment names overriding the data file path.
pub const DATA_FILE_PROPERTY: &str = "versiontracker.artifact.file";
pub const DATA_FILE_ENV: &str = "VERSIONTRACKER_ARTIFACT_FILE";

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_file: PathBuf,
    pub repository_base_url: String,
    pub update_delay_after_success: Duration,
    pub update_delay_after_failure: Duration,
    pub bg_update_check_interval: Duration,
    pub max_concurrent_threads: usize,
    pub max_locks: usize,
    pub flush_interval: Duration,
    pub batch_deadline: Duration,
    pub listen_address: String,
    pub blacklist: Blacklist,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("versiontracker.data"),
            repository_base_url: "https://repo.maven.apache.org/maven2".to_string(),
            update_delay_after_success: Duration::from_secs(24 * 60 * 60),
            update_delay_after_failure: Duration::from_secs(10 * 60),
            bg_update_check_interval: Duration::from_secs(15 * 60),
            max_concurrent_threads: default_threads(),
            max_locks: 256,
            flush_interval: Duration::from_secs(60),
            batch_deadline: Duration::from_secs(2 * 60),
            listen_address: "127.0.0.1:8087".to_string(),
            blacklist: Blacklist::new(),
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(8)
}

impl Config {
    /// Load from the file named by the config-file variable, or defaults
    /// when no file is configured. The data-file variable, when set,
    /// overrides whatever the file says.
    pub fn load() -> miette::Result<Self> {
        let mut config = match env_override(CONFIG_FILE_PROPERTY, CONFIG_FILE_ENV) {
            Some(path) => Self::from_path(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(data_file) = env_override(DATA_FILE_PROPERTY, DATA_FILE_ENV) {
            config.data_file = PathBuf::from(data_file);
        }
        Ok(config)
    }

    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VtrackError::Config {
            message: format!("Failed to read config file {}: {e}", path.display()),
        })?;
        Self::from_properties(&parse_properties(&content))
    }

    pub fn from_properties(properties: &BTreeMap<String, String>) -> miette::Result<Self> {
        let mut config = Self::default();

        if let Some(groups) = properties.get("blacklistedGroupIds") {
            for group in groups.split(',').map(str::trim).filter(|g| !g.is_empty()) {
                config.blacklist.add_group(group, VersionMatcher::Never);
            }
        }
        if let Some(value) = properties.get("updateDelayAfterSuccess") {
            config.update_delay_after_success = parse_duration(value)?;
        }
        if let Some(value) = properties.get("updateDelayAfterFailure") {
            config.update_delay_after_failure = parse_duration(value)?;
        }
        if let Some(value) = properties.get("bgUpdateCheckInterval") {
            config.bg_update_check_interval = parse_duration(value)?;
        }
        if let Some(value) = properties.get("flushInterval") {
            config.flush_interval = parse_duration(value)?;
        }
        if let Some(value) = properties.get("batchDeadline") {
            config.batch_deadline = parse_duration(value)?;
        }
        if let Some(value) = properties.get("maxConcurrentThreads") {
            config.max_concurrent_threads =
                value.trim().parse().map_err(|_| VtrackError::Config {
                    message: format!("maxConcurrentThreads '{value}' is not a number"),
                })?;
        }
        if let Some(value) = properties.get("maxLocks") {
            config.max_locks = value.trim().parse().map_err(|_| VtrackError::Config {
                message: format!("maxLocks '{value}' is not a number"),
            })?;
        }
        if let Some(value) = properties.get("dataFile") {
            config.data_file = PathBuf::from(value.trim());
        }
        if let Some(value) = properties.get("repositoryBaseUrl") {
            config.repository_base_url = value.trim().trim_end_matches('/').to_string();
        }
        if let Some(value) = properties.get("listenAddress") {
            config.listen_address = value.trim().to_string();
        }

        Ok(config)
    }
}

/// Parse `key=value` lines; `#` starts a comment, blank lines are ignored.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

/// Look up `dotted` first (Java system-property spelling), then the
/// conventional environment spelling.
fn env_override(dotted: &str, screaming: &str) -> Option<String> {
    std::env::var(dotted)
        .or_else(|_| std::env::var(screaming))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_parsing_skips_comments_and_blanks() {
        let props = parse_properties(
            "# a comment\n\n dataFile = /var/lib/vtrack.data \nmaxConcurrentThreads=4\n",
        );
        assert_eq!(props.get("dataFile").map(String::as_str), Some("/var/lib/vtrack.data"));
        assert_eq!(props.get("maxConcurrentThreads").map(String::as_str), Some("4"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn blacklisted_group_ids_become_never_matchers() {
        let props = parse_properties("blacklistedGroupIds=com.voipfuture,org.apache.tomcat\n");
        let config = Config::from_properties(&props).unwrap();
        assert!(config
            .blacklist
            .is_all_versions_blacklisted("com.voipfuture.test", "x"));
        assert!(config
            .blacklist
            .is_all_versions_blacklisted("org.apache.tomcat", "y"));
        assert!(!config
            .blacklist
            .is_all_versions_blacklisted("org.apache.mina", "z"));
    }

    #[test]
    fn durations_and_counts() {
        let props = parse_properties(
            "updateDelayAfterSuccess=12h\nupdateDelayAfterFailure=5m\nbgUpdateCheckInterval=30m\nmaxConcurrentThreads=16\n",
        );
        let config = Config::from_properties(&props).unwrap();
        assert_eq!(
            config.update_delay_after_success,
            Duration::from_secs(12 * 3600)
        );
        assert_eq!(config.update_delay_after_failure, Duration::from_secs(300));
        assert_eq!(
            config.bg_update_check_interval,
            Duration::from_secs(30 * 60)
        );
        assert_eq!(config.max_concurrent_threads, 16);
    }

    #[test]
    fn invalid_duration_is_a_config_error() {
        let props = parse_properties("updateDelayAfterSuccess=12x\n");
        assert!(Config::from_properties(&props).is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(
            config.update_delay_after_success,
            Duration::from_secs(86_400)
        );
        assert_eq!(config.update_delay_after_failure, Duration::from_secs(600));
        assert_eq!(config.bg_update_check_interval, Duration::from_secs(900));
        assert!(config.max_concurrent_threads >= 2);
        assert!(config.blacklist.is_empty());
    }
}
