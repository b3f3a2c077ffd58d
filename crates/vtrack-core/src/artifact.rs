use serde::{Deserialize, Serialize};

use vtrack_util::errors::VtrackError;

/// A Maven artifact coordinate.
///
/// Identity excluding the version is `(groupId, artifactId, classifier,
/// type)`; the tracking store keys entries by `(groupId, artifactId)` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(rename = "type", default = "default_packaging")]
    pub packaging: String,
}

fn default_packaging() -> String {
    "jar".to_string()
}

impl Artifact {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            classifier: None,
            packaging: default_packaging(),
        }
    }

    /// The store key for this coordinate.
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with("-SNAPSHOT")
    }

    /// The primary repository file name for this coordinate
    /// (`artifactId-version[-classifier].type`).
    pub fn primary_file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, c, self.packaging
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.packaging),
        }
    }

    /// Reject coordinates with empty identifier fields.
    pub fn validate(&self) -> miette::Result<()> {
        if self.group_id.trim().is_empty() {
            return Err(VtrackError::BadRequest {
                message: "groupId must not be empty".to_string(),
            }
            .into());
        }
        if self.artifact_id.trim().is_empty() {
            return Err(VtrackError::BadRequest {
                message: "artifactId must not be empty".to_string(),
            }
            .into());
        }
        if self.version.trim().is_empty() {
            return Err(VtrackError::BadRequest {
                message: format!(
                    "version must not be empty for {}:{}",
                    self.group_id, self.artifact_id
                ),
            }
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id, self.artifact_id, self.version
        )
    }
}

/// The `(groupId, artifactId)` pair a tracking record is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub group_id: String,
    pub artifact_id: String,
}

impl ArtifactKey {
    pub fn new(group_id: &str, artifact_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}
