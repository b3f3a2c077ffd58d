//! Maven repository URL layout.

/// Maven Central base URL.
pub const MAVEN_CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2";

/// A Maven repository reachable over HTTP.
#[derive(Debug, Clone)]
pub struct MavenRepository {
    pub url: String,
}

impl MavenRepository {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// Construct the default Maven Central repository.
    pub fn maven_central() -> Self {
        Self::new(MAVEN_CENTRAL_URL)
    }

    /// Group path with dots replaced by slashes.
    ///
    /// `org.apache.commons` becomes `org/apache/commons`.
    pub fn group_path(group: &str) -> String {
        group.replace('.', "/")
    }

    /// URL to the artifact-level `maven-metadata.xml` (version listing).
    pub fn metadata_url(&self, group: &str, artifact: &str) -> String {
        format!(
            "{}/{}/{}/maven-metadata.xml",
            self.url,
            Self::group_path(group),
            artifact
        )
    }

    /// URL to the directory listing for one version, used to scrape the
    /// Last Modified column.
    pub fn version_dir_url(&self, group: &str, artifact: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/{}/",
            self.url,
            Self::group_path(group),
            artifact,
            version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_path_replaces_dots() {
        assert_eq!(
            MavenRepository::group_path("org.apache.commons"),
            "org/apache/commons"
        );
    }

    #[test]
    fn metadata_url_format() {
        let repo = MavenRepository::maven_central();
        assert_eq!(
            repo.metadata_url("org.apache.commons", "commons-lang3"),
            "https://repo.maven.apache.org/maven2/org/apache/commons/commons-lang3/maven-metadata.xml"
        );
    }

    #[test]
    fn version_dir_url_format() {
        let repo = MavenRepository::new("https://repo.example.com/maven/");
        assert_eq!(
            repo.version_dir_url("de.codesourcery", "test", "1.0.1"),
            "https://repo.example.com/maven/de/codesourcery/test/1.0.1/"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let repo = MavenRepository::new("https://repo.example.com/");
        assert_eq!(repo.url, "https://repo.example.com");
    }
}
