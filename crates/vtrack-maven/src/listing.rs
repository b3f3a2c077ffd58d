//! Release-date scraping from repository directory listings.
//!
//! Maven Central and Sonatype-style repositories render a version
//! directory as an HTML table of `<a href="file">file</a>` rows followed
//! by a Last Modified cell (`2022-07-20 10:11`). The publication date of a
//! version is the Last Modified value of its primary artifact file, with
//! the POM as a fallback when the primary file is absent (relocations,
//! packaging `pom`).

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static LAST_MODIFIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2})").expect("last-modified pattern"));

/// Find the Last Modified timestamp for `file_name` in a listing page.
pub fn parse_last_modified(html: &str, file_name: &str) -> Option<DateTime<Utc>> {
    for line in html.lines() {
        if !line.contains(file_name) {
            continue;
        }
        if let Some(captures) = LAST_MODIFIED.captures(line) {
            let raw = captures.get(1)?.as_str();
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
                return Some(naive.and_utc());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LISTING: &str = r#"<html>
<head><title>Index of /maven2/de/codesourcery/test/1.0.1</title></head>
<body>
<h1>Index of /maven2/de/codesourcery/test/1.0.1</h1>
<pre>
<a href="../">../</a>
<a href="test-1.0.1.jar">test-1.0.1.jar</a>                2022-07-20 10:11      4523
<a href="test-1.0.1.jar.sha1">test-1.0.1.jar.sha1</a>      2022-07-20 10:11        40
<a href="test-1.0.1.pom">test-1.0.1.pom</a>                2022-07-20 10:10      1832
</pre>
</body>
</html>"#;

    #[test]
    fn finds_primary_artifact_row() {
        let ts = parse_last_modified(LISTING, "test-1.0.1.jar").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2022, 7, 20, 10, 11, 0).unwrap());
    }

    #[test]
    fn finds_pom_row() {
        let ts = parse_last_modified(LISTING, "test-1.0.1.pom").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2022, 7, 20, 10, 10, 0).unwrap());
    }

    #[test]
    fn missing_file_yields_none() {
        assert!(parse_last_modified(LISTING, "test-9.9.9.jar").is_none());
    }

    #[test]
    fn row_without_timestamp_yields_none() {
        let html = r#"<a href="test-1.0.1.jar">test-1.0.1.jar</a>"#;
        assert!(parse_last_modified(html, "test-1.0.1.jar").is_none());
    }
}
