//! Upstream Maven repository protocol: URL layout, metadata parsing,
//! HTTP fetch with retry and backoff, and release-date scraping from
//! repository listing pages.

pub mod fetch;
pub mod listing;
pub mod metadata;
pub mod provider;
pub mod repository;

pub use provider::{MavenRepoClient, UpdateOutcome, UpstreamProvider};
pub use repository::MavenRepository;
