//! vtrackd daemon binary.
//!
//! This is the entry point for the version-tracking server. It initializes
//! logging via `tracing`, parses arguments with `clap`, loads the
//! properties configuration, and serves the query and admin endpoints.

mod cli;
mod server;

use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::parse();
    server::run(args).await
}
