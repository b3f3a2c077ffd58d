//! CLI argument definitions for vtrackd.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "vtrackd",
    version,
    about = "Maven artifact version tracking server",
    long_about = "vtrackd answers batched \"is this dependency out of date?\" queries \
                  against a public Maven repository, caching upstream metadata in a \
                  local data file and refreshing stale entries in the background."
)]
pub struct Cli {
    /// Properties file (overrides versiontracker.config.file)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data file path (overrides the configured dataFile)
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Listen address, host:port
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Write the data file in the text format instead of binary
    #[arg(long)]
    pub text_format: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
