use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all vtrack operations.
#[derive(Debug, Error, Diagnostic)]
pub enum VtrackError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The data file header is neither JSON text nor a known binary format.
    #[error("Unrecognized data file format: {message}")]
    #[diagnostic(help("The data file must start with '{{' (text) or the VTRK magic (binary)"))]
    InvalidFormat { message: String },

    /// Reading or writing the artifact store failed.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Network request failed (transient upstream conditions are retried
    /// before this surfaces).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The upstream repository answered but its payload could not be used.
    #[error("Upstream repository error: {message}")]
    Upstream { message: String },

    /// The upstream repository has no such coordinate.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// A deadline elapsed or shutdown was requested; partial results may
    /// still have been returned.
    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    /// Invalid configuration file or value.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check the properties file named by versiontracker.config.file"))]
    Config { message: String },

    /// Caller supplied an invalid argument; surfaced as a bad-request signal.
    #[error("Bad request: {message}")]
    BadRequest { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type VtrackResult<T> = miette::Result<T>;
