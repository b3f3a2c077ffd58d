//! Core data types for the vtrack server.
//!
//! This crate defines the model shared by every other vtrack crate:
//! artifact coordinates, the Maven-style version ordering, per-coordinate
//! tracking records, the three-tier version blacklist, the two-level
//! artifact index, and server configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod artifact;
pub mod blacklist;
pub mod config;
pub mod index;
pub mod serde_millis;
pub mod version;
pub mod version_info;
