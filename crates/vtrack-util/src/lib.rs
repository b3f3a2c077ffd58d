//! Shared utilities for the vtrack server.
//!
//! This crate provides cross-cutting concerns used by all other vtrack
//! crates: error types, duration parsing for configuration values, and the
//! timestamp formats spoken by Maven repositories and the wire protocol.

pub mod errors;
pub mod time;
