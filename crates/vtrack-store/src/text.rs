//! Text on-disk format: one JSON document `{ "entries": [...] }`.
//!
//! Kept for interop and manual inspection; timestamps are epoch
//! milliseconds so the binary format round-trips through it losslessly.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vtrack_core::version_info::VersionInfo;
use vtrack_util::errors::{VtrackError, VtrackResult};

#[derive(Serialize, Deserialize)]
struct Document {
    entries: Vec<VersionInfo>,
}

pub fn write_entries<W: Write>(out: W, entries: &[VersionInfo]) -> VtrackResult<()> {
    let document = Document {
        entries: entries.to_vec(),
    };
    serde_json::to_writer_pretty(out, &document).map_err(|e| {
        VtrackError::Storage {
            message: format!("Failed to write text data file: {e}"),
        }
        .into()
    })
}

pub fn read_entries<R: Read>(input: R, loaded_at: DateTime<Utc>) -> VtrackResult<Vec<VersionInfo>> {
    let document: Document =
        serde_json::from_reader(input).map_err(|e| VtrackError::Storage {
            message: format!("Failed to parse text data file: {e}"),
        })?;
    let mut entries = document.entries;
    for info in &mut entries {
        info.materialize_first_seen(loaded_at);
    }
    Ok(entries)
}
