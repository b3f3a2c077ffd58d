//! Flat-file store: one file, text or binary, rewritten on every save.
//!
//! The write format is chosen at open time; reads auto-detect from the
//! first byte (`{` means text, the VTRK magic means binary, anything else
//! is a fatal format error). Writes go to a sibling temp file that is
//! atomically renamed over the live file, so a crashed write leaves the
//! previous contents intact.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use vtrack_core::artifact::ArtifactKey;
use vtrack_core::index::ArtifactIndex;
use vtrack_core::version_info::VersionInfo;
use vtrack_util::errors::{VtrackError, VtrackResult};

use crate::binary;
use crate::store::{StoreStatistics, VersionStore};
use crate::text;

/// On-disk representation the store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Text,
    Binary,
}

#[derive(Debug)]
struct State {
    index: ArtifactIndex<VersionInfo>,
    closed: bool,
    last_load_duration: Duration,
    last_read_format_version: Option<u16>,
}

#[derive(Debug)]
pub struct FlatFileStore {
    path: PathBuf,
    format: StoreFormat,
    state: Mutex<State>,
}

impl FlatFileStore {
    /// Open the store, loading the file if it exists. A missing or empty
    /// file yields an empty store.
    pub fn open(path: &Path, format: StoreFormat) -> VtrackResult<Self> {
        let started = Instant::now();
        let mut last_read_format_version = None;
        let mut index = ArtifactIndex::new();

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(VtrackError::Storage {
                    message: format!("Failed to read {}: {e}", path.display()),
                }
                .into())
            }
        };

        if !bytes.is_empty() {
            let loaded_at = Utc::now();
            let entries = if bytes[0] == b'{' {
                text::read_entries(bytes.as_slice(), loaded_at)?
            } else if bytes.starts_with(&binary::MAGIC) {
                let (entries, version) = binary::read_entries(bytes.as_slice(), loaded_at)?;
                last_read_format_version = Some(version);
                entries
            } else {
                return Err(VtrackError::InvalidFormat {
                    message: format!(
                        "{} starts with 0x{:02x}, expected '{{' or the VTRK magic",
                        path.display(),
                        bytes[0]
                    ),
                }
                .into());
            };
            for info in entries {
                index.put(&info.key(), info);
            }
        }

        tracing::debug!(
            "Loaded {} tracked artifacts from {}",
            index.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            state: Mutex::new(State {
                index,
                closed: false,
                last_load_duration: started.elapsed(),
                last_read_format_version,
            }),
        })
    }

    /// Format version of the file read at open time, if it was binary.
    /// Lets callers detect that a migration rewrite is pending.
    pub fn last_file_read_serialization_version(&self) -> Option<u16> {
        self.state.lock().last_read_format_version
    }

    fn persist(&self, state: &State) -> VtrackResult<()> {
        let mut entries = Vec::with_capacity(state.index.len());
        state.index.visit_values(|info| entries.push(info.clone()));

        let mut buffer = Vec::new();
        match self.format {
            StoreFormat::Text => text::write_entries(&mut buffer, &entries)?,
            StoreFormat::Binary => binary::write_entries(&mut buffer, &entries)?,
        }

        let tmp_path = sibling_temp_path(&self.path);
        std::fs::write(&tmp_path, &buffer).map_err(|e| VtrackError::Storage {
            message: format!("Failed to write {}: {e}", tmp_path.display()),
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| VtrackError::Storage {
            message: format!("Failed to replace {}: {e}", self.path.display()),
        })?;
        Ok(())
    }

    fn ensure_open(state: &State) -> VtrackResult<()> {
        if state.closed {
            return Err(VtrackError::Storage {
                message: "store is closed".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl VersionStore for FlatFileStore {
    fn get_all_versions(&self) -> VtrackResult<Vec<VersionInfo>> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        let mut all = Vec::with_capacity(state.index.len());
        state.index.visit_values(|info| all.push(info.clone()));
        Ok(all)
    }

    fn get_version_info(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> VtrackResult<Option<VersionInfo>> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        Ok(state.index.get(group_id, artifact_id).cloned())
    }

    fn save_or_update(&self, info: &VersionInfo) -> VtrackResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.index.put(&info.key(), info.clone());
        self.persist(&state)
    }

    fn save_or_update_all(&self, infos: &[VersionInfo]) -> VtrackResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        let upserts: Vec<(ArtifactKey, VersionInfo)> =
            infos.iter().map(|i| (i.key(), i.clone())).collect();
        state.index.replace_all(&[], upserts);
        self.persist(&state)
    }

    fn statistics(&self) -> VtrackResult<StoreStatistics> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        let file_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoreStatistics {
            entry_count: state.index.len(),
            file_size_bytes,
            last_load_duration: state.last_load_duration,
        })
    }

    fn close(&self) -> VtrackResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        // Every save already persisted; nothing is pending here.
        state.closed = true;
        Ok(())
    }
}
