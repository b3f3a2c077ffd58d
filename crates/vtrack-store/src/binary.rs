//! Binary on-disk format.
//!
//! Layout: 6-byte magic, 2-byte format version, then a tagged-record
//! stream of `VersionData` frames terminated by an `EndOfFile` tag. The
//! writer always emits [`FORMAT_VERSION`]; the reader accepts
//! [`MIN_SUPPORTED_VERSION`]..=[`FORMAT_VERSION`] and synthesizes fields
//! that older versions lacked:
//!
//! - v1: base layout, no `lastRepositoryUpdate`, no `firstSeenByServer`
//! - v2: adds `lastRepositoryUpdate` per entry
//! - v3: adds `firstSeenByServer` per version

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use vtrack_codec::{CodecError, CodecResult, Decoder, Encoder, RecordTag};
use vtrack_core::artifact::Artifact;
use vtrack_core::version::Version;
use vtrack_core::version_info::VersionInfo;
use vtrack_util::errors::{VtrackError, VtrackResult};

/// File magic: `VTRK` followed by two fixed bytes.
pub const MAGIC: [u8; 6] = *b"VTRK\x00\x01";

/// The format version the writer emits.
pub const FORMAT_VERSION: u16 = 3;

/// Oldest format version the reader still understands.
pub const MIN_SUPPORTED_VERSION: u16 = 1;

pub fn write_entries<W: Write>(out: W, entries: &[VersionInfo]) -> VtrackResult<()> {
    write_entries_inner(out, entries).map_err(|e| storage_error("write", e).into())
}

fn write_entries_inner<W: Write>(out: W, entries: &[VersionInfo]) -> CodecResult<()> {
    let mut enc = Encoder::new(out);
    enc.write_raw(&MAGIC)?;
    enc.write_u16(FORMAT_VERSION)?;
    for info in entries {
        enc.write_tag(RecordTag::VersionData)?;
        write_version_info(&mut enc, info)?;
    }
    enc.write_tag(RecordTag::EndOfFile)?;
    enc.flush()
}

/// Read every entry. Returns the entries and the format version found in
/// the file header; versions loaded without a `firstSeenByServer` get
/// `loaded_at` as their first-seen instant.
pub fn read_entries<R: Read>(
    input: R,
    loaded_at: DateTime<Utc>,
) -> VtrackResult<(Vec<VersionInfo>, u16)> {
    let mut dec = Decoder::new(input);

    let mut magic = [0u8; 6];
    dec.read_raw(&mut magic)
        .map_err(|e| storage_error("read header of", e))?;
    if magic != MAGIC {
        return Err(VtrackError::InvalidFormat {
            message: format!("bad magic {magic:02x?}"),
        }
        .into());
    }
    let format_version = dec
        .read_u16()
        .map_err(|e| storage_error("read header of", e))?;
    if !(MIN_SUPPORTED_VERSION..=FORMAT_VERSION).contains(&format_version) {
        return Err(VtrackError::InvalidFormat {
            message: format!("unsupported format version {format_version}"),
        }
        .into());
    }

    let mut entries = Vec::new();
    loop {
        let eof = dec.is_eof().map_err(|e| storage_error("read", e))?;
        if eof {
            break;
        }
        match dec.read_tag().map_err(|e| storage_error("read", e))? {
            RecordTag::EndOfFile => break,
            RecordTag::VersionData => {
                let mut info = read_version_info(&mut dec, format_version)
                    .map_err(|e| storage_error("read record from", e))?;
                info.materialize_first_seen(loaded_at);
                entries.push(info);
            }
        }
    }
    Ok((entries, format_version))
}

fn write_version_info<W: Write>(enc: &mut Encoder<W>, info: &VersionInfo) -> CodecResult<()> {
    enc.write_string(&info.artifact.group_id)?;
    enc.write_string(&info.artifact.artifact_id)?;
    enc.write_string(&info.artifact.version)?;
    enc.write_opt_string(info.artifact.classifier.as_deref())?;
    enc.write_string(&info.artifact.packaging)?;

    enc.write_opt_timestamp(info.creation_date)?;
    enc.write_opt_timestamp(info.last_request_date)?;
    enc.write_opt_timestamp(info.last_success_date)?;
    enc.write_opt_timestamp(info.last_failure_date)?;
    enc.write_opt_timestamp(info.last_repository_update)?;

    write_opt_version(enc, info.latest_release_version.as_ref())?;
    write_opt_version(enc, info.latest_snapshot_version.as_ref())?;

    enc.write_i32(info.versions.len() as i32)?;
    for version in &info.versions {
        write_version(enc, version)?;
    }
    Ok(())
}

fn read_version_info<R: Read>(
    dec: &mut Decoder<R>,
    format_version: u16,
) -> CodecResult<VersionInfo> {
    let group_id = dec.read_string()?;
    let artifact_id = dec.read_string()?;
    let version = dec.read_string()?;
    let classifier = dec.read_opt_string()?;
    let packaging = dec.read_string()?;
    let mut artifact = Artifact::new(&group_id, &artifact_id, &version);
    artifact.classifier = classifier;
    artifact.packaging = packaging;

    let creation_date = dec.read_opt_timestamp()?;
    let last_request_date = dec.read_opt_timestamp()?;
    let last_success_date = dec.read_opt_timestamp()?;
    let last_failure_date = dec.read_opt_timestamp()?;
    let last_repository_update = if format_version >= 2 {
        dec.read_opt_timestamp()?
    } else {
        None
    };

    let latest_release_version = read_opt_version(dec, format_version)?;
    let latest_snapshot_version = read_opt_version(dec, format_version)?;

    let count = dec.read_i32()?;
    if count < 0 {
        return Err(CodecError::InvalidLength(count));
    }
    let mut versions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        versions.push(read_version(dec, format_version)?);
    }

    Ok(VersionInfo {
        artifact,
        creation_date,
        last_request_date,
        last_success_date,
        last_failure_date,
        last_repository_update,
        latest_release_version,
        latest_snapshot_version,
        versions,
    })
}

fn write_opt_version<W: Write>(enc: &mut Encoder<W>, version: Option<&Version>) -> CodecResult<()> {
    match version {
        None => enc.write_bool(false),
        Some(v) => {
            enc.write_bool(true)?;
            write_version(enc, v)
        }
    }
}

fn read_opt_version<R: Read>(
    dec: &mut Decoder<R>,
    format_version: u16,
) -> CodecResult<Option<Version>> {
    if !dec.read_bool()? {
        return Ok(None);
    }
    read_version(dec, format_version).map(Some)
}

fn write_version<W: Write>(enc: &mut Encoder<W>, version: &Version) -> CodecResult<()> {
    enc.write_string(&version.version_string)?;
    enc.write_opt_timestamp(version.release_date)?;
    enc.write_opt_timestamp(version.first_seen_by_server)
}

fn read_version<R: Read>(dec: &mut Decoder<R>, format_version: u16) -> CodecResult<Version> {
    let version_string = dec.read_string()?;
    let release_date = dec.read_opt_timestamp()?;
    let first_seen_by_server = if format_version >= 3 {
        dec.read_opt_timestamp()?
    } else {
        None
    };
    Ok(Version {
        version_string,
        release_date,
        first_seen_by_server,
    })
}

fn storage_error(action: &str, cause: CodecError) -> VtrackError {
    match cause {
        CodecError::EndOfStream => VtrackError::Storage {
            message: format!("Failed to {action} data file: truncated record"),
        },
        other => VtrackError::Storage {
            message: format!("Failed to {action} data file: {other}"),
        },
    }
}
