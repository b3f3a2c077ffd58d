//! The fixed query protocol: request/response records and their two wire
//! encodings.
//!
//! JSON bodies carry timestamps as UTC `yyyyMMddHHmm` strings. Binary
//! bodies are codec output; a framed message starts with one protocol byte
//! (`1` = JSON, `2` = binary) followed by the encoded record.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vtrack_codec::{CodecError, CodecResult, Decoder, Encoder};
use vtrack_core::artifact::Artifact;
use vtrack_core::blacklist::{Blacklist, VersionMatcher};
use vtrack_core::version::Version;
use vtrack_util::errors::{VtrackError, VtrackResult};

pub const PROTOCOL_JSON: u8 = 1;
pub const PROTOCOL_BINARY: u8 = 2;

/// The only command the query endpoint accepts.
pub const COMMAND_QUERY: &str = "query";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub command: String,
    pub client_version: String,
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Blacklist>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub server_version: String,
    pub artifacts: Vec<ArtifactResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResponse {
    pub artifact: Artifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<VersionDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<VersionDto>,
    pub update_available: UpdateAvailable,
}

/// Version as exposed on the wire: string plus publication date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDto {
    pub version_string: String,
    #[serde(default, with = "wire_ts", skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
}

impl From<&Version> for VersionDto {
    fn from(version: &Version) -> Self {
        Self {
            version_string: version.version_string.clone(),
            release_date: version.release_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateAvailable {
    Yes,
    No,
    Maybe,
    NotFound,
}

impl UpdateAvailable {
    fn as_byte(self) -> u8 {
        match self {
            UpdateAvailable::Yes => 0,
            UpdateAvailable::No => 1,
            UpdateAvailable::Maybe => 2,
            UpdateAvailable::NotFound => 3,
        }
    }

    fn from_byte(byte: u8) -> CodecResult<Self> {
        match byte {
            0 => Ok(UpdateAvailable::Yes),
            1 => Ok(UpdateAvailable::No),
            2 => Ok(UpdateAvailable::Maybe),
            3 => Ok(UpdateAvailable::NotFound),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

/// Minute-precision wire timestamps.
mod wire_ts {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use vtrack_util::time::{format_wire_timestamp, parse_wire_timestamp};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&format_wire_timestamp(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => parse_wire_timestamp(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'"))),
        }
    }
}

/// Decode a framed request body: protocol byte, then JSON or codec output.
pub fn decode_framed_request(bytes: &[u8]) -> VtrackResult<(u8, QueryRequest)> {
    let (&protocol, body) = bytes.split_first().ok_or_else(|| VtrackError::BadRequest {
        message: "empty request body".to_string(),
    })?;
    match protocol {
        PROTOCOL_JSON => {
            let request = serde_json::from_slice(body).map_err(|e| VtrackError::BadRequest {
                message: format!("invalid JSON request: {e}"),
            })?;
            Ok((protocol, request))
        }
        PROTOCOL_BINARY => {
            let request = decode_request(body).map_err(|e| VtrackError::BadRequest {
                message: format!("invalid binary request: {e}"),
            })?;
            Ok((protocol, request))
        }
        other => Err(VtrackError::BadRequest {
            message: format!("unknown protocol byte 0x{other:02x}"),
        }
        .into()),
    }
}

/// Encode a framed response in the protocol the request arrived in.
pub fn encode_framed_response(protocol: u8, response: &QueryResponse) -> VtrackResult<Vec<u8>> {
    let mut framed = vec![protocol];
    match protocol {
        PROTOCOL_JSON => {
            let body = serde_json::to_vec(response).map_err(|e| VtrackError::BadRequest {
                message: format!("unencodable response: {e}"),
            })?;
            framed.extend_from_slice(&body);
        }
        PROTOCOL_BINARY => {
            encode_response(&mut framed, response).map_err(|e| VtrackError::BadRequest {
                message: format!("unencodable response: {e}"),
            })?;
        }
        other => {
            return Err(VtrackError::BadRequest {
                message: format!("unknown protocol byte 0x{other:02x}"),
            }
            .into())
        }
    }
    Ok(framed)
}

pub fn encode_request<W: Write>(out: W, request: &QueryRequest) -> CodecResult<()> {
    let mut enc = Encoder::new(out);
    enc.write_string(&request.command)?;
    enc.write_string(&request.client_version)?;
    enc.write_i32(request.artifacts.len() as i32)?;
    for artifact in &request.artifacts {
        write_artifact(&mut enc, artifact)?;
    }
    match &request.blacklist {
        None => enc.write_bool(false)?,
        Some(blacklist) => {
            enc.write_bool(true)?;
            write_blacklist(&mut enc, blacklist)?;
        }
    }
    enc.flush()
}

pub fn decode_request<R: Read>(input: R) -> CodecResult<QueryRequest> {
    let mut dec = Decoder::new(input);
    let command = dec.read_string()?;
    let client_version = dec.read_string()?;
    let count = read_count(&mut dec)?;
    let mut artifacts = Vec::with_capacity(count);
    for _ in 0..count {
        artifacts.push(read_artifact(&mut dec)?);
    }
    let blacklist = if dec.read_bool()? {
        Some(read_blacklist(&mut dec)?)
    } else {
        None
    };
    Ok(QueryRequest {
        command,
        client_version,
        artifacts,
        blacklist,
    })
}

pub fn encode_response<W: Write>(out: W, response: &QueryResponse) -> CodecResult<()> {
    let mut enc = Encoder::new(out);
    enc.write_string(&response.server_version)?;
    enc.write_i32(response.artifacts.len() as i32)?;
    for entry in &response.artifacts {
        write_artifact(&mut enc, &entry.artifact)?;
        write_opt_version_dto(&mut enc, entry.current_version.as_ref())?;
        write_opt_version_dto(&mut enc, entry.latest_version.as_ref())?;
        enc.write_i8(entry.update_available.as_byte() as i8)?;
    }
    enc.flush()
}

pub fn decode_response<R: Read>(input: R) -> CodecResult<QueryResponse> {
    let mut dec = Decoder::new(input);
    let server_version = dec.read_string()?;
    let count = read_count(&mut dec)?;
    let mut artifacts = Vec::with_capacity(count);
    for _ in 0..count {
        let artifact = read_artifact(&mut dec)?;
        let current_version = read_opt_version_dto(&mut dec)?;
        let latest_version = read_opt_version_dto(&mut dec)?;
        let update_available = UpdateAvailable::from_byte(dec.read_i8()? as u8)?;
        artifacts.push(ArtifactResponse {
            artifact,
            current_version,
            latest_version,
            update_available,
        });
    }
    Ok(QueryResponse {
        server_version,
        artifacts,
    })
}

fn read_count<R: Read>(dec: &mut Decoder<R>) -> CodecResult<usize> {
    let count = dec.read_i32()?;
    if count < 0 {
        return Err(CodecError::InvalidLength(count));
    }
    Ok(count as usize)
}

fn write_artifact<W: Write>(enc: &mut Encoder<W>, artifact: &Artifact) -> CodecResult<()> {
    enc.write_string(&artifact.group_id)?;
    enc.write_string(&artifact.artifact_id)?;
    enc.write_string(&artifact.version)?;
    enc.write_opt_string(artifact.classifier.as_deref())?;
    enc.write_string(&artifact.packaging)
}

fn read_artifact<R: Read>(dec: &mut Decoder<R>) -> CodecResult<Artifact> {
    let group_id = dec.read_string()?;
    let artifact_id = dec.read_string()?;
    let version = dec.read_string()?;
    let classifier = dec.read_opt_string()?;
    let packaging = dec.read_string()?;
    let mut artifact = Artifact::new(&group_id, &artifact_id, &version);
    artifact.classifier = classifier;
    artifact.packaging = packaging;
    Ok(artifact)
}

fn write_opt_version_dto<W: Write>(
    enc: &mut Encoder<W>,
    version: Option<&VersionDto>,
) -> CodecResult<()> {
    match version {
        None => enc.write_bool(false),
        Some(v) => {
            enc.write_bool(true)?;
            enc.write_string(&v.version_string)?;
            enc.write_opt_timestamp(v.release_date)
        }
    }
}

fn read_opt_version_dto<R: Read>(dec: &mut Decoder<R>) -> CodecResult<Option<VersionDto>> {
    if !dec.read_bool()? {
        return Ok(None);
    }
    Ok(Some(VersionDto {
        version_string: dec.read_string()?,
        release_date: dec.read_opt_timestamp()?,
    }))
}

// Matcher kinds on the binary wire.
const MATCHER_EXACT: i8 = 0;
const MATCHER_REGEX: i8 = 1;
const MATCHER_NEVER: i8 = 2;

fn write_blacklist<W: Write>(enc: &mut Encoder<W>, blacklist: &Blacklist) -> CodecResult<()> {
    let global = blacklist.global_matchers();
    enc.write_i32(global.len() as i32)?;
    for matcher in global {
        write_matcher(enc, matcher)?;
    }

    let groups: Vec<_> = blacklist.group_entries().collect();
    enc.write_i32(groups.len() as i32)?;
    for (group, matchers) in groups {
        enc.write_string(group)?;
        enc.write_i32(matchers.len() as i32)?;
        for matcher in matchers {
            write_matcher(enc, matcher)?;
        }
    }

    let artifacts: Vec<_> = blacklist.artifact_entries().collect();
    enc.write_i32(artifacts.len() as i32)?;
    for (group, artifact, matchers) in artifacts {
        enc.write_string(group)?;
        enc.write_string(artifact)?;
        enc.write_i32(matchers.len() as i32)?;
        for matcher in matchers {
            write_matcher(enc, matcher)?;
        }
    }
    Ok(())
}

fn read_blacklist<R: Read>(dec: &mut Decoder<R>) -> CodecResult<Blacklist> {
    let mut blacklist = Blacklist::new();
    for _ in 0..read_count(dec)? {
        let matcher = read_matcher(dec)?;
        blacklist.add_global(matcher);
    }
    for _ in 0..read_count(dec)? {
        let group = dec.read_string()?;
        for _ in 0..read_count(dec)? {
            let matcher = read_matcher(dec)?;
            blacklist.add_group(&group, matcher);
        }
    }
    for _ in 0..read_count(dec)? {
        let group = dec.read_string()?;
        let artifact = dec.read_string()?;
        for _ in 0..read_count(dec)? {
            let matcher = read_matcher(dec)?;
            blacklist.add_artifact(&group, &artifact, matcher);
        }
    }
    Ok(blacklist)
}

fn write_matcher<W: Write>(enc: &mut Encoder<W>, matcher: &VersionMatcher) -> CodecResult<()> {
    match matcher {
        VersionMatcher::Exact(pattern) => {
            enc.write_i8(MATCHER_EXACT)?;
            enc.write_string(pattern)
        }
        VersionMatcher::Pattern(pattern) => {
            enc.write_i8(MATCHER_REGEX)?;
            enc.write_string(pattern.pattern())
        }
        VersionMatcher::Never => enc.write_i8(MATCHER_NEVER),
    }
}

fn read_matcher<R: Read>(dec: &mut Decoder<R>) -> CodecResult<VersionMatcher> {
    match dec.read_i8()? {
        MATCHER_EXACT => Ok(VersionMatcher::Exact(dec.read_string()?)),
        MATCHER_REGEX => Ok(VersionMatcher::regex(&dec.read_string()?)),
        MATCHER_NEVER => Ok(VersionMatcher::Never),
        other => Err(CodecError::InvalidTag(other as u8)),
    }
}
