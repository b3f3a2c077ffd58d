//! Framed, self-describing binary codec.
//!
//! All multi-byte values are big-endian two's complement. Booleans are
//! encoded as distinguished bytes (`0x12` true, `0x34` false) so that a
//! desynchronized stream is detected instead of silently misread. Strings
//! and timestamps carry a present flag; strings and byte arrays are
//! length-prefixed.
//!
//! On top of the primitives, a tagged-record stream is defined: each record
//! is a one-byte [`RecordTag`] followed by codec-encoded payload. Readers
//! stop at the first [`RecordTag::EndOfFile`] or at clean stream end,
//! whichever comes first; [`Decoder::is_eof`] distinguishes clean end from
//! truncation mid-frame.

use std::io::{Read, Write};

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Boolean `true` on the wire.
pub const TRUE_BYTE: u8 = 0x12;

/// Boolean `false` on the wire.
pub const FALSE_BYTE: u8 = 0x34;

/// Errors produced while encoding or decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying stream ended in the middle of a frame.
    #[error("Unexpected end of stream")]
    EndOfStream,

    #[error("Invalid boolean byte 0x{0:02x}")]
    InvalidBoolean(u8),

    #[error("Invalid record tag 0x{0:02x}")]
    InvalidTag(u8),

    #[error("Negative length prefix {0}")]
    InvalidLength(i32),

    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Timestamp {0} out of representable range")]
    InvalidTimestamp(i64),

    /// A required value carried an absent flag.
    #[error("Expected a present value, found the absent flag")]
    MissingValue,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Tags of the record stream. `VersionData` frames carry one serialized
/// tracked artifact; `EndOfFile` terminates the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    VersionData,
    EndOfFile,
}

impl RecordTag {
    pub fn as_byte(self) -> u8 {
        match self {
            RecordTag::VersionData => 0x01,
            RecordTag::EndOfFile => 0xFF,
        }
    }

    pub fn from_byte(byte: u8) -> CodecResult<Self> {
        match byte {
            0x01 => Ok(RecordTag::VersionData),
            0xFF => Ok(RecordTag::EndOfFile),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

/// Writes codec frames to any [`Write`] sink.
pub struct Encoder<W: Write> {
    out: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the encoder and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write_i8(&mut self, value: i8) -> CodecResult<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> CodecResult<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> CodecResult<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> CodecResult<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> CodecResult<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_bool(&mut self, value: bool) -> CodecResult<()> {
        let byte = if value { TRUE_BYTE } else { FALSE_BYTE };
        self.write_raw(&[byte])
    }

    /// Present flag, then length-prefixed UTF-8.
    pub fn write_opt_string(&mut self, value: Option<&str>) -> CodecResult<()> {
        match value {
            None => self.write_bool(false),
            Some(s) => {
                self.write_bool(true)?;
                self.write_bytes(s.as_bytes())
            }
        }
    }

    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_opt_string(Some(value))
    }

    /// Length-prefixed raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> CodecResult<()> {
        self.write_i32(value.len() as i32)?;
        self.write_raw(value)
    }

    /// Present flag, then signed milliseconds since the Unix epoch, UTC.
    pub fn write_opt_timestamp(&mut self, value: Option<DateTime<Utc>>) -> CodecResult<()> {
        match value {
            None => self.write_bool(false),
            Some(ts) => {
                self.write_bool(true)?;
                self.write_i64(ts.timestamp_millis())
            }
        }
    }

    pub fn write_tag(&mut self, tag: RecordTag) -> CodecResult<()> {
        self.write_raw(&[tag.as_byte()])
    }

    /// Unframed passthrough.
    pub fn write_raw(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> CodecResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads codec frames from any [`Read`] source.
///
/// Keeps a one-byte lookahead so `is_eof` can probe for clean end-of-file
/// without consuming data.
pub struct Decoder<R: Read> {
    input: R,
    peeked: Option<u8>,
}

impl<R: Read> Decoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            peeked: None,
        }
    }

    /// True iff the underlying stream is cleanly exhausted.
    pub fn is_eof(&mut self) -> CodecResult<bool> {
        if self.peeked.is_some() {
            return Ok(false);
        }
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.peeked = Some(byte[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn read_i8(&mut self) -> CodecResult<i8> {
        let mut buf = [0u8; 1];
        self.read_raw(&mut buf)?;
        Ok(i8::from_be_bytes(buf))
    }

    pub fn read_i16(&mut self) -> CodecResult<i16> {
        let mut buf = [0u8; 2];
        self.read_raw(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let mut buf = [0u8; 4];
        self.read_raw(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let mut buf = [0u8; 2];
        self.read_raw(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        let mut buf = [0u8; 1];
        self.read_raw(&mut buf)?;
        match buf[0] {
            TRUE_BYTE => Ok(true),
            FALSE_BYTE => Ok(false),
            other => Err(CodecError::InvalidBoolean(other)),
        }
    }

    pub fn read_opt_string(&mut self) -> CodecResult<Option<String>> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let bytes = self.read_bytes()?;
        Ok(Some(String::from_utf8(bytes)?))
    }

    /// Read a string written with a `true` present flag.
    pub fn read_string(&mut self) -> CodecResult<String> {
        match self.read_opt_string()? {
            Some(s) => Ok(s),
            None => Err(CodecError::MissingValue),
        }
    }

    pub fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(CodecError::InvalidLength(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_raw(&mut buf)?;
        Ok(buf)
    }

    pub fn read_opt_timestamp(&mut self) -> CodecResult<Option<DateTime<Utc>>> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let millis = self.read_i64()?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Some)
            .ok_or(CodecError::InvalidTimestamp(millis))
    }

    pub fn read_tag(&mut self) -> CodecResult<RecordTag> {
        let mut buf = [0u8; 1];
        self.read_raw(&mut buf)?;
        RecordTag::from_byte(buf[0])
    }

    /// Unframed passthrough. Fails with [`CodecError::EndOfStream`] if the
    /// stream ends before `buf` is filled.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> CodecResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut filled = 0;
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            filled = 1;
        }
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) => return Err(CodecError::EndOfStream),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
