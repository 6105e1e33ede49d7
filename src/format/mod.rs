//! Byte-exact layouts for archive records and temporal index entries.
//!
//! # Framed record
//!
//! ```text
//! :----------:----------------------:----------:
//! | u32 len  |  payload (len - 8 B) | u32 len  |
//! | header   |  opaque              | trailer  |
//! :----------:----------------------:----------:
//! ```
//!
//! `len` counts the whole record including both length fields.  Metadata and
//! volume files are nothing but a sequence of these; the index file starts
//! with one (its label) and continues with unframed [`IndexEntry`] values.
//!
//! # Index entry
//!
//! ```text
//! | i32 sec | i32 usec | i32 vol | offset_meta | offset_log |
//! ```
//!
//! Offset width depends on the archive format version and is carried by
//! [`OffsetWidth`]; it is never assumed.
//!
//! # Endianness
//! Every multi-byte integer is big-endian (network byte order), independent
//! of the host.  All decoding goes through `byteorder::BigEndian`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

/// Size in bytes of a record length field (header or trailer).
pub const LEN_FIELD_SIZE: usize = 4;
/// Bytes of framing overhead per record (header + trailer).
pub const FRAME_OVERHEAD: u32 = 2 * LEN_FIELD_SIZE as u32;

/// Magic shared by every label record; the low byte carries the version.
pub const LABEL_MAGIC: u32 = 0x5005_2600;
/// Label body size for format version 2.
pub const LABEL_BODY_V2: usize = 124;
/// Longest hostname stored in a version 2 label.
pub const LABEL_HOSTNAME_LEN: usize = 64;
/// Longest timezone string stored in a version 2 label.
pub const LABEL_TZ_LEN: usize = 40;

/// Largest legal microsecond value in a timestamp.
pub const MAX_USEC: i32 = 999_999;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("malformed {field}: need {needed} bytes, have {available}")]
    MalformedField {
        field:     &'static str,
        needed:    usize,
        available: usize,
    },
}

// ── Format parameters ────────────────────────────────────────────────────────

/// Width of the two offset fields in an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OffsetWidth {
    Bits32,
    Bits64,
}

impl OffsetWidth {
    pub fn bytes(self) -> usize {
        match self {
            OffsetWidth::Bits32 => 4,
            OffsetWidth::Bits64 => 8,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(OffsetWidth::Bits32),
            64 => Some(OffsetWidth::Bits64),
            _  => None,
        }
    }
}

/// Versioned on-disk parameters that the checker must not guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogFormat {
    /// Total size of the label record, framing included.  No offset into a
    /// file body may point before this.
    pub label_record_size: u32,
    pub offset_width:      OffsetWidth,
}

impl LogFormat {
    /// Version 2 archives: 132-byte label, 32-bit index offsets.
    pub const V2: LogFormat = LogFormat {
        label_record_size: LABEL_BODY_V2 as u32 + FRAME_OVERHEAD,
        offset_width:      OffsetWidth::Bits32,
    };

    /// Version 2 label with 64-bit index offsets, as written by collectors
    /// built with a large file-offset type.
    pub const V2_WIDE: LogFormat = LogFormat {
        label_record_size: LABEL_BODY_V2 as u32 + FRAME_OVERHEAD,
        offset_width:      OffsetWidth::Bits64,
    };

    /// Bytes occupied by one index entry.
    pub fn index_entry_size(&self) -> usize {
        3 * 4 + 2 * self.offset_width.bytes()
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::V2
    }
}

// ── Record framing ───────────────────────────────────────────────────────────

/// Decode one big-endian length field from the front of `bytes`.
pub fn decode_len(mut bytes: &[u8]) -> Result<u32, FormatError> {
    let available = bytes.len();
    bytes.read_u32::<BigEndian>().map_err(|_| FormatError::MalformedField {
        field:  "record length",
        needed: LEN_FIELD_SIZE,
        available,
    })
}

/// Write `payload` as one framed record.  Returns the record length.
pub fn write_record<W: Write>(mut writer: W, payload: &[u8]) -> io::Result<u32> {
    let len = u32::try_from(payload.len())
        .ok()
        .and_then(|n| n.checked_add(FRAME_OVERHEAD))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "record payload too large"))?;
    writer.write_u32::<BigEndian>(len)?;
    writer.write_all(payload)?;
    writer.write_u32::<BigEndian>(len)?;
    Ok(len)
}

// ── Timestamp ────────────────────────────────────────────────────────────────

/// Seconds and microseconds; ordering is lexicographic on `(sec, usec)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Timestamp {
    pub sec:  i32,
    pub usec: i32,
}

impl Timestamp {
    pub fn new(sec: i32, usec: i32) -> Self {
        Self { sec, usec }
    }

    pub fn is_valid(&self) -> bool {
        self.sec >= 0 && (0..=MAX_USEC).contains(&self.usec)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

// ── Index entry ──────────────────────────────────────────────────────────────

/// One temporal index entry.  Every field is kept signed and unvalidated so
/// that Pass 1 can report whatever a damaged producer wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IndexEntry {
    pub stamp:       Timestamp,
    pub volume:      i32,
    pub offset_meta: i64,
    pub offset_log:  i64,
}

impl IndexEntry {
    pub fn new(sec: i32, usec: i32, volume: i32, offset_meta: i64, offset_log: i64) -> Self {
        Self { stamp: Timestamp::new(sec, usec), volume, offset_meta, offset_log }
    }

    /// Decode one entry from the front of `bytes`.
    pub fn decode(bytes: &[u8], width: OffsetWidth) -> Result<Self, FormatError> {
        let needed = 3 * 4 + 2 * width.bytes();
        if bytes.len() < needed {
            return Err(FormatError::MalformedField {
                field:     "index entry",
                needed,
                available: bytes.len(),
            });
        }
        let mut cur = &bytes[..needed];
        // Length was checked above, so the reads below cannot run dry.
        let malformed = |_| FormatError::MalformedField {
            field:     "index entry",
            needed,
            available: bytes.len(),
        };
        let sec    = cur.read_i32::<BigEndian>().map_err(malformed)?;
        let usec   = cur.read_i32::<BigEndian>().map_err(malformed)?;
        let volume = cur.read_i32::<BigEndian>().map_err(malformed)?;
        let (offset_meta, offset_log) = match width {
            OffsetWidth::Bits32 => (
                i64::from(cur.read_i32::<BigEndian>().map_err(malformed)?),
                i64::from(cur.read_i32::<BigEndian>().map_err(malformed)?),
            ),
            OffsetWidth::Bits64 => (
                cur.read_i64::<BigEndian>().map_err(malformed)?,
                cur.read_i64::<BigEndian>().map_err(malformed)?,
            ),
        };
        Ok(Self::new(sec, usec, volume, offset_meta, offset_log))
    }

    /// Encode with the given offset width.  32-bit offsets are truncated to
    /// their low 32 bits, as a 32-bit producer would have stored them.
    pub fn write<W: Write>(&self, mut writer: W, width: OffsetWidth) -> io::Result<()> {
        writer.write_i32::<BigEndian>(self.stamp.sec)?;
        writer.write_i32::<BigEndian>(self.stamp.usec)?;
        writer.write_i32::<BigEndian>(self.volume)?;
        match width {
            OffsetWidth::Bits32 => {
                writer.write_i32::<BigEndian>(self.offset_meta as i32)?;
                writer.write_i32::<BigEndian>(self.offset_log as i32)?;
            }
            OffsetWidth::Bits64 => {
                writer.write_i64::<BigEndian>(self.offset_meta)?;
                writer.write_i64::<BigEndian>(self.offset_log)?;
            }
        }
        Ok(())
    }
}

// ── Label ────────────────────────────────────────────────────────────────────

/// Version 2 label body.  The checker never reads labels back (their payload
/// is opaque to framing validation); this exists to produce archives.
#[derive(Debug, Clone)]
pub struct Label {
    pub version:  u8,
    pub pid:      i32,
    pub start:    Timestamp,
    pub volume:   i32,
    pub hostname: String,
    pub timezone: String,
}

impl Label {
    pub fn new(volume: i32) -> Self {
        Self {
            version:  2,
            pid:      0,
            start:    Timestamp::default(),
            volume,
            hostname: String::new(),
            timezone: String::new(),
        }
    }

    /// The 124-byte label body, without framing.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(LABEL_BODY_V2);
        body.write_u32::<BigEndian>(LABEL_MAGIC | u32::from(self.version))?;
        body.write_i32::<BigEndian>(self.pid)?;
        body.write_i32::<BigEndian>(self.start.sec)?;
        body.write_i32::<BigEndian>(self.start.usec)?;
        body.write_i32::<BigEndian>(self.volume)?;
        write_fixed(&mut body, self.hostname.as_bytes(), LABEL_HOSTNAME_LEN)?;
        write_fixed(&mut body, self.timezone.as_bytes(), LABEL_TZ_LEN)?;
        Ok(body)
    }

    /// Write the label as a framed record.
    pub fn write<W: Write>(&self, writer: W) -> io::Result<u32> {
        write_record(writer, &self.encode()?)
    }
}

/// NUL-padded fixed-width string field; always keeps one terminating NUL.
fn write_fixed<W: Write>(mut w: W, s: &[u8], width: usize) -> io::Result<()> {
    let n = s.len().min(width - 1);
    w.write_all(&s[..n])?;
    w.write_all(&vec![0u8; width - n])
}
