//! Diagnostic findings and their rendering.
//!
//! Data damage is never an `Err` in this crate.  Every problem the passes
//! detect becomes a [`Finding`], collected in a [`Report`] in the order it
//! was found.  Rendering is a pure function of the report, so two runs over
//! the same bytes print the same text.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::discovery::Category;
use crate::format::{IndexEntry, Timestamp};
use crate::severity::{FileState, Severity};

/// Which part of a framed record ran into end-of-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPart {
    Header,
    Body,
    Trailer,
}

impl fmt::Display for RecordPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordPart::Header  => "header",
            RecordPart::Body    => "body",
            RecordPart::Trailer => "trailer",
        })
    }
}

/// File an index offset points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetTarget {
    Meta,
    Log,
}

impl fmt::Display for OffsetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OffsetTarget::Meta => "metadata",
            OffsetTarget::Log  => "log",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Warning,
    Error,
}

/// Coarse error taxonomy a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingClass {
    FileSystem,
    Framing,
    IndexOrdering,
    MissingComponent,
    Advisory,
}

/// One diagnostic.  Record and entry numbers are 1-based; record 1 is the
/// label record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    // ── Pass 0 ───────────────────────────────────────────────────────────────
    /// The file could not be opened at all.
    CannotOpen { path: PathBuf, reason: String },
    /// An I/O error other than end-of-file interrupted the scan.
    ReadFailed { path: PathBuf, offset: u64, reason: String },
    /// End-of-file inside a record; `offset` is where the record starts.
    TruncatedRecord { path: PathBuf, record: u64, offset: u64, part: RecordPart },
    /// Header and trailer lengths of one record disagree.
    FramingMismatch { path: PathBuf, record: u64, offset: u64, header: u32, trailer: u32 },
    /// Header length too small to cover its own length fields.
    ImpossibleLength { path: PathBuf, record: u64, offset: u64, len: u32 },
    /// First record is shorter than the format's label record.
    ShortLabel { path: PathBuf, len: u32, min: u32 },
    /// Index file ends partway through an entry.
    TruncatedIndexEntry { path: PathBuf, entry: u64, offset: u64, available: usize, needed: usize },
    /// Nothing beyond the label record (or no bytes at all).
    EmptyComponent { path: PathBuf },

    // ── Preconditions ────────────────────────────────────────────────────────
    /// No metadata file, or no volume at all; Pass 1 cannot run.
    MissingComponent { category: Category, expected: PathBuf },

    // ── Pass 1 ───────────────────────────────────────────────────────────────
    /// Negative volume number in an index entry.
    IllegalVolume { index: PathBuf, entry: u64, volume: i32 },
    /// Negative seconds, or microseconds outside `0..=999_999`.
    IllegalTimestamp { index: PathBuf, entry: u64, stamp: Timestamp },
    /// Offset points inside the label record.
    OffsetBeforeLabel { index: PathBuf, entry: u64, target: OffsetTarget, offset: i64, label_end: u32 },
    /// Offset points beyond the end of the target file.
    OffsetPastEnd { index: PathBuf, entry: u64, target: OffsetTarget, offset: i64, size: u64 },
    /// Volume could not be sized, so its log bound is skipped.  `reason` is
    /// `None` when the file simply does not exist.
    VolumeUnavailable { path: PathBuf, volume: i32, reason: Option<String> },
    /// Metadata file could not be sized, so its bound is skipped.
    MetadataUnavailable { path: PathBuf, reason: String },
    /// Entry timestamp earlier than the previous entry's.
    TimestampBackwards { index: PathBuf, prev_entry: u64, prev: Timestamp, entry: u64, stamp: Timestamp },
    /// Entry volume lower than the previous entry's.
    VolumeDecreased { index: PathBuf, prev_entry: u64, prev: i32, entry: u64, volume: i32 },
    /// Offset went down between two entries of the same volume.
    OffsetDecreased {
        index:      PathBuf,
        target:     OffsetTarget,
        prev_entry: u64,
        prev:       i64,
        entry:      u64,
        offset:     i64,
    },
}

impl Finding {
    pub fn level(&self) -> Level {
        match self.class() {
            FindingClass::Advisory => Level::Warning,
            _                      => Level::Error,
        }
    }

    pub fn class(&self) -> FindingClass {
        use Finding::*;
        match self {
            CannotOpen { .. } | ReadFailed { .. } => FindingClass::FileSystem,
            TruncatedRecord { .. }
            | FramingMismatch { .. }
            | ImpossibleLength { .. }
            | ShortLabel { .. }
            | TruncatedIndexEntry { .. } => FindingClass::Framing,
            MissingComponent { .. } => FindingClass::MissingComponent,
            IllegalVolume { .. }
            | IllegalTimestamp { .. }
            | OffsetBeforeLabel { .. }
            | OffsetPastEnd { .. }
            | TimestampBackwards { .. }
            | VolumeDecreased { .. }
            | OffsetDecreased { .. } => FindingClass::IndexOrdering,
            EmptyComponent { .. } | VolumeUnavailable { .. } | MetadataUnavailable { .. } => {
                FindingClass::Advisory
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.level() == Level::Error
    }
}

struct Rec(u64);

impl fmt::Display for Rec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 1 {
            f.write_str("label record")
        } else {
            write!(f, "record {}", self.0)
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Finding::*;
        match self {
            CannotOpen { path, reason } => write!(f, "{}: cannot open: {reason}", path.display()),
            ReadFailed { path, offset, reason } => {
                write!(f, "{}: read failed at byte {offset}: {reason}", path.display())
            }
            TruncatedRecord { path, record, offset, part } => write!(
                f,
                "{}[{}]: unexpected EOF in record {part} (record starts at byte {offset})",
                path.display(), Rec(*record)
            ),
            FramingMismatch { path, record, offset, header, trailer } => write!(
                f,
                "{}[{}]: length mismatch at byte {offset}: header {header} != trailer {trailer}",
                path.display(), Rec(*record)
            ),
            ImpossibleLength { path, record, offset, len } => write!(
                f,
                "{}[{}]: impossible record length {len} at byte {offset}",
                path.display(), Rec(*record)
            ),
            ShortLabel { path, len, min } => write!(
                f,
                "{}: label record length {len} shorter than {min}",
                path.display()
            ),
            TruncatedIndexEntry { path, entry, offset, available, needed } => write!(
                f,
                "{}[entry {entry}]: unexpected EOF in index entry at byte {offset} ({available} of {needed} bytes)",
                path.display()
            ),
            EmptyComponent { path } => write!(f, "{}: contains no archive data", path.display()),
            MissingComponent { category, expected } => match category {
                Category::Log => write!(f, "missing log file ({} or similar)", expected.display()),
                Category::Metadata => write!(f, "missing metadata file ({})", expected.display()),
                Category::Index => write!(f, "missing index file ({})", expected.display()),
            },
            IllegalVolume { index, entry, volume } => {
                write!(f, "{}[entry {entry}]: illegal volume number {volume}", index.display())
            }
            IllegalTimestamp { index, entry, stamp } => write!(
                f,
                "{}[entry {entry}]: illegal timestamp value ({} sec, {} usec)",
                index.display(), stamp.sec, stamp.usec
            ),
            OffsetBeforeLabel { index, entry, target, offset, label_end } => write!(
                f,
                "{}[entry {entry}]: offset to {target} ({offset}) before end of label record ({label_end})",
                index.display()
            ),
            OffsetPastEnd { index, entry, target, offset, size } => write!(
                f,
                "{}[entry {entry}]: offset to {target} ({offset}) past end of file ({size})",
                index.display()
            ),
            VolumeUnavailable { path, volume, reason: None } => write!(
                f,
                "{}: file missing or compressed for log volume {volume}",
                path.display()
            ),
            VolumeUnavailable { path, volume, reason: Some(reason) } => write!(
                f,
                "{}: cannot size log volume {volume}, offset bound not checked: {reason}",
                path.display()
            ),
            MetadataUnavailable { path, reason } => write!(
                f,
                "{}: cannot size metadata file, offset bound not checked: {reason}",
                path.display()
            ),
            TimestampBackwards { index, prev_entry, prev, entry, stamp } => write!(
                f,
                "{}: timestamp went backwards in time {prev}[entry {prev_entry}] -> {stamp}[entry {entry}]",
                index.display()
            ),
            VolumeDecreased { index, prev_entry, prev, entry, volume } => write!(
                f,
                "{}: volume number decreased {prev}[entry {prev_entry}] -> {volume}[entry {entry}]",
                index.display()
            ),
            OffsetDecreased { index, target, prev_entry, prev, entry, offset } => write!(
                f,
                "{}: offset to {target} decreased {prev}[entry {prev_entry}] -> {offset}[entry {entry}]",
                index.display()
            ),
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

/// Everything a run found, in discovery and entry order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub severity: Severity,
    /// Set when a required component was missing and Pass 1 never ran.
    pub aborted:  bool,
}

#[derive(Serialize)]
struct FindingView<'a> {
    level:   Level,
    class:   FindingClass,
    message: String,
    #[serde(flatten)]
    detail:  &'a Finding,
}

#[derive(Serialize)]
struct ReportView<'a> {
    exit_code: i32,
    aborted:   bool,
    index:     FileState,
    metadata:  FileState,
    log:       FileState,
    findings:  Vec<FindingView<'a>>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    temporal_index: &'a [IndexEntry],
}

impl Report {
    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend<I: IntoIterator<Item = Finding>>(&mut self, findings: I) {
        self.findings.extend(findings);
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.is_error())
    }

    pub fn of_class(&self, class: FindingClass) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.class() == class)
    }

    /// 0 when nothing fatal was found (warnings allowed), 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.aborted || self.severity.any_bad() { 1 } else { 0 }
    }

    /// One line per finding.
    pub fn render_text<W: Write>(&self, mut w: W) -> io::Result<()> {
        for finding in &self.findings {
            writeln!(w, "{finding}")?;
        }
        Ok(())
    }

    /// Findings and category states as one JSON document.  A non-empty
    /// `entries` is included as `temporal_index`.
    pub fn render_json<W: Write>(&self, mut w: W, entries: &[IndexEntry]) -> io::Result<()> {
        let view = ReportView {
            exit_code: self.exit_code(),
            aborted:   self.aborted,
            index:     self.severity.index,
            metadata:  self.severity.metadata,
            log:       self.severity.log,
            findings:  self
                .findings
                .iter()
                .map(|f| FindingView {
                    level:   f.level(),
                    class:   f.class(),
                    message: f.to_string(),
                    detail:  f,
                })
                .collect(),
            temporal_index: entries,
        };
        serde_json::to_writer_pretty(&mut w, &view)?;
        writeln!(w)
    }

    /// Category summary, e.g. `index OK, metadata OK, log BAD`.
    pub fn summary(&self) -> String {
        format!(
            "index {}, metadata {}, log {}",
            self.severity.index, self.severity.metadata, self.severity.log
        )
    }
}

/// Print the recovered temporal index, one entry per line.
pub fn render_index<W: Write>(mut w: W, index: &Path, entries: &[IndexEntry]) -> io::Result<()> {
    writeln!(w, "Temporal index {} ({} entries)", index.display(), entries.len())?;
    writeln!(w, "{:>7}  {:>18}  {:>5}  {:>12}  {:>12}", "entry", "timestamp", "vol", "meta", "log")?;
    for (i, e) in entries.iter().enumerate() {
        writeln!(
            w,
            "{:>7}  {:>18}  {:>5}  {:>12}  {:>12}",
            i + 1,
            e.stamp.to_string(),
            e.volume,
            e.offset_meta,
            e.offset_log
        )?;
    }
    Ok(())
}
