//! Pass 0: validate record framing in one physical file.
//!
//! # How it works
//!
//! The scanner streams the file forward once.  For every framed record it
//! reads the header length, skips the payload without looking at it, reads
//! the trailer length and requires the two to match.  Nothing about the
//! payload is interpreted, so arbitrary record contents can never trip it.
//!
//! Index files carry a framed label record followed by back-to-back
//! fixed-width entries with no framing of their own.  Those entries are
//! decoded and handed to Pass 1 in file order.
//!
//! ## Outcomes
//!
//! | Condition | Finding | Verdict |
//! |---|---|---|
//! | 0 bytes at a record boundary | none (clean end) | – |
//! | EOF inside a header, body or trailer | `TruncatedRecord` | BAD |
//! | header ≠ trailer | `FramingMismatch` | BAD |
//! | header < 8 | `ImpossibleLength` | BAD |
//! | label shorter than the format's label | `ShortLabel` | BAD |
//! | partial final index entry | `TruncatedIndexEntry` | BAD |
//! | empty file or label only | `EmptyComponent` | WARNING |
//!
//! Any BAD condition stops the scan of that file only.  Only the file is
//! ever opened, read-only, and it is closed when the scan returns.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::discovery::FileRole;
use crate::format::{decode_len, IndexEntry, LogFormat, FRAME_OVERHEAD, LEN_FIELD_SIZE};
use crate::report::{Finding, RecordPart};
use crate::severity::Verdict;

/// Result of scanning one file.
#[derive(Debug, Clone)]
pub struct FileScan {
    pub path:     PathBuf,
    pub role:     FileRole,
    /// Complete records seen, label included.  For an index file this is the
    /// label plus every complete entry.
    pub records:  u64,
    pub verdict:  Verdict,
    pub findings: Vec<Finding>,
    /// Decoded index entries, in file order.  Empty unless `role` is `Index`.
    pub entries:  Vec<IndexEntry>,
}

/// Open `path` read-only and scan it.  Failure to open is reported as a
/// finding, never as an `Err`.
pub fn scan_file(path: &Path, role: FileRole, format: &LogFormat) -> FileScan {
    debug!(path = %path.display(), ?role, "pass0");
    match File::open(path) {
        Ok(file) => scan_stream(BufReader::new(file), path, role, format),
        Err(e) => {
            let finding = Finding::CannotOpen { path: path.to_owned(), reason: e.to_string() };
            Scanner::new(io::empty(), path, role, format).finish_with(finding)
        }
    }
}

/// Scan any byte stream as if it were the file at `path`.
pub fn scan_stream<R: Read>(reader: R, path: &Path, role: FileRole, format: &LogFormat) -> FileScan {
    let mut scanner = Scanner::new(reader, path, role, format);
    match scanner.run() {
        Ok(())       => scanner.finish(),
        Err(finding) => scanner.finish_with(finding),
    }
}

// ── Scanner ──────────────────────────────────────────────────────────────────

struct Scanner<'a, R> {
    reader:  R,
    path:    &'a Path,
    role:    FileRole,
    format:  &'a LogFormat,
    offset:  u64,
    records: u64,
    entries: Vec<IndexEntry>,
}

impl<'a, R: Read> Scanner<'a, R> {
    fn new(reader: R, path: &'a Path, role: FileRole, format: &'a LogFormat) -> Self {
        Self {
            reader,
            path,
            role,
            format,
            offset:  0,
            records: 0,
            entries: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), Finding> {
        let Some(label_len) = self.next_record()? else {
            // Zero-length file: clean end, reported as empty by `finish`.
            return Ok(());
        };
        if label_len < self.format.label_record_size {
            return Err(Finding::ShortLabel {
                path: self.path.to_owned(),
                len:  label_len,
                min:  self.format.label_record_size,
            });
        }

        match self.role {
            FileRole::Index => self.read_entries(),
            FileRole::Metadata | FileRole::Volume => {
                while self.next_record()?.is_some() {}
                Ok(())
            }
        }
    }

    /// Consume one framed record.  `Ok(None)` is a clean end of file.
    fn next_record(&mut self) -> Result<Option<u32>, Finding> {
        let record = self.records + 1;
        let start = self.offset;

        let mut field = [0u8; LEN_FIELD_SIZE];
        let got = self.fill(&mut field)?;
        if got == 0 {
            return Ok(None);
        }
        let header = decode_len(&field[..got])
            .map_err(|_| self.truncated(record, start, RecordPart::Header))?;
        if header < FRAME_OVERHEAD {
            return Err(Finding::ImpossibleLength {
                path:   self.path.to_owned(),
                record,
                offset: start,
                len:    header,
            });
        }

        let body = u64::from(header - FRAME_OVERHEAD);
        if self.skip(body)? < body {
            return Err(self.truncated(record, start, RecordPart::Body));
        }

        let got = self.fill(&mut field)?;
        let trailer = decode_len(&field[..got])
            .map_err(|_| self.truncated(record, start, RecordPart::Trailer))?;
        if trailer != header {
            return Err(Finding::FramingMismatch {
                path:   self.path.to_owned(),
                record,
                offset: start,
                header,
                trailer,
            });
        }

        self.records = record;
        Ok(Some(header))
    }

    fn read_entries(&mut self) -> Result<(), Finding> {
        let width = self.format.offset_width;
        let mut buf = vec![0u8; self.format.index_entry_size()];
        loop {
            let start = self.offset;
            let got = self.fill(&mut buf)?;
            if got == 0 {
                return Ok(());
            }
            let entry = IndexEntry::decode(&buf[..got], width).map_err(|_| {
                Finding::TruncatedIndexEntry {
                    path:      self.path.to_owned(),
                    entry:     self.entries.len() as u64 + 1,
                    offset:    start,
                    available: got,
                    needed:    buf.len(),
                }
            })?;
            self.entries.push(entry);
            self.records += 1;
        }
    }

    /// Read until `buf` is full or the stream ends; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, Finding> {
        let mut got = 0;
        while got < buf.len() {
            match self.reader.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.read_failed(e)),
            }
        }
        self.offset += got as u64;
        Ok(got)
    }

    /// Discard up to `n` bytes without buffering them; returns bytes skipped.
    fn skip(&mut self, n: u64) -> Result<u64, Finding> {
        let copied = io::copy(&mut self.reader.by_ref().take(n), &mut io::sink());
        let skipped = copied.map_err(|e| self.read_failed(e))?;
        self.offset += skipped;
        Ok(skipped)
    }

    fn truncated(&self, record: u64, offset: u64, part: RecordPart) -> Finding {
        Finding::TruncatedRecord { path: self.path.to_owned(), record, offset, part }
    }

    fn read_failed(&self, e: io::Error) -> Finding {
        Finding::ReadFailed { path: self.path.to_owned(), offset: self.offset, reason: e.to_string() }
    }

    fn finish(self) -> FileScan {
        let mut findings = Vec::new();
        let verdict = if self.records < 2 {
            findings.push(Finding::EmptyComponent { path: self.path.to_owned() });
            Verdict::Warning
        } else {
            Verdict::Ok
        };
        debug!(path = %self.path.display(), records = self.records, ?verdict, "pass0 done");
        self.into_scan(verdict, findings)
    }

    fn finish_with(self, finding: Finding) -> FileScan {
        debug!(path = %self.path.display(), records = self.records, %finding, "pass0 failed");
        self.into_scan(Verdict::Bad, vec![finding])
    }

    fn into_scan(self, verdict: Verdict, findings: Vec<Finding>) -> FileScan {
        FileScan {
            path:     self.path.to_owned(),
            role:     self.role,
            records:  self.records,
            verdict,
            findings,
            entries:  self.entries,
        }
    }
}
