//! Pass 1: cross-check the temporal index against the files it points into.
//!
//! Integrity checks, per entry:
//!
//! ```text
//! this(vol) >= 0
//! this(sec) >= 0, 0 <= this(usec) <= 999999
//! label_end <= this(meta) <= size(<base>.meta)
//! label_end <= this(log)  <= size(<base>.this(vol))
//! this(timestamp) >= last(timestamp)
//! this(vol) >= last(vol)
//! this(vol) == last(vol) => this(meta) >= last(meta), this(log) >= last(log)
//! ```
//!
//! Warning, not an integrity failure: `<base>.this(vol)` does not exist,
//! typically because the volume was compressed after the fact.  The log
//! bound is then skipped for every entry of that volume.
//!
//! Every check runs for every entry; nothing here stops early or aborts the
//! run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::discovery::ArchiveName;
use crate::format::{IndexEntry, LogFormat};
use crate::report::{Finding, OffsetTarget};

/// On-disk size lookup.  Kept behind a trait so the pass can run against a
/// view other than the live filesystem.
pub trait SizeProbe {
    fn size(&self, path: &Path) -> io::Result<u64>;
}

/// Sizes from `stat(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl SizeProbe for FsProbe {
    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }
}

/// Check `entries` (in file order) and return every violation found.
pub fn check_index<P>(
    archive: &ArchiveName,
    entries: &[IndexEntry],
    format:  &LogFormat,
    probe:   &P,
) -> Vec<Finding>
where
    P: SizeProbe + ?Sized,
{
    debug!(entries = entries.len(), "pass1: check temporal index");

    let index = archive.index_path();
    let label_end = format.label_record_size;
    let mut findings = Vec::new();
    if entries.is_empty() {
        return findings;
    }

    let meta_path = archive.meta_path();
    let meta_size = match probe.size(&meta_path) {
        Ok(size) => Some(size),
        Err(e) => {
            findings.push(Finding::MetadataUnavailable { path: meta_path, reason: e.to_string() });
            None
        }
    };

    let mut log_size: Option<u64> = None;
    let mut last: Option<(u64, &IndexEntry)> = None;

    for (i, this) in entries.iter().enumerate() {
        let entry = i as u64 + 1;

        if this.volume < 0 {
            findings.push(Finding::IllegalVolume { index: index.clone(), entry, volume: this.volume });
            log_size = None;
        } else if last.map_or(true, |(_, prev)| prev.volume != this.volume) {
            let path = archive.volume_path(this.volume);
            log_size = match probe.size(&path) {
                Ok(size) => Some(size),
                Err(e) => {
                    let reason = (e.kind() != io::ErrorKind::NotFound).then(|| e.to_string());
                    findings.push(Finding::VolumeUnavailable { path, volume: this.volume, reason });
                    None
                }
            };
        }

        if !this.stamp.is_valid() {
            findings.push(Finding::IllegalTimestamp { index: index.clone(), entry, stamp: this.stamp });
        }

        let bounds = [
            (OffsetTarget::Meta, this.offset_meta, meta_size),
            (OffsetTarget::Log, this.offset_log, log_size),
        ];
        for (target, offset, size) in bounds {
            if offset < i64::from(label_end) {
                findings.push(Finding::OffsetBeforeLabel {
                    index: index.clone(),
                    entry,
                    target,
                    offset,
                    label_end,
                });
            }
            if let Some(size) = size {
                if past_end(offset, size) {
                    findings.push(Finding::OffsetPastEnd { index: index.clone(), entry, target, offset, size });
                }
            }
        }

        if let Some((prev_entry, prev)) = last {
            findings.extend(ordering(&index, prev_entry, prev, entry, this));
        }
        last = Some((entry, this));
    }

    debug!(violations = findings.iter().filter(|f| f.is_error()).count(), "pass1 done");
    findings
}

fn past_end(offset: i64, size: u64) -> bool {
    u64::try_from(offset).map_or(false, |o| o > size)
}

/// Monotonicity checks between two consecutive entries.
fn ordering(
    index:      &Path,
    prev_entry: u64,
    prev:       &IndexEntry,
    entry:      u64,
    this:       &IndexEntry,
) -> Vec<Finding> {
    let index: PathBuf = index.to_owned();
    let mut out = Vec::new();

    if this.stamp < prev.stamp {
        out.push(Finding::TimestampBackwards {
            index: index.clone(),
            prev_entry,
            prev: prev.stamp,
            entry,
            stamp: this.stamp,
        });
    }
    if this.volume < prev.volume {
        out.push(Finding::VolumeDecreased {
            index: index.clone(),
            prev_entry,
            prev: prev.volume,
            entry,
            volume: this.volume,
        });
    }
    if this.volume == prev.volume {
        let pairs = [
            (OffsetTarget::Meta, prev.offset_meta, this.offset_meta),
            (OffsetTarget::Log, prev.offset_log, this.offset_log),
        ];
        for (target, before, after) in pairs {
            if after < before {
                out.push(Finding::OffsetDecreased {
                    index: index.clone(),
                    target,
                    prev_entry,
                    prev: before,
                    entry,
                    offset: after,
                });
            }
        }
    }
    out
}
