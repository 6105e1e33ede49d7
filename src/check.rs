//! High-level entry point: run every pass over one archive.
//!
//! ```no_run
//! use logcheck::check::{check_archive, CheckOptions};
//!
//! let outcome = check_archive("/var/log/archives/20240101", &CheckOptions::default())?;
//! outcome.report.render_text(std::io::stdout())?;
//! std::process::exit(outcome.report.exit_code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::discovery::{Archive, Category, DiscoveryError, FileRole};
use crate::format::{IndexEntry, LogFormat};
use crate::framing::scan_file;
use crate::report::{Finding, Report};
use crate::severity::{FileState, Severity};
use crate::temporal::{check_index, FsProbe, SizeProbe};

#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

// ── CheckOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`check_archive`].
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub format:     LogFormat,
    /// Keep the recovered temporal index in the outcome for dumping.
    pub dump_index: bool,
}

// ── CheckOutcome ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CheckOutcome {
    pub archive: Archive,
    pub report:  Report,
    /// Index entries recovered by Pass 0; empty unless `dump_index` was set.
    pub entries: Vec<IndexEntry>,
}

/// Check the archive named by `path` against the live filesystem.
pub fn check_archive<P: AsRef<Path>>(path: P, options: &CheckOptions) -> Result<CheckOutcome, CheckError> {
    check_archive_with(path, options, &FsProbe)
}

/// Check with a caller-supplied size probe for Pass 1.
pub fn check_archive_with<P, S>(path: P, options: &CheckOptions, probe: &S) -> Result<CheckOutcome, CheckError>
where
    P: AsRef<Path>,
    S: SizeProbe + ?Sized,
{
    let archive = Archive::discover(path)?;
    info!(
        base = %archive.name.base,
        files = archive.files.len(),
        volumes = archive.count(FileRole::Volume),
        "discovered archive"
    );

    let mut severity = Severity::default();
    let mut report = Report::default();
    let mut entries = Vec::new();

    // ── Pass 0 ───────────────────────────────────────────────────────────────
    for file in &archive.files {
        let scan = scan_file(&file.path, file.role, &options.format);
        severity.record(file.role.category(), scan.verdict);
        report.extend(scan.findings);
        if file.role == FileRole::Index {
            entries = scan.entries;
        }
    }

    let missing = severity.missing_required();
    if !missing.is_empty() {
        for category in missing {
            let expected = match category {
                Category::Metadata => archive.name.meta_path(),
                _                  => archive.name.volume_path(0),
            };
            report.push(Finding::MissingComponent { category, expected });
        }
        warn!(base = %archive.name.base, "required archive component missing, cannot continue");
        report.severity = severity;
        report.aborted = true;
        return Ok(CheckOutcome { archive, report, entries: keep(entries, options) });
    }

    // ── Pass 1 ───────────────────────────────────────────────────────────────
    let findings = check_index(&archive.name, &entries, &options.format, probe);
    if findings.iter().any(Finding::is_error) {
        severity.merge(Category::Index, FileState::Bad);
    }
    report.extend(findings);
    report.severity = severity;

    debug!(summary = %report.summary(), "check complete");
    Ok(CheckOutcome { archive, report, entries: keep(entries, options) })
}

fn keep(entries: Vec<IndexEntry>, options: &CheckOptions) -> Vec<IndexEntry> {
    if options.dump_index { entries } else { Vec::new() }
}
