use logcheck::check::{check_archive, CheckOptions};
use logcheck::discovery::DiscoveryError;
use logcheck::format::{write_record, IndexEntry, Label, LogFormat, OffsetWidth};
use logcheck::report::{Finding, FindingClass, RecordPart};
use logcheck::{CheckError, FileState};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes `<base>.meta`, `<base>.<vol>` and `<base>.index` into a temp dir.
struct Fixture {
    dir:  TempDir,
    base: &'static str,
}

impl Fixture {
    fn new() -> Self {
        Self { dir: TempDir::new().unwrap(), base: "arch" }
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.path().join(format!("{}.{}", self.base, suffix))
    }

    fn archive(&self) -> PathBuf {
        self.dir.path().join(self.base)
    }

    /// Framed file: label plus one record per payload.  Returns the file size.
    fn framed(&self, suffix: &str, payloads: &[&[u8]]) -> u64 {
        let mut f = File::create(self.path(suffix)).unwrap();
        let mut size = u64::from(Label::new(0).write(&mut f).unwrap());
        for p in payloads {
            size += u64::from(write_record(&mut f, p).unwrap());
        }
        size
    }

    fn index(&self, entries: &[IndexEntry], width: OffsetWidth) {
        let mut f = File::create(self.path("index")).unwrap();
        Label::new(0).write(&mut f).unwrap();
        for e in entries {
            e.write(&mut f, width).unwrap();
        }
    }

    /// A small archive with two volumes and an index consistent with both.
    fn healthy(&self) {
        let meta = self.framed("meta", &[b"desc-1", b"indom-1", b"desc-2"]);
        let v0 = self.framed("0", &[&[1u8; 40], &[2u8; 64]]);
        let v1 = self.framed("1", &[&[3u8; 24]]);
        self.index(
            &[
                IndexEntry::new(100, 0, 0, 132, 132),
                IndexEntry::new(100, 250_000, 0, 150, v0 as i64),
                IndexEntry::new(160, 0, 1, meta as i64, 132),
                IndexEntry::new(170, 0, 1, meta as i64, v1 as i64),
            ],
            OffsetWidth::Bits32,
        );
    }
}

fn check(path: &Path) -> logcheck::CheckOutcome {
    check_archive(path, &CheckOptions::default()).unwrap()
}

fn text(outcome: &logcheck::CheckOutcome) -> String {
    let mut out = Vec::new();
    outcome.report.render_text(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_healthy_archive_is_clean() {
    let fx = Fixture::new();
    fx.healthy();

    let outcome = check(&fx.archive());
    assert_eq!(outcome.archive.files.len(), 4);
    assert!(outcome.report.findings.is_empty(), "{}", text(&outcome));
    assert_eq!(outcome.report.severity.index, FileState::Ok);
    assert_eq!(outcome.report.severity.metadata, FileState::Ok);
    assert_eq!(outcome.report.severity.log, FileState::Ok);
    assert_eq!(outcome.report.exit_code(), 0);
}

#[test]
fn test_any_component_name_selects_the_archive() {
    let fx = Fixture::new();
    fx.healthy();
    for suffix in ["meta", "index", "1"] {
        let outcome = check(&fx.path(suffix));
        assert_eq!(outcome.archive.name.base, "arch");
        assert_eq!(outcome.report.exit_code(), 0);
    }
}

#[test]
fn test_flipped_trailer_in_volume() {
    let fx = Fixture::new();
    fx.healthy();

    // Record 3 of arch.0: label (132) + record 2 (48), payload 64 bytes.
    let mut bytes = fs::read(fx.path("0")).unwrap();
    let trailer = 132 + 48 + 4 + 64;
    bytes[trailer..trailer + 4].copy_from_slice(&999u32.to_be_bytes());
    fs::write(fx.path("0"), &bytes).unwrap();

    let outcome = check(&fx.archive());
    let framing: Vec<_> = outcome.report.of_class(FindingClass::Framing).collect();
    assert_eq!(framing.len(), 1);
    assert!(matches!(
        framing[0],
        Finding::FramingMismatch { record: 3, offset: 180, header: 72, trailer: 999, .. }
    ));
    assert_eq!(outcome.report.severity.log, FileState::Bad);
    assert_eq!(outcome.report.exit_code(), 1);
}

#[test]
fn test_bad_volume_is_not_cleared_by_a_later_good_one() {
    let fx = Fixture::new();
    fx.healthy();
    let mut bytes = fs::read(fx.path("0")).unwrap();
    bytes.truncate(bytes.len() - 2);
    fs::write(fx.path("0"), &bytes).unwrap();

    let outcome = check(&fx.archive());
    assert_eq!(outcome.report.severity.log, FileState::Bad);
    assert_eq!(outcome.report.of_class(FindingClass::Framing).count(), 1);
    assert!(matches!(
        outcome.report.findings[0],
        Finding::TruncatedRecord { record: 3, part: RecordPart::Trailer, .. }
    ));
}

#[test]
fn test_metadata_truncated_mid_payload() {
    let fx = Fixture::new();
    fx.healthy();
    let f = OpenOptions::new().write(true).open(fx.path("meta")).unwrap();
    // Record 3 starts at 132 + 14; keep its header and 3 bytes of payload.
    f.set_len(132 + 14 + 4 + 3).unwrap();

    let outcome = check(&fx.archive());
    assert!(outcome.report.findings.iter().any(|f| matches!(
        f,
        Finding::TruncatedRecord { record: 3, part: RecordPart::Body, .. }
    )));
    assert_eq!(outcome.report.severity.metadata, FileState::Bad);
    assert_eq!(outcome.report.exit_code(), 1);
}

#[test]
fn test_backwards_timestamp_pair() {
    let fx = Fixture::new();
    fx.framed("meta", &[&[0u8; 200]]);
    fx.framed("0", &[&[0u8; 200]]);
    fx.index(
        &[IndexEntry::new(10, 0, 0, 100, 100), IndexEntry::new(9, 0, 0, 120, 120)],
        OffsetWidth::Bits32,
    );

    let outcome = check(&fx.archive());
    let ordering: Vec<_> = outcome
        .report
        .findings
        .iter()
        .filter(|f| {
            matches!(
                f,
                Finding::TimestampBackwards { .. }
                    | Finding::VolumeDecreased { .. }
                    | Finding::OffsetDecreased { .. }
            )
        })
        .collect();
    assert_eq!(ordering.len(), 1);
    assert!(matches!(ordering[0], Finding::TimestampBackwards { prev_entry: 1, entry: 2, .. }));
    assert!(text(&outcome).contains("timestamp went backwards in time 10.000000[entry 1] -> 9.000000[entry 2]"));
    assert_eq!(outcome.report.severity.index, FileState::Bad);
}

#[test]
fn test_deleted_volume_is_a_warning() {
    let fx = Fixture::new();
    fx.healthy();
    fs::remove_file(fx.path("1")).unwrap();

    let outcome = check(&fx.archive());
    let findings = &outcome.report.findings;
    assert_eq!(findings.len(), 1, "{}", text(&outcome));
    assert!(matches!(findings[0], Finding::VolumeUnavailable { volume: 1, .. }));
    assert!(!findings[0].is_error());
    assert_eq!(outcome.report.exit_code(), 0);
}

#[test]
fn test_deleted_volume_still_runs_other_checks() {
    let fx = Fixture::new();
    let meta = fx.framed("meta", &[b"x"]);
    fx.framed("0", &[b"y"]);
    fx.index(
        &[
            IndexEntry::new(1, 0, 0, 132, 132),
            IndexEntry::new(2, 0, 4, meta as i64 + 1, 1 << 20),
        ],
        OffsetWidth::Bits32,
    );

    let outcome = check(&fx.archive());
    let kinds: Vec<_> = outcome.report.findings.iter().map(|f| f.class()).collect();
    assert_eq!(kinds, [FindingClass::Advisory, FindingClass::IndexOrdering]);
    assert!(matches!(outcome.report.findings[1], Finding::OffsetPastEnd { entry: 2, .. }));
}

#[test]
fn test_enormous_meta_offset_reports_bound() {
    let fx = Fixture::new();
    fx.framed("meta", &[b"x"]);
    fx.framed("0", &[b"y"]);
    fx.index(&[IndexEntry::new(1, 0, 0, i64::MAX - 1, 132)], OffsetWidth::Bits64);

    let options = CheckOptions { format: LogFormat::V2_WIDE, ..CheckOptions::default() };
    let outcome = check_archive(fx.archive(), &options).unwrap();
    assert!(outcome.report.findings.iter().any(|f| matches!(
        f,
        Finding::OffsetPastEnd { offset, size: 141, .. } if *offset == i64::MAX - 1
    )));
    assert_eq!(outcome.report.exit_code(), 1);
}

#[test]
fn test_truncated_index_entry() {
    let fx = Fixture::new();
    fx.healthy();
    let mut f = OpenOptions::new().append(true).open(fx.path("index")).unwrap();
    f.write_all(&[0u8; 7]).unwrap();

    let outcome = check(&fx.archive());
    assert!(matches!(
        outcome.report.findings[0],
        Finding::TruncatedIndexEntry { entry: 5, available: 7, needed: 20, .. }
    ));
    assert_eq!(outcome.report.severity.index, FileState::Bad);
    // The four complete entries were still checked and are consistent.
    assert_eq!(outcome.report.findings.len(), 1);
}

#[test]
fn test_missing_metadata_aborts() {
    let fx = Fixture::new();
    fx.framed("0", &[b"y"]);

    let outcome = check(&fx.archive());
    assert!(outcome.report.aborted);
    assert_eq!(outcome.report.exit_code(), 1);
    assert!(matches!(
        outcome.report.findings[..],
        [Finding::MissingComponent { category: logcheck::Category::Metadata, .. }]
    ));
}

#[test]
fn test_missing_log_aborts() {
    let fx = Fixture::new();
    fx.framed("meta", &[b"x"]);
    let outcome = check(&fx.archive());
    assert!(outcome.report.aborted);
    assert!(text(&outcome).contains("missing log file"));
}

#[test]
fn test_no_matching_files() {
    let fx = Fixture::new();
    File::create(fx.dir.path().join("unrelated.meta")).unwrap();
    let err = check_archive(fx.archive(), &CheckOptions::default()).unwrap_err();
    assert!(matches!(err, CheckError::Discovery(DiscoveryError::NoMatchingFiles(_))));
}

#[test]
fn test_empty_components_warn_only() {
    let fx = Fixture::new();
    fx.framed("meta", &[]);
    fx.framed("0", &[]);

    let outcome = check(&fx.archive());
    assert_eq!(outcome.report.warnings().count(), 2);
    assert_eq!(outcome.report.errors().count(), 0);
    assert_eq!(outcome.report.exit_code(), 0);
}

#[test]
fn test_zero_length_metadata_is_a_warning() {
    let fx = Fixture::new();
    File::create(fx.path("meta")).unwrap();
    fx.framed("0", &[b"y"]);

    let outcome = check(&fx.archive());
    assert!(matches!(
        outcome.report.findings[..],
        [Finding::EmptyComponent { ref path }] if *path == fx.path("meta")
    ));
    assert_eq!(outcome.report.severity.metadata, FileState::Ok);
    assert!(!outcome.report.aborted);
    assert_eq!(outcome.report.exit_code(), 0);
}

#[test]
fn test_output_is_deterministic_and_read_only() {
    let fx = Fixture::new();
    fx.healthy();
    let mut bytes = fs::read(fx.path("1")).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x40;
    fs::write(fx.path("1"), &bytes).unwrap();
    fs::remove_file(fx.path("0")).unwrap();

    let before: Vec<_> = ["meta", "1", "index"].iter().map(|s| fs::read(fx.path(s)).unwrap()).collect();
    let first = text(&check(&fx.archive()));
    let second = text(&check(&fx.archive()));
    let after: Vec<_> = ["meta", "1", "index"].iter().map(|s| fs::read(fx.path(s)).unwrap()).collect();

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(before, after);
}

#[test]
fn test_dump_index_keeps_entries() {
    let fx = Fixture::new();
    fx.healthy();
    let options = CheckOptions { dump_index: true, ..CheckOptions::default() };
    let outcome = check_archive(fx.archive(), &options).unwrap();
    assert_eq!(outcome.entries.len(), 4);
    assert!(check(&fx.archive()).entries.is_empty());
}
