pub mod format;
pub mod discovery;
pub mod framing;
pub mod severity;
pub mod temporal;
pub mod report;
pub mod check;

pub use check::{check_archive, check_archive_with, CheckError, CheckOptions, CheckOutcome};
pub use discovery::{Archive, ArchiveName, Category, FileRole};
pub use format::{IndexEntry, LogFormat, OffsetWidth, Timestamp};
pub use report::{Finding, FindingClass, Report};
pub use severity::{FileState, Severity, Verdict};
