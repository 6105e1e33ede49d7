//! Per-category integrity state, merged from per-file verdicts.
//!
//! States form a lattice `Missing < Ok < Bad` and merging is the join, so a
//! `Bad` verdict is sticky: a later healthy file in the same category never
//! clears it.

use serde::Serialize;
use std::fmt;

use crate::discovery::Category;

/// Integrity state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileState {
    #[default]
    Missing,
    Ok,
    Bad,
}

impl FileState {
    pub fn join(self, other: FileState) -> FileState {
        self.max(other)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileState::Missing => "MISSING",
            FileState::Ok      => "OK",
            FileState::Bad     => "BAD",
        })
    }
}

/// Pass 0 outcome for a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Ok,
    Warning,
    Bad,
}

impl Verdict {
    pub fn state(self) -> FileState {
        match self {
            Verdict::Ok | Verdict::Warning => FileState::Ok,
            Verdict::Bad                   => FileState::Bad,
        }
    }
}

/// The three category trackers, threaded explicitly through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Severity {
    pub index:    FileState,
    pub metadata: FileState,
    pub log:      FileState,
}

impl Severity {
    pub fn get(&self, category: Category) -> FileState {
        match category {
            Category::Index    => self.index,
            Category::Metadata => self.metadata,
            Category::Log      => self.log,
        }
    }

    pub fn record(&mut self, category: Category, verdict: Verdict) {
        self.merge(category, verdict.state());
    }

    pub fn merge(&mut self, category: Category, state: FileState) {
        let slot = match category {
            Category::Index    => &mut self.index,
            Category::Metadata => &mut self.metadata,
            Category::Log      => &mut self.log,
        };
        *slot = slot.join(state);
    }

    /// Categories whose absence makes the archive unusable.
    pub fn missing_required(&self) -> Vec<Category> {
        [Category::Metadata, Category::Log]
            .into_iter()
            .filter(|c| self.get(*c) == FileState::Missing)
            .collect()
    }

    pub fn any_bad(&self) -> bool {
        [self.index, self.metadata, self.log].contains(&FileState::Bad)
    }
}
