//! Resolve a user-supplied path to an archive base name and enumerate the
//! physical files that belong to it.
//!
//! `foo`, `foo.meta`, `foo.index` and `foo.<digits>` all name the same
//! archive.  Matching is exact on the base-name prefix; a volume suffix must
//! be entirely ASCII digits.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no archive files match \"{}\"", .0.display())]
    NoMatchingFiles(PathBuf),
    #[error("cannot derive an archive name from \"{}\"", .0.display())]
    InvalidName(PathBuf),
    #[error("cannot list directory \"{}\": {source}", .dir.display())]
    Io {
        dir:    PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a physical file contributes to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileRole {
    Metadata,
    Index,
    Volume,
}

/// Severity bucket a file's verdict is merged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Index,
    Metadata,
    Log,
}

impl FileRole {
    pub fn category(self) -> Category {
        match self {
            FileRole::Metadata => Category::Metadata,
            FileRole::Index    => Category::Index,
            FileRole::Volume   => Category::Log,
        }
    }

    /// Classify the part of a file name that follows `<base>`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            ".meta"  => Some(FileRole::Metadata),
            ".index" => Some(FileRole::Index),
            _ => {
                let digits = suffix.strip_prefix('.')?;
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    Some(FileRole::Volume)
                } else {
                    None
                }
            }
        }
    }
}

/// Base name and directory of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveName {
    pub dir:  PathBuf,
    pub base: String,
}

impl ArchiveName {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DiscoveryError> {
        let path = path.as_ref();
        let invalid = || DiscoveryError::InvalidName(path.to_owned());

        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
        let base = match name.rfind('.') {
            Some(dot) if FileRole::from_suffix(&name[dot..]).is_some() => &name[..dot],
            _ => name,
        };
        if base.is_empty() {
            return Err(invalid());
        }

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => PathBuf::from("."),
        };
        Ok(Self { dir, base: base.to_owned() })
    }

    /// Role of `file_name` within this archive, if it belongs to it.
    pub fn role_of(&self, file_name: &str) -> Option<FileRole> {
        file_name.strip_prefix(self.base.as_str()).and_then(FileRole::from_suffix)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.meta", self.base))
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(format!("{}.index", self.base))
    }

    pub fn volume_path(&self, volume: i32) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base, volume))
    }
}

/// One discovered physical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFile {
    pub name: String,
    pub path: PathBuf,
    pub role: FileRole,
}

/// A discovered archive: its name plus every matching file, sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct Archive {
    pub name:  ArchiveName,
    pub files: Vec<ArchiveFile>,
}

impl Archive {
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, DiscoveryError> {
        let path = path.as_ref();
        let name = ArchiveName::from_path(path)?;
        debug!(dir = %name.dir.display(), base = %name.base, "scanning for archive components");

        let io_err = |source| DiscoveryError::Io { dir: name.dir.clone(), source };
        let mut files = Vec::new();
        for entry in fs::read_dir(&name.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(role) = name.role_of(&file_name) {
                files.push(ArchiveFile { path: entry.path(), name: file_name, role });
            }
        }

        if files.is_empty() {
            return Err(DiscoveryError::NoMatchingFiles(path.to_owned()));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { name, files })
    }

    pub fn count(&self, role: FileRole) -> usize {
        self.files.iter().filter(|f| f.role == role).count()
    }
}
