//! File-manager service composed over [`Filesystem`].
//!
//! Adds search filtering, [`PathEntry`] shaping and the conflict-aware bulk
//! transfers used by the dispatcher. The conflict check and the transfer
//! that follows it are separate steps, so a concurrent writer may still
//! create the name in between.

use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::local::Filesystem;
use super::utils::format_size;
use super::PathEntry;
use crate::errors::FileError;

/// Case-aware containment filter over entry names.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pattern: Regex,
}

impl SearchFilter {
    /// Compile `raw` as a regex after stripping surrounding `*` wildcards.
    pub fn new(raw: &str, case_sensitive: bool) -> Result<Self, FileError> {
        let trimmed = raw.trim().trim_matches('*');
        let pattern = RegexBuilder::new(trimmed)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| FileError::BadRequest(format!("invalid search string: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }
}

/// Whether a bulk transfer moves or copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Move,
    Copy,
}

/// Outcome of a bulk move or copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Entries at their final destination, in request order.
    pub files: Vec<PathEntry>,
    /// Names skipped because the destination already had them.
    pub conflicts: Vec<String>,
}

/// Summary shown by the "details" action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    pub name: String,
    /// Human-readable, e.g. `"4 KB"`.
    pub size: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub is_file: bool,
    pub multiple_files: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FileManager {
    fs: Filesystem,
}

impl FileManager {
    pub fn new(fs: Filesystem) -> Self {
        Self { fs }
    }

    pub fn filesystem(&self) -> &Filesystem {
        &self.fs
    }

    /// List `dir` as [`PathEntry`] values, optionally filtered by name.
    ///
    /// Entries that disappear between listing and stat are skipped.
    pub fn list(
        &self,
        dir: &Path,
        show_hidden: bool,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<PathEntry>, FileError> {
        let mut entries = Vec::new();
        for path in self.fs.list(dir, show_hidden)? {
            if let Some(filter) = filter {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if !filter.matches(&name) {
                    continue;
                }
            }
            match self.fs.stat(&path) {
                Ok(entry) => entries.push(entry),
                Err(FileError::NotFound(_)) => {
                    debug!("Skipping vanished entry {}", path.display());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    pub fn stat(&self, path: &Path) -> Result<PathEntry, FileError> {
        self.fs.stat(path)
    }

    pub fn create_dir(&self, parent: &Path, name: &str) -> Result<PathEntry, FileError> {
        self.fs.create_dir(parent, name)
    }

    /// Delete each `dir/name` in order, stopping at the first failure.
    pub fn delete_all(&self, dir: &Path, names: &[String]) -> Result<Vec<String>, FileError> {
        let mut removed = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(name);
            self.fs.delete(&path)?;
            removed.push(path.to_string_lossy().to_string());
        }
        Ok(removed)
    }

    /// Rename `dir/name` to `dir/new_name`, refusing an existing target.
    pub fn rename_in(&self, dir: &Path, name: &str, new_name: &str) -> Result<PathEntry, FileError> {
        let src = dir.join(name);
        let dst = dir.join(new_name);
        if self.fs.exists(&dst) {
            return Err(FileError::AlreadyExists(format!(
                "Cannot rename {name} to {new_name}: destination already exists."
            )));
        }
        self.fs.rename(&src, &dst)?;
        self.fs.stat(&dst)
    }

    /// Move or copy each `src_dir/name` into `dst_dir`, in request order.
    ///
    /// Copies always take a free name. A move whose name already exists at
    /// the destination is skipped and recorded as a conflict unless the name
    /// is listed in `rename_allowed`, in which case it takes a free name.
    pub fn transfer(
        &self,
        mode: TransferMode,
        src_dir: &Path,
        names: &[String],
        dst_dir: &Path,
        rename_allowed: &[String],
    ) -> Result<TransferReport, FileError> {
        let mut report = TransferReport::default();
        for name in names {
            let src = src_dir.join(name);
            let final_path = match mode {
                TransferMode::Copy => self.fs.copy_into(&src, dst_dir)?,
                TransferMode::Move => {
                    if self.fs.exists(&dst_dir.join(name)) && !rename_allowed.contains(name) {
                        info!("Move of {} skipped: exists in {}", name, dst_dir.display());
                        report.conflicts.push(name.clone());
                        continue;
                    }
                    self.fs.move_into(&src, dst_dir)?
                }
            };
            report.files.push(self.fs.stat(&final_path)?);
        }
        Ok(report)
    }

    /// Summarise one or more paths.
    pub fn details(&self, paths: &[PathBuf]) -> Result<Details, FileError> {
        let stats = paths
            .iter()
            .map(|p| self.fs.stat(p))
            .collect::<Result<Vec<_>, _>>()?;

        match stats.as_slice() {
            [] => Err(FileError::BadRequest("Missing data".to_string())),
            [single] => Ok(Details {
                name: single.name.clone(),
                size: format_size(single.size),
                location: single.path.clone(),
                created: Some(single.date_created),
                modified: Some(single.date_modified),
                is_file: single.is_file,
                multiple_files: false,
            }),
            [first, ..] => {
                let parent = Path::new(&first.path)
                    .parent()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(Details {
                    name: stats
                        .iter()
                        .map(|s| s.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    size: format_size(stats.iter().map(|s| s.size).sum()),
                    location: format!("All in {parent}"),
                    created: None,
                    modified: None,
                    is_file: false,
                    multiple_files: true,
                })
            }
        }
    }
}
