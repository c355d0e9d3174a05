//! Normalised attribute set for a single path.

use std::path::Path;

use chrono::{DateTime, Utc};

use super::utils::{file_type_suffix, filter_path};
use super::PathEntry;
use crate::errors::{map_io_error, FileError};

/// Stat `path` and build its [`PathEntry`].
///
/// Symlinks are followed. A directory reports the raw inode size, not the
/// size of its contents. `has_child` stops at the first directory entry.
pub fn stat(path: &Path) -> Result<PathEntry, FileError> {
    let display = path.to_string_lossy().to_string();
    let metadata = std::fs::metadata(path).map_err(|e| map_io_error(e, &display))?;
    let is_directory = metadata.is_dir();

    let has_child = if is_directory {
        std::fs::read_dir(path)
            .map_err(|e| map_io_error(e, &display))?
            .next()
            .is_some()
    } else {
        false
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| display.clone());

    let date_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();

    Ok(PathEntry {
        name,
        filter_path: filter_path(path),
        path: display,
        size: metadata.len(),
        is_file: !is_directory,
        has_child,
        date_created: changed_at(&metadata),
        date_modified,
        file_type: file_type_suffix(path),
        mode: raw_mode(&metadata),
    })
}

/// Inode change time, the closest portable stand-in for a creation time.
#[cfg(unix)]
fn changed_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    use std::os::unix::fs::MetadataExt;
    DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32).unwrap_or_default()
}

#[cfg(not(unix))]
fn changed_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default()
}

#[cfg(unix)]
fn raw_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(unix))]
fn raw_mode(_metadata: &std::fs::Metadata) -> u32 {
    0
}
